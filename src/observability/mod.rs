//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via tracing, with fields over format strings
//! - Metrics are cheap (atomic increments) and recorded behind helpers
//! - Error ids correlate sanitized responses with server-side logs

pub mod logging;
pub mod metrics;
