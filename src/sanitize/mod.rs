//! Error sanitization subsystem.
//!
//! # Responsibilities
//! - Map every internal error to a stable external contract
//! - Redact leaking substrings from outbound messages
//! - Correlate sanitized responses with server-side logs via error ids

pub mod redact;
pub mod sanitizer;

pub use redact::redact;
pub use sanitizer::{ErrorSanitizer, SanitizedError};
