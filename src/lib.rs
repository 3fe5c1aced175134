//! Secure access gateway for a tool-execution and caching backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 TOOL GATEWAY                  │
//!                    │                                               │
//!   GatewayRequest   │  ┌───────────┐   ┌───────────┐   ┌─────────┐ │
//!   ─────────────────┼─▶│ ratelimit │──▶│   auth    │──▶│ handler │ │
//!                    │  │  check    │   │ validate  │   │ (yours) │ │
//!                    │  └───────────┘   └───────────┘   └────┬────┘ │
//!                    │                                       │      │
//!                    │                                 ┌─────▼────┐ │
//!                    │                                 │  crypto  │ │
//!                    │                                 │ (cache)  │ │
//!                    │                                 └──────────┘ │
//!                    │  ┌────────────────────────────────────────┐  │
//!                    │  │   any error → sanitize → SanitizedError │  │
//!                    │  └────────────────────────────────────────┘  │
//!                    │  ┌─────────┐ ┌───────────┐ ┌──────────────┐  │
//!                    │  │ config  │ │ lifecycle │ │observability │  │
//!                    │  └─────────┘ └───────────┘ └──────────────┘  │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! The gateway sits between a server framework (transport, routing, TLS)
//! and the protected tool handlers. It issues and validates revocable
//! bearer tokens, throttles callers per identifier and operation with
//! lockout on abuse, encrypts cached payloads at rest, and converts every
//! internal failure into a sanitized external error.

// Core subsystems
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod ratelimit;
pub mod sanitize;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

mod util;

pub use auth::{TokenClaims, TokenManager, TokenStore};
pub use config::GatewayConfig;
pub use crypto::{CacheEncryptor, EncryptedRecord};
pub use error::{AuthFailure, EncryptionFailure, GatewayError, LimitReason};
pub use gateway::{Gateway, GatewayRequest};
pub use lifecycle::Shutdown;
pub use ratelimit::{CallerTier, RateLimiter};
pub use sanitize::{ErrorSanitizer, SanitizedError};
