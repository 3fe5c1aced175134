//! Bearer token subsystem.
//!
//! # Responsibilities
//! - Issue tamper-evident access tokens with encrypted claims
//! - Validate tokens on the request hot path
//! - Revoke tokens individually or per subject
//! - Sweep expired tokens past the retention horizon

pub mod claims;
pub mod manager;

pub use claims::{AccessToken, TokenClaims, TokenStore};
pub use manager::{TokenManager, TokenTableStats};
