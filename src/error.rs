//! Error taxonomy for the gateway.
//!
//! Every component produces variants of [`GatewayError`]; the sanitizer
//! matches on them exhaustively, so adding a variant forces a decision
//! about its external mapping at compile time.

use thiserror::Error;

/// Reason a token failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Token string does not have the expected three-part shape.
    Malformed,
    /// Token id is not present in the token table.
    NotFound,
    /// Token was revoked.
    Revoked,
    /// Token is past its expiry.
    Expired,
    /// Integrity tag or ciphertext does not verify.
    Tampered,
    /// Embedded token id differs from the outer segment.
    Mismatch,
}

impl AuthFailure {
    /// Stable machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthFailure::Malformed => "malformed",
            AuthFailure::NotFound => "not_found",
            AuthFailure::Revoked => "revoked",
            AuthFailure::Expired => "expired",
            AuthFailure::Tampered => "tampered",
            AuthFailure::Mismatch => "mismatch",
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which limit rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// Global per-identifier bucket was empty.
    GlobalLimit,
    /// Per-operation bucket was empty.
    OperationLimit,
    /// A sliding-window ceiling was exceeded.
    WindowLimit,
    /// Identifier is locked out after repeated violations.
    Locked,
}

impl LimitReason {
    /// Stable machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            LimitReason::GlobalLimit => "global_limit",
            LimitReason::OperationLimit => "operation_limit",
            LimitReason::WindowLimit => "window_limit",
            LimitReason::Locked => "locked",
        }
    }
}

impl std::fmt::Display for LimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason an encrypt/decrypt operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionFailure {
    /// Record was produced by a different format version or algorithm.
    VersionMismatch,
    /// Integrity tag does not verify against the ciphertext.
    IntegrityFail,
    /// Cipher-level failure (wrong key, corrupted bytes).
    DecryptFail,
    /// Payload exceeds the configured size ceiling.
    Oversize,
    /// Key material could not be loaded or derived.
    KeyUnavailable,
    /// Envelope could not be serialized or parsed.
    Serialization,
}

impl EncryptionFailure {
    /// Stable machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionFailure::VersionMismatch => "version_mismatch",
            EncryptionFailure::IntegrityFail => "integrity_fail",
            EncryptionFailure::DecryptFail => "decrypt_fail",
            EncryptionFailure::Oversize => "oversize",
            EncryptionFailure::KeyUnavailable => "key_unavailable",
            EncryptionFailure::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for EncryptionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type shared by all gateway components.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Token validation failed.
    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),

    /// Rate limiter rejected the request.
    #[error("rate limit exceeded: {reason}")]
    RateLimit {
        reason: LimitReason,
        /// Seconds until the caller should retry, when known.
        retry_after_seconds: Option<u64>,
    },

    /// Encryption or decryption failed.
    #[error("encryption failure: {0}")]
    Encryption(EncryptionFailure),

    /// Caller-supplied input violated schema or range checks.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Requested parameters exceed configured ceilings.
    #[error("policy violation: {0}")]
    Policy(String),

    /// Backing store reported a failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The protected handler failed.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names_are_stable() {
        assert_eq!(AuthFailure::NotFound.as_str(), "not_found");
        assert_eq!(LimitReason::GlobalLimit.as_str(), "global_limit");
        assert_eq!(EncryptionFailure::IntegrityFail.as_str(), "integrity_fail");
    }

    #[test]
    fn test_display_includes_reason() {
        let err = GatewayError::Authentication(AuthFailure::Expired);
        assert_eq!(err.to_string(), "authentication failed: expired");

        let err = GatewayError::RateLimit {
            reason: LimitReason::Locked,
            retry_after_seconds: Some(30),
        };
        assert_eq!(err.to_string(), "rate limit exceeded: locked");
    }
}
