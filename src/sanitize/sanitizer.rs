//! Conversion of internal errors into an external-safe contract.
//!
//! The mapping is a closed match over [`GatewayError`]: adding a variant
//! will not compile until a category, status, and message policy are
//! chosen for it. The unredacted original is logged server-side under a
//! fresh correlation id; callers only ever see the sanitized form.

use serde_json::{json, Map, Value};

use crate::config::SanitizerConfig;
use crate::error::GatewayError;
use crate::sanitize::redact::redact;

/// External-safe rendering of an internal failure.
#[derive(Debug, Clone)]
pub struct SanitizedError {
    /// Stable machine-readable code.
    pub error_code: String,
    /// Message safe to show to callers.
    pub public_message: String,
    /// Suggested HTTP status for transport layers.
    pub http_status: u16,
    /// Random correlation id, independent of any request token.
    pub error_id: String,
    /// Retry hint, set for lockout rejections.
    pub retry_after_seconds: Option<u64>,
    /// Redacted diagnostic fields, present only in debug mode.
    pub debug_payload: Option<Map<String, Value>>,
}

impl SanitizedError {
    /// Render the external error contract.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("error".to_string(), Value::Bool(true));
        out.insert("error_code".to_string(), json!(self.error_code));
        out.insert("message".to_string(), json!(self.public_message));
        out.insert("error_id".to_string(), json!(self.error_id));
        if let Some(retry) = self.retry_after_seconds {
            out.insert("retry_after_seconds".to_string(), json!(retry));
        }
        if let Some(details) = &self.debug_payload {
            out.insert("details".to_string(), Value::Object(details.clone()));
        }
        Value::Object(out)
    }
}

/// Message policy per category.
enum MessagePolicy {
    /// Use a fixed phrase, discarding the original text.
    Fixed(&'static str),
    /// Reuse the original text after the redaction pass.
    Redacted,
}

/// Log severity per category.
#[derive(Clone, Copy)]
enum Severity {
    Warn,
    Info,
    Error,
}

/// Maps internal errors to the sanitized external contract.
pub struct ErrorSanitizer {
    debug: bool,
    max_message_len: usize,
}

impl ErrorSanitizer {
    /// Create a sanitizer from configuration.
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            debug: config.debug,
            max_message_len: config.max_message_len,
        }
    }

    /// Sanitize an error for external consumption, logging the original
    /// server-side under a fresh correlation id.
    pub fn handle(&self, error: &GatewayError, context: Option<&str>) -> SanitizedError {
        let (code, status, policy, severity) = Self::classify(error);
        let error_id = uuid::Uuid::new_v4().to_string();

        let retry_after_seconds = match error {
            GatewayError::RateLimit {
                retry_after_seconds, ..
            } => *retry_after_seconds,
            _ => None,
        };

        let public_message = match policy {
            MessagePolicy::Fixed(phrase) => phrase.to_string(),
            MessagePolicy::Redacted => redact(&error.to_string(), self.max_message_len),
        };

        // The unredacted original stays server-side, keyed by the
        // correlation id handed to the caller.
        match severity {
            Severity::Warn => {
                tracing::warn!(error_id = %error_id, context = context.unwrap_or(""), error = %error, "request rejected")
            }
            Severity::Info => {
                tracing::info!(error_id = %error_id, context = context.unwrap_or(""), error = %error, "request rejected")
            }
            Severity::Error => {
                tracing::error!(error_id = %error_id, context = context.unwrap_or(""), error = %error, "request failed")
            }
        }

        let debug_payload = if self.debug {
            let mut payload = Map::new();
            payload.insert(
                "error".to_string(),
                json!(redact(&error.to_string(), self.max_message_len)),
            );
            if let Some(ctx) = context {
                payload.insert(
                    "context".to_string(),
                    json!(redact(ctx, self.max_message_len)),
                );
            }
            Some(payload)
        } else {
            None
        };

        SanitizedError {
            error_code: code,
            public_message,
            http_status: status,
            error_id,
            retry_after_seconds,
            debug_payload,
        }
    }

    fn classify(error: &GatewayError) -> (String, u16, MessagePolicy, Severity) {
        match error {
            GatewayError::Authentication(_) => (
                "AUTH_FAILED".to_string(),
                401,
                MessagePolicy::Fixed("Authentication failed"),
                Severity::Warn,
            ),
            GatewayError::RateLimit { reason, .. } => (
                format!("RATE_LIMITED_{}", reason.as_str().to_uppercase()),
                429,
                MessagePolicy::Fixed("Too many requests"),
                Severity::Warn,
            ),
            GatewayError::Encryption(_) => (
                "SECURITY_ERROR".to_string(),
                500,
                MessagePolicy::Redacted,
                Severity::Warn,
            ),
            GatewayError::InvalidInput(_) => (
                "INVALID_INPUT".to_string(),
                400,
                MessagePolicy::Redacted,
                Severity::Info,
            ),
            GatewayError::Policy(_) => (
                "POLICY_VIOLATION".to_string(),
                403,
                MessagePolicy::Redacted,
                Severity::Info,
            ),
            GatewayError::Storage(_) => (
                "STORAGE_UNAVAILABLE".to_string(),
                503,
                MessagePolicy::Fixed("A storage error occurred"),
                Severity::Error,
            ),
            GatewayError::ToolExecution(_) => (
                "TOOL_EXECUTION_FAILED".to_string(),
                500,
                MessagePolicy::Fixed("Tool execution failed"),
                Severity::Error,
            ),
            GatewayError::Internal(_) => (
                "INTERNAL_ERROR".to_string(),
                500,
                MessagePolicy::Fixed("An internal error occurred"),
                Severity::Error,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthFailure, LimitReason};

    fn sanitizer(debug: bool) -> ErrorSanitizer {
        ErrorSanitizer::new(&SanitizerConfig {
            debug,
            max_message_len: 500,
        })
    }

    #[test]
    fn test_auth_maps_to_fixed_401() {
        let out = sanitizer(false).handle(
            &GatewayError::Authentication(AuthFailure::Tampered),
            None,
        );
        assert_eq!(out.error_code, "AUTH_FAILED");
        assert_eq!(out.http_status, 401);
        assert_eq!(out.public_message, "Authentication failed");
        // The failure reason never reaches the caller.
        assert!(!out.public_message.contains("tampered"));
    }

    #[test]
    fn test_rate_limit_carries_reason_and_retry() {
        let out = sanitizer(false).handle(
            &GatewayError::RateLimit {
                reason: LimitReason::Locked,
                retry_after_seconds: Some(42),
            },
            None,
        );
        assert_eq!(out.error_code, "RATE_LIMITED_LOCKED");
        assert_eq!(out.http_status, 429);
        assert_eq!(out.retry_after_seconds, Some(42));

        let value = out.to_value();
        assert_eq!(value["retry_after_seconds"], 42);
        assert_eq!(value["error"], true);
    }

    #[test]
    fn test_validation_message_is_redacted_original() {
        let err = GatewayError::InvalidInput(
            "bad subject bob@example.com from 10.1.2.3".to_string(),
        );
        let out = sanitizer(false).handle(&err, None);

        assert_eq!(out.error_code, "INVALID_INPUT");
        assert_eq!(out.http_status, 400);
        assert!(out.public_message.contains("bad subject"));
        assert!(!out.public_message.contains("bob@example.com"));
        assert!(!out.public_message.contains("10.1.2.3"));
    }

    #[test]
    fn test_internal_is_opaque() {
        let err = GatewayError::Internal("poisoned lock at /srv/gateway/state".to_string());
        let out = sanitizer(false).handle(&err, None);

        assert_eq!(out.public_message, "An internal error occurred");
        assert!(!out.to_value().to_string().contains("/srv/gateway"));
    }

    #[test]
    fn test_debug_payload_only_in_debug_mode() {
        let err = GatewayError::Storage("redis at 10.0.0.5 unreachable".to_string());

        let out = sanitizer(false).handle(&err, Some("op=fetch"));
        assert!(out.debug_payload.is_none());
        assert!(out.to_value().get("details").is_none());

        let out = sanitizer(true).handle(&err, Some("op=fetch"));
        let details = out.debug_payload.unwrap();
        // Debug fields go through the same redaction pass.
        assert!(!details["error"].to_string().contains("10.0.0.5"));
    }

    #[test]
    fn test_error_ids_are_unique() {
        let s = sanitizer(false);
        let err = GatewayError::Internal("x".to_string());
        let a = s.handle(&err, None);
        let b = s.handle(&err, None);
        assert_ne!(a.error_id, b.error_id);
    }
}
