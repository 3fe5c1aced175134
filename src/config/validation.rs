//! Configuration validation.
//!
//! Semantic validation on top of serde's syntactic checks. The validator is
//! a pure function and returns all violations, not just the first, so a bad
//! config file can be fixed in one pass.

use crate::config::schema::{GatewayConfig, WindowCeilings};

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.to_string(),
        message: message.into(),
    });
}

fn check_ceilings(errors: &mut Vec<ValidationError>, field: &str, c: &WindowCeilings) {
    if c.per_minute == 0 || c.per_hour == 0 || c.per_day == 0 {
        err(errors, field, "window ceilings must be greater than zero");
    }
    if c.per_minute > c.per_hour || c.per_hour > c.per_day {
        err(errors, field, "ceilings must be monotone: minute <= hour <= day");
    }
}

/// Validate a full gateway configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Tokens
    if config.tokens.max_ttl_secs == 0 {
        err(&mut errors, "tokens.max_ttl_secs", "must be greater than zero");
    }
    if config.tokens.default_ttl_secs > config.tokens.max_ttl_secs {
        err(
            &mut errors,
            "tokens.default_ttl_secs",
            "must not exceed tokens.max_ttl_secs",
        );
    }
    if config.tokens.max_subject_len == 0 || config.tokens.max_scope_len == 0 {
        err(&mut errors, "tokens", "subject/scope length limits must be non-zero");
    }
    if config.tokens.max_permissions == 0 {
        err(&mut errors, "tokens.max_permissions", "must be greater than zero");
    }

    // Rate limiting
    let rl = &config.rate_limit;
    if rl.global.capacity < 1.0 {
        err(&mut errors, "rate_limit.global.capacity", "must be at least 1");
    }
    if rl.global.refill_per_sec <= 0.0 {
        err(&mut errors, "rate_limit.global.refill_per_sec", "must be positive");
    }
    for (op, bucket) in &rl.operations {
        if bucket.capacity < 1.0 || bucket.refill_per_sec <= 0.0 {
            err(
                &mut errors,
                &format!("rate_limit.operations.{op}"),
                "capacity must be at least 1 and refill must be positive",
            );
        }
    }
    check_ceilings(&mut errors, "rate_limit.anonymous", &rl.anonymous);
    check_ceilings(&mut errors, "rate_limit.authenticated", &rl.authenticated);
    if rl.authenticated.per_minute < rl.anonymous.per_minute
        || rl.authenticated.per_hour < rl.anonymous.per_hour
        || rl.authenticated.per_day < rl.anonymous.per_day
    {
        err(
            &mut errors,
            "rate_limit.authenticated",
            "authenticated ceilings must be at least the anonymous ceilings",
        );
    }
    if rl.max_violations == 0 {
        err(&mut errors, "rate_limit.max_violations", "must be greater than zero");
    }
    if rl.lockout_secs == 0 {
        err(&mut errors, "rate_limit.lockout_secs", "must be greater than zero");
    }

    // Encryption
    if config.encryption.kdf_iterations < 100_000 {
        err(
            &mut errors,
            "encryption.kdf_iterations",
            "must be at least 100000",
        );
    }
    if config.encryption.max_payload_bytes == 0
        || config.encryption.max_payload_bytes > 64 * 1024 * 1024
    {
        err(
            &mut errors,
            "encryption.max_payload_bytes",
            "must be between 1 byte and 64 MiB",
        );
    }

    // Sanitizer
    if config.sanitizer.max_message_len == 0 {
        err(&mut errors, "sanitizer.max_message_len", "must be greater than zero");
    }

    // Sweep
    if config.sweep.interval_secs == 0 {
        err(&mut errors, "sweep.interval_secs", "must be greater than zero");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GatewayConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.tokens.max_ttl_secs = 0;
        config.rate_limit.lockout_secs = 0;
        config.sweep.interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
        assert!(errors.iter().any(|e| e.field == "tokens.max_ttl_secs"));
        assert!(errors.iter().any(|e| e.field == "rate_limit.lockout_secs"));
        assert!(errors.iter().any(|e| e.field == "sweep.interval_secs"));
    }

    #[test]
    fn test_authenticated_ceilings_must_dominate() {
        let mut config = GatewayConfig::default();
        config.rate_limit.authenticated.per_minute = 1;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "rate_limit.authenticated"));
    }
}
