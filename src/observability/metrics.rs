//! Metrics collection.
//!
//! # Responsibilities
//! - Define gateway metrics (tokens, rate limiting, encryption)
//! - Keep metric names in one place behind cheap helper functions
//!
//! # Metrics
//! - `gateway_tokens_issued_total` (counter)
//! - `gateway_token_validation_failures_total{reason}` (counter)
//! - `gateway_tokens_revoked_total` / `gateway_tokens_swept_total` (counters)
//! - `gateway_ratelimit_rejections_total{reason}` (counter)
//! - `gateway_ratelimit_lockouts_total` (counter)
//! - `gateway_ratelimit_identifiers` (gauge)
//! - `gateway_encrypt_total` / `gateway_decrypt_failures_total{reason}` (counters)
//!
//! Exposition (Prometheus endpoint or otherwise) is the embedding
//! process's job; this module only records.

/// Record an issued token.
pub fn record_token_issued() {
    metrics::counter!("gateway_tokens_issued_total").increment(1);
}

/// Record a failed token validation.
pub fn record_validation_failure(reason: &'static str) {
    metrics::counter!("gateway_token_validation_failures_total", "reason" => reason).increment(1);
}

/// Record revoked tokens.
pub fn record_tokens_revoked(count: u64) {
    metrics::counter!("gateway_tokens_revoked_total").increment(count);
}

/// Record tokens dropped by the sweep.
pub fn record_tokens_swept(count: u64) {
    metrics::counter!("gateway_tokens_swept_total").increment(count);
}

/// Record a rate-limit rejection.
pub fn record_ratelimit_rejection(reason: &'static str) {
    metrics::counter!("gateway_ratelimit_rejections_total", "reason" => reason).increment(1);
}

/// Record an identifier lockout.
pub fn record_lockout() {
    metrics::counter!("gateway_ratelimit_lockouts_total").increment(1);
}

/// Record the current number of tracked identifiers.
pub fn record_identifier_count(count: usize) {
    metrics::gauge!("gateway_ratelimit_identifiers").set(count as f64);
}

/// Record a successful encryption.
pub fn record_encrypt() {
    metrics::counter!("gateway_encrypt_total").increment(1);
}

/// Record a failed decryption.
pub fn record_decrypt_failure(reason: &'static str) {
    metrics::counter!("gateway_decrypt_failures_total", "reason" => reason).increment(1);
}
