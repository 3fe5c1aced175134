//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Token issuance and validation settings.
    pub tokens: TokenConfig,

    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,

    /// Cache encryption settings.
    pub encryption: EncryptionConfig,

    /// Error sanitizer settings.
    pub sanitizer: SanitizerConfig,

    /// Background sweep settings.
    pub sweep: SweepConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Token issuance and validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Maximum TTL a caller may request, in seconds.
    pub max_ttl_secs: u64,

    /// TTL applied when the caller does not request one.
    pub default_ttl_secs: u64,

    /// Maximum length of the subject field.
    pub max_subject_len: usize,

    /// Maximum length of the scope field.
    pub max_scope_len: usize,

    /// Maximum number of permissions per token.
    pub max_permissions: usize,

    /// How long expired tokens are retained before the sweep drops them,
    /// in seconds.
    pub retention_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_ttl_secs: 3600,
            default_ttl_secs: 900,
            max_subject_len: 100,
            max_scope_len: 100,
            max_permissions: 20,
            retention_secs: 86_400,
        }
    }
}

/// Settings for a single token bucket.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketSettings {
    /// Maximum tokens the bucket holds (burst size).
    pub capacity: f64,

    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            capacity: 60.0,
            refill_per_sec: 1.0,
        }
    }
}

/// Sliding-window request ceilings for one caller tier.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowCeilings {
    /// Maximum requests in the trailing minute.
    pub per_minute: u64,

    /// Maximum requests in the trailing hour.
    pub per_hour: u64,

    /// Maximum requests in the trailing day.
    pub per_day: u64,
}

impl Default for WindowCeilings {
    fn default() -> Self {
        Self {
            per_minute: 30,
            per_hour: 500,
            per_day: 5_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Global per-identifier bucket.
    pub global: BucketSettings,

    /// Per-operation buckets, keyed by operation name. Operations without
    /// an entry are only subject to the global bucket.
    pub operations: HashMap<String, BucketSettings>,

    /// Window ceilings for anonymous callers.
    pub anonymous: WindowCeilings,

    /// Window ceilings for authenticated callers.
    pub authenticated: WindowCeilings,

    /// Rejections before an identifier is locked out.
    pub max_violations: u32,

    /// Lockout duration in seconds.
    pub lockout_secs: u64,

    /// Idle identifiers are evicted after this many seconds.
    pub idle_retention_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: BucketSettings::default(),
            operations: HashMap::new(),
            anonymous: WindowCeilings::default(),
            authenticated: WindowCeilings {
                per_minute: 120,
                per_hour: 2_000,
                per_day: 20_000,
            },
            max_violations: 5,
            lockout_secs: 300,
            idle_retention_secs: 3600,
        }
    }
}

/// Cache encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Path to the key file. Generated on first use when absent from disk.
    /// Losing this file makes all encrypted cache content unrecoverable.
    pub key_file: Option<PathBuf>,

    /// Environment variable holding the master passphrase. When set and
    /// non-empty, the key is derived from it instead of being generated.
    pub passphrase_env: String,

    /// PBKDF2 iteration count for passphrase-derived keys.
    pub kdf_iterations: u32,

    /// Maximum plaintext size accepted by encrypt, in bytes.
    pub max_payload_bytes: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            passphrase_env: "GATEWAY_MASTER_PASSPHRASE".to_string(),
            kdf_iterations: 600_000,
            max_payload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Error sanitizer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Include redacted debug payloads in sanitized errors.
    pub debug: bool,

    /// Maximum length of public error messages.
    pub max_message_len: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_message_len: 500,
        }
    }
}

/// Background sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Interval between sweep passes, in seconds.
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
