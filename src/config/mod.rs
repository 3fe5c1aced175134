//! Configuration subsystem.
//!
//! # Responsibilities
//! - Define the config schema (serde structs with defaults)
//! - Load TOML config files from disk
//! - Validate semantic constraints before the config is accepted

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BucketSettings, EncryptionConfig, GatewayConfig, ObservabilityConfig, RateLimitConfig,
    SanitizerConfig, SweepConfig, TokenConfig, WindowCeilings,
};
pub use validation::{validate_config, ValidationError};
