//! Rate limiting subsystem.
//!
//! # Responsibilities
//! - Token-bucket throttling per identifier and per operation
//! - Sliding-window ceilings tiered by caller identity
//! - Lockout after repeated violations
//! - Idle-state eviction to bound memory

pub mod bucket;
pub mod limiter;
pub mod window;

pub use bucket::TokenBucket;
pub use limiter::{CallerTier, IdentifierStats, RateLimiter};
pub use window::{SlidingWindow, WindowCounts};
