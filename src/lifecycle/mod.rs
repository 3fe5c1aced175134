//! Lifecycle management.
//!
//! # Responsibilities
//! - Broadcast-based shutdown coordination
//! - Cancellable periodic sweep task

pub mod shutdown;
pub mod sweeper;

pub use shutdown::Shutdown;
