//! Request dispatch subsystem.
//!
//! # Responsibilities
//! - Define the transport-neutral inbound request shape
//! - Resolve caller identifiers and bearer tokens
//! - Run the admission pipeline around protected handlers

pub mod dispatcher;
pub mod request;

pub use dispatcher::Gateway;
pub use request::GatewayRequest;
