//! Shared fixtures for integration tests.

use tool_gateway::config::{BucketSettings, GatewayConfig};
use tool_gateway::{Gateway, GatewayRequest};

/// Config with a small, fast bucket and generous windows, so bucket
/// behavior can be observed without interference.
pub fn bucket_config(capacity: f64, refill_per_sec: f64) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.rate_limit.global = BucketSettings {
        capacity,
        refill_per_sec,
    };
    config.rate_limit.max_violations = 100;
    config.rate_limit.anonymous.per_minute = 10_000;
    config.rate_limit.anonymous.per_hour = 100_000;
    config.rate_limit.anonymous.per_day = 1_000_000;
    config.rate_limit.authenticated = config.rate_limit.anonymous;
    config
}

/// Build a gateway; keys are ephemeral (no key file configured).
pub fn gateway(config: GatewayConfig) -> Gateway {
    tool_gateway::observability::logging::init("warn");
    Gateway::new(config).expect("gateway construction failed")
}

/// Request carrying a bearer token in the Authorization header.
pub fn bearer_request(method: &str, token: &str, addr: &str) -> GatewayRequest {
    let mut request = GatewayRequest::new(method);
    request
        .headers
        .insert("Authorization".to_string(), format!("Bearer {token}"));
    request
        .headers
        .insert("remote-addr".to_string(), addr.to_string());
    request
}
