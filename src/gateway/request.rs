//! Inbound request shape and caller extraction.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Transport-neutral request handed to the gateway by the surrounding
/// server framework.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    /// Operation name (tool or method being invoked).
    pub method: String,
    /// Request parameters.
    pub params: Map<String, Value>,
    /// Transport headers, lowercased or not; lookups are case-insensitive.
    pub headers: HashMap<String, String>,
    /// Identity resolved by an enclosing session layer, when present.
    pub identity: Option<String>,
}

impl GatewayRequest {
    /// Create a request for `method` with no parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Extract the bearer token: `params.auth_token` first, then the
    /// `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<String> {
        if let Some(Value::String(token)) = self.params.get("auth_token") {
            return Some(token.clone());
        }
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    }

    /// Resolve the throttling identifier.
    ///
    /// Falls back through: resolved session identity, `x-forwarded-for`
    /// (first hop), `x-real-ip`, `remote-addr`, then a deterministic
    /// signature of the request shape so structurally identical anonymous
    /// requests throttle as a group.
    ///
    /// Header-derived identifiers are spoofable by clients that control
    /// their own headers; they are only trustworthy when a reverse proxy
    /// in front of the gateway owns those headers. Which header to trust
    /// is a deployment decision, not enforced here.
    pub fn identifier(&self) -> String {
        if let Some(identity) = &self.identity {
            return identity.clone();
        }
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return format!("ip:{first}");
                }
            }
        }
        if let Some(addr) = self.header("x-real-ip") {
            return format!("ip:{}", addr.trim());
        }
        if let Some(addr) = self.header("remote-addr") {
            return format!("ip:{}", addr.trim());
        }
        self.signature_identifier()
    }

    /// Deterministic identifier derived from method and sorted parameter
    /// keys.
    pub fn signature_identifier(&self) -> String {
        let mut keys: Vec<&str> = self.params.keys().map(String::as_str).collect();
        keys.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update([0u8]);
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update([0x1fu8]);
        }
        let digest = hasher.finalize();
        format!("sig:{}", hex::encode(&digest[..8]))
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
