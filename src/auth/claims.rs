//! Token records and claims.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Claims carried inside the encrypted segment of a token string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Token id, cross-checked against the outer token segment.
    pub token_id: String,
    /// Subject the token was issued to.
    pub subject: String,
    /// Tool scope the token grants access to.
    pub tool_scope: String,
    /// Permissions granted within the scope.
    pub permissions: HashSet<String>,
    /// Issuance timestamp, Unix milliseconds.
    pub issued_at_ms: u64,
    /// Expiry timestamp, Unix milliseconds.
    pub expires_at_ms: u64,
}

/// Server-side record for an issued token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Unique token identifier.
    pub token_id: String,
    /// Subject the token was issued to.
    pub subject: String,
    /// Tool scope the token grants access to.
    pub tool_scope: String,
    /// Permissions granted within the scope.
    pub granted_scopes: HashSet<String>,
    /// Issuance timestamp, Unix milliseconds.
    pub created_at_ms: u64,
    /// Expiry timestamp, Unix milliseconds.
    pub expires_at_ms: u64,
    /// Revocation is one-way.
    pub revoked: bool,
    /// HMAC over the token identity, recomputed on validate.
    pub integrity_tag: Vec<u8>,
    /// Last successful validation, Unix milliseconds.
    pub last_used_at_ms: u64,
    /// Number of successful validations.
    pub use_count: u64,
}

impl AccessToken {
    /// A token is usable iff it is not revoked and not past expiry.
    pub fn is_usable(&self, now_ms: u64) -> bool {
        !self.revoked && now_ms < self.expires_at_ms
    }
}

/// Shared in-process token table.
///
/// Injected into the manager at construction so separate gateway instances
/// never share state. Cloning is cheap and refers to the same table.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<DashMap<String, AccessToken>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the underlying map.
    pub(crate) fn map(&self) -> &DashMap<String, AccessToken> {
        &self.inner
    }

    /// Number of tokens currently held, including revoked and expired ones
    /// the sweep has not dropped yet.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no tokens are held.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
