//! Token issuance, validation, and revocation.
//!
//! Token strings have three dot-separated base64url segments:
//! `token_id . encrypted_claims . integrity_tag`. The claims are sealed
//! with ChaCha20-Poly1305 and the tag is an HMAC-SHA256 over the token
//! identity, so the id is protected twice: by the keyed hash outside and by
//! the copy embedded in the encrypted claims.
//!
//! The token table is in-process only; a restart invalidates all
//! outstanding tokens, so the signing keys are generated per manager and
//! never persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashSet;
use subtle::ConstantTimeEq;

use crate::auth::claims::{AccessToken, TokenClaims, TokenStore};
use crate::config::TokenConfig;
use crate::crypto::KeyMaterial;
use crate::error::{AuthFailure, GatewayError, Result};
use crate::observability::metrics;
use crate::util::now_ms;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_SEPARATOR: u8 = 0x1f;

/// Aggregate view of the token table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTableStats {
    pub total: usize,
    pub active: usize,
    pub revoked: usize,
    pub expired: usize,
}

/// Issues, validates, and revokes bearer tokens.
pub struct TokenManager {
    config: TokenConfig,
    store: TokenStore,
    cipher: ChaCha20Poly1305,
    keys: KeyMaterial,
}

impl TokenManager {
    /// Create a manager over an injected store with per-instance keys.
    pub fn new(config: TokenConfig, store: TokenStore) -> Self {
        Self::with_keys(config, store, KeyMaterial::generate())
    }

    /// Create a manager with explicit key material.
    pub fn with_keys(config: TokenConfig, store: TokenStore, keys: KeyMaterial) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(keys.cipher_key()));
        Self {
            config,
            store,
            cipher,
            keys,
        }
    }

    /// Issue a token for `subject` on `scope` with the given permissions.
    ///
    /// Returns the full token string to hand to the caller.
    pub fn issue(
        &self,
        subject: &str,
        scope: &str,
        permissions: HashSet<String>,
        ttl_seconds: Option<u64>,
    ) -> Result<String> {
        if subject.is_empty() {
            return Err(GatewayError::InvalidInput("subject must not be empty".into()));
        }
        if subject.len() > self.config.max_subject_len {
            return Err(GatewayError::InvalidInput(format!(
                "subject exceeds {} characters",
                self.config.max_subject_len
            )));
        }
        if scope.is_empty() {
            return Err(GatewayError::InvalidInput("scope must not be empty".into()));
        }
        if scope.len() > self.config.max_scope_len {
            return Err(GatewayError::InvalidInput(format!(
                "scope exceeds {} characters",
                self.config.max_scope_len
            )));
        }
        if permissions.len() > self.config.max_permissions {
            return Err(GatewayError::InvalidInput(format!(
                "at most {} permissions per token",
                self.config.max_permissions
            )));
        }

        let ttl = match ttl_seconds {
            Some(0) => {
                return Err(GatewayError::InvalidInput("ttl_seconds must be non-zero".into()))
            }
            Some(requested) if requested > self.config.max_ttl_secs => {
                return Err(GatewayError::Policy(format!(
                    "requested ttl {requested}s exceeds the maximum of {}s",
                    self.config.max_ttl_secs
                )));
            }
            Some(requested) => requested,
            None => self.config.default_ttl_secs,
        };

        let token_id = uuid::Uuid::new_v4().simple().to_string();
        let now = now_ms();
        let expires_at_ms = now + ttl * 1000;

        let claims = TokenClaims {
            token_id: token_id.clone(),
            subject: subject.to_string(),
            tool_scope: scope.to_string(),
            permissions: permissions.clone(),
            issued_at_ms: now,
            expires_at_ms,
        };
        let claims_bytes = serde_json::to_vec(&claims)
            .map_err(|e| GatewayError::Internal(format!("claims serialization failed: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), claims_bytes.as_slice())
            .map_err(|_| GatewayError::Internal("claims seal failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);

        let tag = self.identity_tag(&token_id, subject);

        self.store.map().insert(
            token_id.clone(),
            AccessToken {
                token_id: token_id.clone(),
                subject: subject.to_string(),
                tool_scope: scope.to_string(),
                granted_scopes: permissions,
                created_at_ms: now,
                expires_at_ms,
                revoked: false,
                integrity_tag: tag.clone(),
                last_used_at_ms: now,
                use_count: 0,
            },
        );

        metrics::record_token_issued();
        tracing::debug!(subject = %subject, scope = %scope, ttl_secs = ttl, "token issued");

        Ok(format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(token_id.as_bytes()),
            URL_SAFE_NO_PAD.encode(&blob),
            URL_SAFE_NO_PAD.encode(&tag)
        ))
    }

    /// Validate a token string and return its claims.
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let (token_id, blob, presented_tag) = match Self::parse(token) {
            Some(parts) => parts,
            None => return Err(self.fail(AuthFailure::Malformed)),
        };

        let (subject, expires_at_ms, revoked) = {
            let record = match self.store.map().get(&token_id) {
                Some(record) => record,
                None => return Err(self.fail(AuthFailure::NotFound)),
            };
            (
                record.subject.clone(),
                record.expires_at_ms,
                record.revoked,
            )
        };

        if revoked {
            return Err(self.fail(AuthFailure::Revoked));
        }
        if now_ms() >= expires_at_ms {
            return Err(self.fail(AuthFailure::Expired));
        }

        // Constant-time comparison; a mismatch reveals nothing about where
        // the two tags diverge.
        let expected_tag = self.identity_tag(&token_id, &subject);
        if !bool::from(expected_tag.ct_eq(&presented_tag)) {
            return Err(self.fail(AuthFailure::Tampered));
        }

        if blob.len() < NONCE_LEN {
            return Err(self.fail(AuthFailure::Tampered));
        }
        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let claims_bytes = match self.cipher.decrypt(Nonce::from_slice(nonce_bytes), sealed) {
            Ok(bytes) => bytes,
            Err(_) => return Err(self.fail(AuthFailure::Tampered)),
        };
        let claims: TokenClaims = match serde_json::from_slice(&claims_bytes) {
            Ok(claims) => claims,
            Err(_) => return Err(self.fail(AuthFailure::Tampered)),
        };

        // Substitution defense: the encrypted copy must match the outer id.
        if claims.token_id != token_id {
            return Err(self.fail(AuthFailure::Mismatch));
        }

        if let Some(mut record) = self.store.map().get_mut(&token_id) {
            record.use_count += 1;
            record.last_used_at_ms = now_ms();
        }

        Ok(claims)
    }

    /// Revoke a single token. Returns the number of tokens transitioned
    /// to revoked by this call (0 or 1); revoking twice is a no-op.
    pub fn revoke(&self, token_id: &str) -> usize {
        let revoked = match self.store.map().get_mut(token_id) {
            Some(mut record) if !record.revoked => {
                record.revoked = true;
                1
            }
            _ => 0,
        };
        if revoked > 0 {
            metrics::record_tokens_revoked(1);
            tracing::info!(token_id = %token_id, "token revoked");
        }
        revoked
    }

    /// Revoke every token issued to `subject`, optionally narrowed to one
    /// scope. Returns the number of tokens transitioned by this call.
    pub fn revoke_subject(&self, subject: &str, scope: Option<&str>) -> usize {
        let ids: Vec<String> = self
            .store
            .map()
            .iter()
            .filter(|r| {
                r.subject == subject
                    && !r.revoked
                    && scope.map(|s| r.tool_scope == s).unwrap_or(true)
            })
            .map(|r| r.token_id.clone())
            .collect();

        let mut count = 0;
        for id in ids {
            if let Some(mut record) = self.store.map().get_mut(&id) {
                if !record.revoked {
                    record.revoked = true;
                    count += 1;
                }
            }
        }
        if count > 0 {
            metrics::record_tokens_revoked(count as u64);
            tracing::info!(subject = %subject, count, "subject tokens revoked");
        }
        count
    }

    /// Drop tokens whose expiry is older than the retention horizon.
    ///
    /// Safe to run concurrently with `validate`: keys are snapshotted first
    /// and each entry is removed individually under its own guard.
    pub fn sweep_expired(&self) -> usize {
        let cutoff = now_ms().saturating_sub(self.config.retention_secs * 1000);
        let candidates: Vec<String> = self
            .store
            .map()
            .iter()
            .filter(|r| r.expires_at_ms <= cutoff)
            .map(|r| r.token_id.clone())
            .collect();

        let mut removed = 0;
        for id in candidates {
            if self
                .store
                .map()
                .remove_if(&id, |_, record| record.expires_at_ms <= cutoff)
                .is_some()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            metrics::record_tokens_swept(removed as u64);
            tracing::debug!(removed, "expired tokens swept");
        }
        removed
    }

    /// Number of tokens currently held.
    pub fn count(&self) -> usize {
        self.store.len()
    }

    /// Aggregate table statistics.
    pub fn stats(&self) -> TokenTableStats {
        let now = now_ms();
        let mut stats = TokenTableStats {
            total: 0,
            active: 0,
            revoked: 0,
            expired: 0,
        };
        for record in self.store.map().iter() {
            stats.total += 1;
            if record.revoked {
                stats.revoked += 1;
            } else if now >= record.expires_at_ms {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
        }
        stats
    }

    fn parse(token: &str) -> Option<(String, Vec<u8>, Vec<u8>)> {
        let mut parts = token.split('.');
        let id_part = parts.next()?;
        let blob_part = parts.next()?;
        let tag_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let id_bytes = URL_SAFE_NO_PAD.decode(id_part).ok()?;
        let token_id = String::from_utf8(id_bytes).ok()?;
        let blob = URL_SAFE_NO_PAD.decode(blob_part).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag_part).ok()?;
        Some((token_id, blob, tag))
    }

    fn identity_tag(&self, token_id: &str, subject: &str) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.keys.mac_key())
            .expect("HMAC accepts any key length");
        mac.update(token_id.as_bytes());
        mac.update(&[TAG_SEPARATOR]);
        mac.update(subject.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn fail(&self, reason: AuthFailure) -> GatewayError {
        metrics::record_validation_failure(reason.as_str());
        GatewayError::Authentication(reason)
    }
}
