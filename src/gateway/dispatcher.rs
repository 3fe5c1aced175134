//! Request dispatcher wiring all gateway components.
//!
//! # Data Flow
//! ```text
//! GatewayRequest
//!     → identifier + tier resolution
//!     → RateLimiter.check()        (cheap rejection before any crypto)
//!     → TokenManager.validate()
//!     → protected handler(request, claims)
//!         ↳ handler may use CacheEncryptor for persisted results
//!
//! Any error on the way out → ErrorSanitizer.handle()
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::auth::{TokenClaims, TokenManager, TokenStore};
use crate::config::{validate_config, GatewayConfig};
use crate::crypto::CacheEncryptor;
use crate::error::{AuthFailure, GatewayError, Result};
use crate::gateway::request::GatewayRequest;
use crate::lifecycle::{sweeper, Shutdown};
use crate::ratelimit::{CallerTier, RateLimiter};
use crate::sanitize::{ErrorSanitizer, SanitizedError};

/// The access gateway: rate limiting, token validation, and sanitized
/// failure handling around a protected handler.
pub struct Gateway {
    config: GatewayConfig,
    tokens: TokenManager,
    limiter: RateLimiter,
    encryptor: Arc<CacheEncryptor>,
    sanitizer: ErrorSanitizer,
}

impl Gateway {
    /// Build a gateway from configuration.
    ///
    /// Validates the config, resolves encryption keys (the only I/O this
    /// constructor performs), and builds per-instance state tables so
    /// separate gateways never share tokens or rate-limit state.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        if let Err(errors) = validate_config(&config) {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(GatewayError::InvalidInput(format!(
                "configuration invalid: {joined}"
            )));
        }

        let encryptor = Arc::new(CacheEncryptor::from_config(&config.encryption)?);
        let tokens = TokenManager::new(config.tokens.clone(), TokenStore::new());
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let sanitizer = ErrorSanitizer::new(&config.sanitizer);

        Ok(Self {
            config,
            tokens,
            limiter,
            encryptor,
            sanitizer,
        })
    }

    /// Dispatch a request through the gateway to a protected handler.
    ///
    /// The handler only runs once the request has cleared rate limiting
    /// and token validation. Every failure leaves as a [`SanitizedError`];
    /// internals never cross this boundary.
    pub fn dispatch<F>(
        &self,
        request: &GatewayRequest,
        handler: F,
    ) -> std::result::Result<Value, SanitizedError>
    where
        F: FnOnce(&GatewayRequest, &TokenClaims) -> Result<Value>,
    {
        self.run(request, handler)
            .map_err(|error| self.sanitizer.handle(&error, Some(&request.method)))
    }

    fn run<F>(&self, request: &GatewayRequest, handler: F) -> Result<Value>
    where
        F: FnOnce(&GatewayRequest, &TokenClaims) -> Result<Value>,
    {
        // 1. Resolve identifier and tier. The tier comes from the identity
        //    resolved by the surrounding session layer; a bare token does
        //    not raise ceilings before it is validated.
        let identifier = request.identifier();
        let tier = if request.identity.is_some() {
            CallerTier::Authenticated
        } else {
            CallerTier::Anonymous
        };

        // 2. Rate limit before the more expensive token validation.
        self.limiter.check(&identifier, Some(&request.method), tier)?;

        // 3. Validate the caller's token.
        let token = request
            .bearer_token()
            .ok_or(GatewayError::Authentication(AuthFailure::Malformed))?;
        let claims = self.tokens.validate(&token)?;

        tracing::debug!(
            method = %request.method,
            subject = %claims.subject,
            identifier = %identifier,
            "request admitted"
        );

        // 4. Hand over to the protected handler.
        handler(request, &claims)
    }

    /// Token manager, for issuing and revoking tokens.
    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// Rate limiter, for stats and administrative resets.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Shared encryptor for handlers that persist results.
    pub fn encryptor(&self) -> Arc<CacheEncryptor> {
        self.encryptor.clone()
    }

    /// The sanitizer used at the dispatch boundary.
    pub fn sanitizer(&self) -> &ErrorSanitizer {
        &self.sanitizer
    }

    /// Active configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Start the periodic background sweep for this gateway.
    ///
    /// The task stops deterministically when `shutdown` triggers.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
        sweeper::spawn(
            self.clone(),
            std::time::Duration::from_secs(self.config.sweep.interval_secs),
            shutdown,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn gateway() -> Gateway {
        Gateway::new(GatewayConfig::default()).unwrap()
    }

    fn authed_request(gateway: &Gateway, method: &str) -> GatewayRequest {
        let token = gateway
            .token_manager()
            .issue("alice", "tools", HashSet::new(), None)
            .unwrap();
        let mut request = GatewayRequest::new(method);
        request
            .headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
        request
    }

    #[test]
    fn test_dispatch_happy_path() {
        let gateway = gateway();
        let request = authed_request(&gateway, "tool.echo");

        let result = gateway
            .dispatch(&request, |req, claims| {
                assert_eq!(claims.subject, "alice");
                Ok(json!({"echo": req.method}))
            })
            .unwrap();
        assert_eq!(result["echo"], "tool.echo");
    }

    #[test]
    fn test_missing_token_is_sanitized_auth_failure() {
        let gateway = gateway();
        let request = GatewayRequest::new("tool.echo");

        let err = gateway
            .dispatch(&request, |_, _| Ok(json!(null)))
            .unwrap_err();
        assert_eq!(err.error_code, "AUTH_FAILED");
        assert_eq!(err.http_status, 401);
    }

    #[test]
    fn test_handler_error_is_sanitized() {
        let gateway = gateway();
        let request = authed_request(&gateway, "tool.echo");

        let err = gateway
            .dispatch(&request, |_, _| {
                Err(GatewayError::ToolExecution(
                    "backend at 10.0.0.9 crashed".to_string(),
                ))
            })
            .unwrap_err();
        assert_eq!(err.error_code, "TOOL_EXECUTION_FAILED");
        assert!(!err.public_message.contains("10.0.0.9"));
        assert!(!err.error_id.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.lockout_secs = 0;
        assert!(matches!(
            Gateway::new(config),
            Err(GatewayError::InvalidInput(_))
        ));
    }
}
