//! API key authentication and rate limiting
//!
//! Every externally sourced request passes through [`ApiKeyValidator`]:
//! key lookup, domain binding, replay window, permission check, then
//! rate limiting, in that order. Failures come back as typed errors
//! carrying the right HTTP status; quota is only consumed by requests
//! that pass everything else.

pub mod rate_limit;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{CalypsoError, Result};
use crate::types::{ApiKeyRecord, Permission, RequestContext};
use chrono::Duration;
use rate_limit::KeyUsage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof that a request cleared authentication
#[derive(Debug, Clone)]
pub struct AuthGrant {
    /// Domain the key is bound to (`*` for unrestricted keys)
    pub key_domain: String,

    /// Permission the request exercised
    pub permission: Permission,

    /// Server-assigned id tying the grant to audit entries
    pub request_id: String,
}

pub struct ApiKeyValidator {
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    keys: RwLock<HashMap<String, ApiKeyRecord>>,
    usage: Mutex<HashMap<String, KeyUsage>>,
}

impl ApiKeyValidator {
    pub fn new(config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            keys: RwLock::new(HashMap::new()),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Add a key to the registry
    pub async fn register_key(&self, record: ApiKeyRecord) -> Result<()> {
        if record.key.trim().is_empty() {
            return Err(CalypsoError::Validation("api key must not be empty".into()));
        }
        if record.domain.trim().is_empty() {
            return Err(CalypsoError::Validation(
                "api key domain must not be empty".into(),
            ));
        }
        if record.permissions.is_empty() {
            return Err(CalypsoError::Validation(
                "api key needs at least one permission".into(),
            ));
        }

        let mut keys = self.keys.write().await;
        if keys.contains_key(&record.key) {
            return Err(CalypsoError::Validation(format!(
                "api key '{}' is already registered",
                record.key
            )));
        }
        debug!(domain = %record.domain, "API key registered");
        keys.insert(record.key.clone(), record);
        Ok(())
    }

    /// Deactivate a key; subsequent requests fail authentication
    pub async fn revoke_key(&self, key: &str) -> Result<()> {
        let mut keys = self.keys.write().await;
        match keys.get_mut(key) {
            Some(record) => {
                record.is_active = false;
                debug!(domain = %record.domain, "API key revoked");
                Ok(())
            }
            None => Err(CalypsoError::Validation(format!(
                "api key '{key}' is not registered"
            ))),
        }
    }

    /// Registered key count, active or not
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Run the full authentication pipeline for one request
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthGrant> {
        let now = self.clock.now();

        let record = {
            let keys = self.keys.read().await;
            keys.get(&ctx.api_key).cloned()
        };
        let Some(record) = record else {
            warn!(domain = %ctx.domain, "Rejected request with unknown api key");
            return Err(CalypsoError::Authentication("unknown api key".into()));
        };
        if !record.is_active {
            warn!(domain = %ctx.domain, "Rejected request with revoked api key");
            return Err(CalypsoError::Authentication("api key is revoked".into()));
        }
        if let Some(expires_at) = record.expires_at {
            if expires_at <= now {
                warn!(domain = %ctx.domain, "Rejected request with expired api key");
                return Err(CalypsoError::Authentication("api key is expired".into()));
            }
        }

        if record.domain != "*" && !record.domain.eq_ignore_ascii_case(&ctx.domain) {
            warn!(
                domain = %ctx.domain,
                key_domain = %record.domain,
                "Rejected request from domain the key is not bound to"
            );
            return Err(CalypsoError::Authorization(format!(
                "api key is not valid for domain '{}'",
                ctx.domain
            )));
        }

        if now - ctx.timestamp > Duration::seconds(self.config.replay_window_secs) {
            warn!(domain = %ctx.domain, "Rejected stale request timestamp");
            return Err(CalypsoError::Replay("request timestamp is too old".into()));
        }
        if ctx.timestamp - now > Duration::seconds(self.config.max_clock_skew_secs) {
            warn!(domain = %ctx.domain, "Rejected future request timestamp");
            return Err(CalypsoError::Replay(
                "request timestamp is too far in the future".into(),
            ));
        }

        let permission = ctx.request_type.required_permission();
        if !record.grants(permission) {
            warn!(
                domain = %ctx.domain,
                request_type = %ctx.request_type,
                "Rejected request lacking permission"
            );
            return Err(CalypsoError::Authorization(format!(
                "api key does not allow {} requests",
                ctx.request_type
            )));
        }

        // Quota is spent last so earlier failures never consume it
        {
            let mut usage = self.usage.lock().await;
            let counters = usage.entry(ctx.api_key.clone()).or_default();
            if let Err(window) = counters.check(now, &record.rate_limit) {
                warn!(domain = %ctx.domain, window = %window, "Rate limit exceeded");
                return Err(CalypsoError::RateLimit(format!(
                    "rate limit exceeded for the {window} window"
                )));
            }
            counters.commit();
        }

        let grant = AuthGrant {
            key_domain: record.domain,
            permission,
            request_id: Uuid::new_v4().to_string(),
        };
        debug!(
            domain = %ctx.domain,
            request_id = %grant.request_id,
            "Request authenticated"
        );
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{RateLimitConfig, RequestType};
    use chrono::{DateTime, TimeZone, Utc};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(key: &str, domain: &str, permissions: Vec<Permission>) -> ApiKeyRecord {
        ApiKeyRecord {
            key: key.to_string(),
            domain: domain.to_string(),
            permissions,
            created_at: start_time(),
            expires_at: None,
            is_active: true,
            rate_limit: RateLimitConfig::default(),
        }
    }

    fn ctx(key: &str, domain: &str, request_type: RequestType, at: DateTime<Utc>) -> RequestContext {
        RequestContext {
            domain: domain.to_string(),
            api_key: key.to_string(),
            request_type,
            timestamp: at,
        }
    }

    async fn validator() -> (ApiKeyValidator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let validator = ApiKeyValidator::new(AuthConfig::default(), clock.clone());
        validator
            .register_key(record("k-ads", "ads.example", vec![Permission::CohortAccess]))
            .await
            .unwrap();
        validator
            .register_key(record(
                "k-measure",
                "metrics.example",
                vec![Permission::MetricsAccess],
            ))
            .await
            .unwrap();
        (validator, clock)
    }

    #[tokio::test]
    async fn test_unknown_key_fails_authentication() {
        let (validator, clock) = validator().await;
        let err = validator
            .authenticate(&ctx("nope", "ads.example", RequestType::Advertising, clock.now()))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[tokio::test]
    async fn test_revoked_and_expired_keys_fail() {
        let (validator, clock) = validator().await;

        validator.revoke_key("k-ads").await.unwrap();
        let err = validator
            .authenticate(&ctx("k-ads", "ads.example", RequestType::Advertising, clock.now()))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 401);

        let mut expiring = record("k-exp", "ads.example", vec![Permission::CohortAccess]);
        expiring.expires_at = Some(clock.now() + chrono::Duration::hours(1));
        validator.register_key(expiring).await.unwrap();
        clock.advance(chrono::Duration::hours(2));
        let request = ctx("k-exp", "ads.example", RequestType::Advertising, clock.now());
        let err = validator.authenticate(&request).await.unwrap_err();
        assert_eq!(err.http_status(), 401);
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_domain_binding() {
        let (validator, clock) = validator().await;

        let err = validator
            .authenticate(&ctx("k-ads", "other.example", RequestType::Advertising, clock.now()))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);

        // Case differences are not a mismatch
        validator
            .authenticate(&ctx("k-ads", "ADS.example", RequestType::Advertising, clock.now()))
            .await
            .unwrap();

        // Wildcard keys work from anywhere
        validator
            .register_key(record("k-any", "*", vec![Permission::Admin]))
            .await
            .unwrap();
        validator
            .authenticate(&ctx("k-any", "whoever.example", RequestType::Measurement, clock.now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replay_window() {
        let (validator, clock) = validator().await;
        let now = clock.now();

        let stale = ctx(
            "k-ads",
            "ads.example",
            RequestType::Advertising,
            now - chrono::Duration::seconds(301),
        );
        let err = validator.authenticate(&stale).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.kind(), "replay_error");

        let future = ctx(
            "k-ads",
            "ads.example",
            RequestType::Advertising,
            now + chrono::Duration::seconds(61),
        );
        assert!(validator.authenticate(&future).await.is_err());

        // Inside both bounds passes
        let fresh = ctx(
            "k-ads",
            "ads.example",
            RequestType::Advertising,
            now - chrono::Duration::seconds(299),
        );
        validator.authenticate(&fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_permission_mapping() {
        let (validator, clock) = validator().await;
        let now = clock.now();

        // A cohort-access key cannot make measurement requests
        let err = validator
            .authenticate(&ctx("k-ads", "ads.example", RequestType::Measurement, now))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);

        // And a metrics-access key cannot make advertising requests
        let err = validator
            .authenticate(&ctx("k-measure", "metrics.example", RequestType::Advertising, now))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 403);

        // Admin covers both
        validator
            .register_key(record("k-admin", "ops.example", vec![Permission::Admin]))
            .await
            .unwrap();
        for request_type in [RequestType::Advertising, RequestType::Measurement] {
            validator
                .authenticate(&ctx("k-admin", "ops.example", request_type, now))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_rate_limit_per_key_with_refill() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let validator = ApiKeyValidator::new(AuthConfig::default(), clock.clone());
        for key in ["k-a", "k-b"] {
            let mut r = record(key, "*", vec![Permission::Admin]);
            r.rate_limit = RateLimitConfig {
                per_minute: 2,
                per_hour: 100,
                per_day: 1_000,
            };
            validator.register_key(r).await.unwrap();
        }

        let request = |key: &str, at| ctx(key, "site.example", RequestType::Advertising, at);
        for _ in 0..2 {
            validator.authenticate(&request("k-a", clock.now())).await.unwrap();
        }
        let err = validator
            .authenticate(&request("k-a", clock.now()))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 429);
        assert!(err.to_string().contains("minute"));

        // Another key is unaffected
        validator.authenticate(&request("k-b", clock.now())).await.unwrap();

        // A fresh minute refills the exhausted key
        clock.advance(chrono::Duration::seconds(61));
        validator.authenticate(&request("k-a", clock.now())).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_requests_spend_no_quota() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let validator = ApiKeyValidator::new(AuthConfig::default(), clock.clone());
        let mut r = record("k-one", "site.example", vec![Permission::CohortAccess]);
        r.rate_limit = RateLimitConfig {
            per_minute: 1,
            per_hour: 100,
            per_day: 1_000,
        };
        validator.register_key(r).await.unwrap();

        // Permission failures come before the limiter
        for _ in 0..3 {
            let denied = ctx("k-one", "site.example", RequestType::Measurement, clock.now());
            assert_eq!(validator.authenticate(&denied).await.unwrap_err().http_status(), 403);
        }

        // The single slot is still available
        let allowed = ctx("k-one", "site.example", RequestType::Advertising, clock.now());
        validator.authenticate(&allowed).await.unwrap();
        assert_eq!(validator.authenticate(&allowed).await.unwrap_err().http_status(), 429);
    }

    #[tokio::test]
    async fn test_registry_rejects_bad_records() {
        let (validator, _) = validator().await;

        assert!(validator
            .register_key(record("", "x.example", vec![Permission::Admin]))
            .await
            .is_err());
        assert!(validator
            .register_key(record("k-new", " ", vec![Permission::Admin]))
            .await
            .is_err());
        assert!(validator
            .register_key(record("k-new", "x.example", vec![]))
            .await
            .is_err());
        // Duplicate key
        assert!(validator
            .register_key(record("k-ads", "x.example", vec![Permission::Admin]))
            .await
            .is_err());
        // Unknown revocation
        assert!(validator.revoke_key("ghost").await.is_err());

        assert_eq!(validator.key_count().await, 2);
    }
}
