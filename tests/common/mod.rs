//! Common test utilities and helpers

#![allow(dead_code)]

use calypso_core::auth::ApiKeyValidator;
use calypso_core::clock::{Clock, ManualClock};
use calypso_core::config::{AuthConfig, EngineConfig, GatewayConfig, PrivacyConfig};
use calypso_core::storage::{MemoryStore, PlaintextCipher};
use calypso_core::types::RateLimitConfig;
use calypso_core::{
    ApiKeyRecord, CohortEngine, CohortGateway, MetricsAggregator, Permission, RequestContext,
    RequestType, Taxonomy,
};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Friday noon; the ISO week rolls over the following Monday
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Privacy settings that make noise vanish so assertions can be exact
pub fn exact_privacy() -> PrivacyConfig {
    PrivacyConfig {
        epsilon_high: 1e9,
        epsilon_medium: 1e9,
        epsilon_low: 1e9,
        ..Default::default()
    }
}

/// The full service stack over deterministic time and in-memory storage
pub struct TestStack {
    pub gateway: Arc<CohortGateway>,
    pub engine: Arc<CohortEngine>,
    pub aggregator: Arc<MetricsAggregator>,
    pub validator: Arc<ApiKeyValidator>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub fn build_stack(privacy: PrivacyConfig) -> TestStack {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = Arc::new(MemoryStore::new());
    let cipher = Arc::new(PlaintextCipher);
    let gateway_config = GatewayConfig::default();

    let engine = Arc::new(CohortEngine::new(
        Arc::new(Taxonomy::builtin().expect("builtin taxonomy must load")),
        EngineConfig::default(),
        clock.clone(),
        store.clone(),
        cipher.clone(),
        gateway_config.storage_secret.as_bytes().to_vec(),
    ));
    let aggregator = Arc::new(MetricsAggregator::with_rng(
        privacy,
        StdRng::seed_from_u64(17),
    ));
    let validator = Arc::new(ApiKeyValidator::new(AuthConfig::default(), clock.clone()));
    let gateway = Arc::new(CohortGateway::new(
        engine.clone(),
        aggregator.clone(),
        validator.clone(),
        store.clone(),
        cipher,
        &gateway_config,
        clock.clone(),
    ));

    TestStack {
        gateway,
        engine,
        aggregator,
        validator,
        clock,
        store,
    }
}

/// Register an active key with default rate limits
pub async fn mint_key(
    stack: &TestStack,
    key: &str,
    domain: &str,
    permissions: Vec<Permission>,
) {
    stack
        .validator
        .register_key(ApiKeyRecord {
            key: key.to_string(),
            domain: domain.to_string(),
            permissions,
            created_at: stack.clock.now(),
            expires_at: None,
            is_active: true,
            rate_limit: RateLimitConfig::default(),
        })
        .await
        .expect("key registration must succeed");
}

/// A request context timestamped at the stack's current time
pub fn request(
    stack: &TestStack,
    key: &str,
    domain: &str,
    request_type: RequestType,
) -> RequestContext {
    RequestContext {
        domain: domain.to_string(),
        api_key: key.to_string(),
        request_type,
        timestamp: stack.clock.now(),
    }
}

/// Feed `n` visits to one domain at the current time
pub async fn visit_n(stack: &TestStack, user_id: &str, domain: &str, n: u32) {
    for _ in 0..n {
        stack
            .engine
            .record_visit(user_id, domain, stack.clock.now())
            .await
            .expect("visit must record");
    }
}
