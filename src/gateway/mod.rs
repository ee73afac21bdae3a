//! External API gateway
//!
//! The single choke point between external callers and user data. Each
//! externally reachable operation authenticates, validates, delegates to
//! the engine or aggregator, anonymizes anything user-derived, and
//! appends exactly one audit entry whether it succeeded or not. Host-side
//! seams (visit feed, preferences, deletion) skip auth and audit; they
//! never cross the trust boundary.

pub mod anonymize;
pub mod audit;

use crate::auth::ApiKeyValidator;
use crate::clock::Clock;
use crate::cohorts::CohortEngine;
use crate::config::GatewayConfig;
use crate::error::{CalypsoError, Result};
use crate::metrics::MetricsAggregator;
use crate::storage::{keys, EncryptionProvider, KeyValueStore};
use crate::types::{
    AggregatedMetrics, AuditLogEntry, CohortAssignment, MetricsEvent, RequestContext, RequestType,
    SharingPreferences,
};
use anonymize::CohortAnonymizer;
use audit::AuditLog;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct CohortGateway {
    engine: Arc<CohortEngine>,
    aggregator: Arc<MetricsAggregator>,
    validator: Arc<ApiKeyValidator>,
    anonymizer: CohortAnonymizer,
    audit: AuditLog,
    store: Arc<dyn KeyValueStore>,
    cipher: Arc<dyn EncryptionProvider>,
    storage_key: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl CohortGateway {
    pub fn new(
        engine: Arc<CohortEngine>,
        aggregator: Arc<MetricsAggregator>,
        validator: Arc<ApiKeyValidator>,
        store: Arc<dyn KeyValueStore>,
        cipher: Arc<dyn EncryptionProvider>,
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            aggregator,
            validator,
            anonymizer: CohortAnonymizer::new(config.anonymization_secret.as_bytes()),
            audit: AuditLog::new(config.audit_retention),
            store,
            cipher,
            storage_key: config.storage_secret.as_bytes().to_vec(),
            clock,
        }
    }

    /// Anonymized cohort ids for one user, under their preferences
    ///
    /// The only path by which cohort data leaves the system. Returns at
    /// most three opaque weekly tokens; a user who disabled sharing gets
    /// an empty list that looks identical to having no cohorts.
    pub async fn get_cohort_ids(
        &self,
        user_id: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>> {
        match self.cohort_ids_inner(user_id, ctx).await {
            Ok((request_id, ids, consent)) => {
                self.append_audit(request_id, ctx, ids.clone(), consent).await;
                Ok(ids)
            }
            Err(err) => {
                self.log_if_internal(&err, "cohort id lookup failed");
                self.append_audit(Uuid::new_v4().to_string(), ctx, Vec::new(), false)
                    .await;
                Err(err)
            }
        }
    }

    async fn cohort_ids_inner(
        &self,
        user_id: &str,
        ctx: &RequestContext,
    ) -> Result<(String, Vec<String>, bool)> {
        validate_context(ctx)?;
        if user_id.trim().is_empty() {
            return Err(CalypsoError::Validation("user id must not be empty".into()));
        }
        let grant = self.validator.authenticate(ctx).await?;

        let preferences = self.load_preferences(user_id).await?;
        let advertiser_blocked =
            ctx.request_type == RequestType::Advertising && !preferences.advertiser_sharing_enabled;
        if !preferences.cohort_sharing_enabled || advertiser_blocked {
            return Ok((grant.request_id, Vec::new(), false));
        }

        let now = self.clock.now();
        let cohorts = self.engine.cohorts_for_sharing(user_id, &preferences).await?;
        let mut ids = Vec::with_capacity(cohorts.len());
        for assignment in &cohorts {
            ids.push(
                self.anonymizer
                    .anonymize(assignment.topic_id, &assignment.topic_name, now)?,
            );
        }
        Ok((grant.request_id, ids, true))
    }

    /// Privacy-gated aggregate metrics for up to ten cohorts
    pub async fn get_aggregated_metrics(
        &self,
        ctx: &RequestContext,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregatedMetrics>> {
        let result = self.metrics_inner(ctx, cohort_ids, start, end).await;
        match result {
            Ok((request_id, metrics)) => {
                self.append_audit(request_id, ctx, cohort_ids.to_vec(), true).await;
                Ok(metrics)
            }
            Err(err) => {
                self.log_if_internal(&err, "metrics query failed");
                self.append_audit(Uuid::new_v4().to_string(), ctx, Vec::new(), false)
                    .await;
                Err(err)
            }
        }
    }

    async fn metrics_inner(
        &self,
        ctx: &RequestContext,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(String, Vec<AggregatedMetrics>)> {
        validate_context(ctx)?;
        require_measurement(ctx)?;
        let grant = self.validator.authenticate(ctx).await?;
        let metrics = self.aggregator.aggregate(cohort_ids, start, end).await?;
        Ok((grant.request_id, metrics))
    }

    /// Accept one externally supplied ad event
    pub async fn record_event(&self, ctx: &RequestContext, event: &MetricsEvent) -> Result<()> {
        let result = self.record_event_inner(ctx, event).await;
        match result {
            Ok(request_id) => {
                self.append_audit(request_id, ctx, vec![event.cohort_id.clone()], true)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.log_if_internal(&err, "event ingestion failed");
                self.append_audit(Uuid::new_v4().to_string(), ctx, Vec::new(), false)
                    .await;
                Err(err)
            }
        }
    }

    async fn record_event_inner(&self, ctx: &RequestContext, event: &MetricsEvent) -> Result<String> {
        validate_context(ctx)?;
        require_measurement(ctx)?;
        let grant = self.validator.authenticate(ctx).await?;
        self.aggregator.record_event(event).await?;
        Ok(grant.request_id)
    }

    /// Host-side visit feed; records the visit and recomputes cohorts
    pub async fn on_page_visit(
        &self,
        user_id: &str,
        domain: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<CohortAssignment>> {
        self.engine.record_visit(user_id, domain, at).await?;
        self.engine.assign_cohorts(user_id).await
    }

    /// Host-side preference write
    pub async fn update_preferences(
        &self,
        user_id: &str,
        preferences: &SharingPreferences,
    ) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(CalypsoError::Validation("user id must not be empty".into()));
        }
        let plaintext = serde_json::to_vec(preferences)?;
        let ciphertext = self.cipher.encrypt(&plaintext, &self.storage_key).await?;
        self.store
            .put(&keys::preferences(user_id), ciphertext)
            .await?;
        info!(user_id, "Sharing preferences updated");
        Ok(())
    }

    /// Host-side deletion seam; forwards to the engine
    pub async fn clear_user(&self, user_id: &str) -> Result<()> {
        self.engine.clear_user(user_id).await
    }

    /// Stored preferences for `user_id`, defaults when none were set
    pub async fn load_preferences(&self, user_id: &str) -> Result<SharingPreferences> {
        match self.store.get(&keys::preferences(user_id)).await? {
            Some(ciphertext) => {
                let plaintext = self.cipher.decrypt(&ciphertext, &self.storage_key).await?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
            None => Ok(SharingPreferences::default()),
        }
    }

    /// The audit trail, for host-side inspection
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    async fn append_audit(
        &self,
        request_id: String,
        ctx: &RequestContext,
        cohorts_shared: Vec<String>,
        user_consent: bool,
    ) {
        self.audit
            .append(AuditLogEntry {
                request_id,
                domain: ctx.domain.clone(),
                timestamp: self.clock.now(),
                cohorts_shared,
                request_type: ctx.request_type.to_string(),
                user_consent,
            })
            .await;
    }

    fn log_if_internal(&self, err: &CalypsoError, what: &str) {
        if err.http_status() >= 500 {
            error!(error = %err, "{what}");
        }
    }
}

fn validate_context(ctx: &RequestContext) -> Result<()> {
    if ctx.domain.trim().is_empty() {
        return Err(CalypsoError::Validation(
            "request domain must not be empty".into(),
        ));
    }
    if ctx.api_key.trim().is_empty() {
        return Err(CalypsoError::Validation(
            "request api key must not be empty".into(),
        ));
    }
    Ok(())
}

fn require_measurement(ctx: &RequestContext) -> Result<()> {
    if ctx.request_type != RequestType::Measurement {
        return Err(CalypsoError::Authorization(format!(
            "{} requests cannot access measurement operations",
            ctx.request_type
        )));
    }
    Ok(())
}
