//! HTTP API server

use crate::cohorts::CohortEngine;
use crate::error::CalypsoError;
use crate::gateway::CohortGateway;
use crate::metrics::MetricsAggregator;
use crate::taxonomy::Taxonomy;
use crate::types::{
    AggregatedMetrics, CohortAssignment, MetricsEvent, RequestContext, SharingPreferences,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8722).into(),
        }
    }
}

/// API server state
#[derive(Clone)]
struct AppState {
    gateway: Arc<CohortGateway>,
    engine: Arc<CohortEngine>,
    aggregator: Arc<MetricsAggregator>,
    taxonomy: Arc<Taxonomy>,
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create new API server over already-built services
    pub fn new(
        config: ApiServerConfig,
        gateway: Arc<CohortGateway>,
        engine: Arc<CohortEngine>,
        aggregator: Arc<MetricsAggregator>,
        taxonomy: Arc<Taxonomy>,
    ) -> Self {
        Self {
            config,
            state: AppState {
                gateway,
                engine,
                aggregator,
                taxonomy,
            },
        }
    }

    /// Build router
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            // External surface (authenticated through the gateway)
            .route("/v1/cohorts", post(cohorts_handler))
            .route("/v1/metrics", post(metrics_handler))
            .route("/v1/events", post(record_event_handler))
            // Host seams (trusted side of the boundary)
            .route("/v1/visits", post(visit_handler))
            .route("/v1/users/:user_id/preferences", put(preferences_handler))
            .route("/v1/users/:user_id/cohorts", get(user_cohorts_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
    }

    /// Bind and serve until the listener fails
    pub async fn serve(self) -> crate::error::Result<()> {
        let router = Self::build_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!("Cohort API listening on http://{}", self.config.addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// CalypsoError as an HTTP response
#[derive(Debug)]
struct ApiError(CalypsoError);

impl From<CalypsoError> for ApiError {
    fn from(err: CalypsoError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.0.to_body();
        let status =
            StatusCode::from_u16(body.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Cohort id request: caller identity plus the user being queried
#[derive(Debug, Deserialize)]
struct CohortIdsRequest {
    user_id: String,
    #[serde(flatten)]
    ctx: RequestContext,
}

#[derive(Debug, Serialize)]
struct CohortIdsResponse {
    cohort_ids: Vec<String>,
}

async fn cohorts_handler(
    State(state): State<AppState>,
    Json(req): Json<CohortIdsRequest>,
) -> ApiResult<Json<CohortIdsResponse>> {
    let cohort_ids = state.gateway.get_cohort_ids(&req.user_id, &req.ctx).await?;
    Ok(Json(CohortIdsResponse { cohort_ids }))
}

#[derive(Debug, Deserialize)]
struct MetricsRequest {
    #[serde(flatten)]
    ctx: RequestContext,
    cohort_ids: Vec<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    metrics: Vec<AggregatedMetrics>,
}

async fn metrics_handler(
    State(state): State<AppState>,
    Json(req): Json<MetricsRequest>,
) -> ApiResult<Json<MetricsResponse>> {
    let metrics = state
        .gateway
        .get_aggregated_metrics(&req.ctx, &req.cohort_ids, req.start, req.end)
        .await?;
    Ok(Json(MetricsResponse { metrics }))
}

#[derive(Debug, Deserialize)]
struct RecordEventRequest {
    #[serde(flatten)]
    ctx: RequestContext,
    event: MetricsEvent,
}

async fn record_event_handler(
    State(state): State<AppState>,
    Json(req): Json<RecordEventRequest>,
) -> ApiResult<StatusCode> {
    state.gateway.record_event(&req.ctx, &req.event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Host-reported page visit
#[derive(Debug, Deserialize)]
struct VisitRequest {
    user_id: String,
    domain: String,
    /// Defaults to now when the host omits it
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct VisitResponse {
    assignments: Vec<CohortAssignment>,
}

async fn visit_handler(
    State(state): State<AppState>,
    Json(req): Json<VisitRequest>,
) -> ApiResult<Json<VisitResponse>> {
    let at = req.timestamp.unwrap_or_else(Utc::now);
    let assignments = state.gateway.on_page_visit(&req.user_id, &req.domain, at).await?;
    Ok(Json(VisitResponse { assignments }))
}

async fn preferences_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(preferences): Json<SharingPreferences>,
) -> ApiResult<StatusCode> {
    state.gateway.update_preferences(&user_id, &preferences).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct UserCohortsResponse {
    assignments: Vec<CohortAssignment>,
}

async fn user_cohorts_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserCohortsResponse>> {
    let assignments = state.engine.assignments(&user_id).await?;
    Ok(Json(UserCohortsResponse { assignments }))
}

/// Health check handler
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    topics: usize,
    events_recorded: u64,
    audit_entries: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        topics: state.taxonomy.len(),
        events_recorded: state.aggregator.event_count().await,
        audit_entries: state.gateway.audit_log().len().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyValidator;
    use crate::clock::SystemClock;
    use crate::config::{AuthConfig, EngineConfig, GatewayConfig, PrivacyConfig};
    use crate::storage::{MemoryStore, PlaintextCipher};

    fn test_state() -> AppState {
        let clock = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(PlaintextCipher);
        let gateway_config = GatewayConfig::default();
        let taxonomy = Arc::new(Taxonomy::builtin().unwrap());

        let engine = Arc::new(CohortEngine::new(
            taxonomy.clone(),
            EngineConfig::default(),
            clock.clone(),
            store.clone(),
            cipher.clone(),
            gateway_config.storage_secret.as_bytes().to_vec(),
        ));
        let aggregator = Arc::new(MetricsAggregator::new(PrivacyConfig::default()));
        let validator = Arc::new(ApiKeyValidator::new(AuthConfig::default(), clock.clone()));
        let gateway = Arc::new(CohortGateway::new(
            engine.clone(),
            aggregator.clone(),
            validator,
            store,
            cipher,
            &gateway_config,
            clock,
        ));
        AppState {
            gateway,
            engine,
            aggregator,
            taxonomy,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.0.status, "ok");
        assert!(response.0.topics > 0);
        assert_eq!(response.0.events_recorded, 0);
    }

    #[tokio::test]
    async fn test_visit_then_user_cohorts() {
        let state = test_state();

        for _ in 0..4 {
            let req = VisitRequest {
                user_id: "u1".to_string(),
                domain: "github.com".to_string(),
                timestamp: None,
            };
            visit_handler(State(state.clone()), Json(req)).await.unwrap();
        }

        let response = user_cohorts_handler(State(state), Path("u1".to_string()))
            .await
            .unwrap();
        assert!(!response.0.assignments.is_empty());
    }

    #[tokio::test]
    async fn test_errors_map_to_status_and_body() {
        let state = test_state();
        let req = CohortIdsRequest {
            user_id: "u1".to_string(),
            ctx: RequestContext {
                domain: "ads.example".to_string(),
                api_key: "unknown".to_string(),
                request_type: crate::types::RequestType::Advertising,
                timestamp: Utc::now(),
            },
        };

        let err = cohorts_handler(State(state), Json(req)).await.err().unwrap();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_request_bodies_flatten_context() {
        let raw = r#"{
            "user_id": "u1",
            "domain": "shop.example",
            "api_key": "k",
            "request_type": "advertising",
            "timestamp": "2024-03-01T12:00:00Z"
        }"#;
        let req: CohortIdsRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.ctx.domain, "shop.example");
    }
}
