//! Calypso - Privacy-Preserving Interest Cohort System
//!
//! A service core for interest-based ad personalization without individual
//! tracking:
//! - Hierarchical topic taxonomy with sensitivity inheritance
//! - Browsing-derived cohort assignment with frequency/recency scoring
//! - Differentially private metrics aggregation with k-anonymity gates
//! - Authenticated, rate-limited, audited external gateway
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (Topic, CohortAssignment, MetricsEvent)
//! - **Engine**: Per-user visit history and cohort computation
//! - **Aggregator**: Event ingestion and privacy-gated reporting
//! - **Gateway**: The only externally reachable surface, over auth + audit
//!
//! # Example
//!
//! ```ignore
//! use calypso_core::{CohortEngine, Taxonomy};
//! use calypso_core::clock::SystemClock;
//! use calypso_core::config::EngineConfig;
//! use calypso_core::storage::{MemoryStore, PlaintextCipher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> calypso_core::Result<()> {
//!     let engine = CohortEngine::new(
//!         Arc::new(Taxonomy::builtin()?),
//!         EngineConfig::default(),
//!         Arc::new(SystemClock),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(PlaintextCipher),
//!         b"storage-secret".to_vec(),
//!     );
//!
//!     engine.record_visit("user-1", "github.com", chrono::Utc::now()).await?;
//!     let assignments = engine.assign_cohorts("user-1").await?;
//!     println!("{assignments:#?}");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod cohorts;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod storage;
pub mod taxonomy;
pub mod types;

// Re-export commonly used types
pub use auth::ApiKeyValidator;
pub use cohorts::CohortEngine;
pub use config::CalypsoConfig;
pub use error::{CalypsoError, Result};
pub use gateway::CohortGateway;
pub use metrics::MetricsAggregator;
pub use taxonomy::Taxonomy;
pub use types::{
    AggregatedMetrics, ApiKeyRecord, CohortAssignment, MetricsEvent, Permission, RequestContext,
    RequestType, SharingPreferences, Topic, TopicId,
};
