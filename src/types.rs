//! Core data types for the Calypso cohort system
//!
//! This module defines the fundamental data structures used throughout
//! calypso: taxonomy topics, domain visits, cohort assignments, metrics
//! events and aggregates, API key records, and audit entries. These types
//! form the shared vocabulary of the engine, aggregator, and gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for taxonomy topics
///
/// Wraps a u32 to provide type safety and prevent mixing topic ids with
/// other numeric identifiers. Topic ids are always positive; 0 is reserved
/// as invalid and rejected at taxonomy load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub u32);

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the interest taxonomy forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    /// Unique positive id
    pub id: TopicId,

    /// Human-readable name (Title Case, unique case-insensitively)
    pub name: String,

    /// Depth in the tree; roots are level 1, children are parent + 1
    pub level: u32,

    /// Parent topic, absent for roots
    pub parent_id: Option<TopicId>,

    /// Sensitive topics (and their descendants) are never assigned or shared
    pub is_sensitive: bool,

    /// Short description used by substring search
    pub description: String,
}

/// Accumulated visit record for one domain
///
/// One record per distinct domain, mutated in place as visits arrive.
/// The count saturates at a configured cap so a single hot domain cannot
/// grow without bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainVisit {
    /// Registrable domain, lower-cased (e.g. `netflix.com`)
    pub domain: String,

    /// Timestamp of the most recent visit
    pub last_visit: DateTime<Utc>,

    /// Total visits, saturating at the configured cap
    pub visit_count: u32,
}

/// An interest cohort assigned to a user
///
/// Immutable once created; removed (never edited) on expiry or when a
/// re-scoring pass displaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortAssignment {
    /// Assigned taxonomy topic
    pub topic_id: TopicId,

    /// Topic name at assignment time
    pub topic_name: String,

    /// Normalized score share in (0, 1]
    pub confidence: f64,

    /// When the assignment was made
    pub assigned_at: DateTime<Utc>,

    /// `assigned_at` + 21 days
    pub expires_at: DateTime<Utc>,
}

impl CohortAssignment {
    /// Whether the assignment has passed its expiry instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Kind of an externally supplied ad event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Conversion,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Impression => write!(f, "impression"),
            EventType::Click => write!(f, "click"),
            EventType::Conversion => write!(f, "conversion"),
        }
    }
}

/// Externally supplied ad-performance event
///
/// Immutable and append-only once accepted; the aggregator partitions the
/// log by UTC hour bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEvent {
    /// Caller-supplied unique id; duplicates are rejected
    pub event_id: String,

    /// Impression, click, or conversion
    pub event_type: EventType,

    /// Opaque cohort id the event is attributed to
    pub cohort_id: String,

    /// When the event occurred
    pub at: DateTime<Utc>,

    /// Site the event occurred on
    pub domain: String,

    /// Optional free-form metadata (e.g. `value` for conversions)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Noise/threshold calibration tier, derived from the breadth of a query
///
/// Wider queries (more cohorts) mix more users together and may run with
/// gentler noise; narrow queries get the strictest treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationLevel {
    High,
    Medium,
    Low,
}

impl AggregationLevel {
    /// Level for a query over `cohort_count` cohort ids
    pub fn for_cohort_count(cohort_count: usize) -> Self {
        match cohort_count {
            n if n >= 5 => AggregationLevel::High,
            3..=4 => AggregationLevel::Medium,
            _ => AggregationLevel::Low,
        }
    }
}

/// Derived per-cohort metrics, never persisted raw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    /// Cohort the bucket aggregates
    pub cohort_id: String,

    /// Noised impression count (zeroed below the privacy threshold)
    pub impressions: u64,

    /// Noised click count
    pub clicks: u64,

    /// Noised conversion count
    pub conversions: u64,

    /// clicks / impressions * 100, 0 below the low-volume cutoff
    pub click_through_rate: f64,

    /// conversions / clicks * 100, 0 below the low-volume cutoff
    pub conversion_rate: f64,

    /// Calibration tier the query ran at
    pub aggregation_level: AggregationLevel,

    /// Noised contributing-event count
    pub data_points: u64,

    /// False when the bucket was suppressed for being too small
    pub privacy_threshold_met: bool,
}

/// Time-window granularity for bucketed aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
}

/// Impression/conversion pairing within a cohort and query window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionReport {
    /// Cohort both events belong to
    pub cohort_id: String,

    /// UTC day of the source impression
    pub source_day: String,

    /// UTC day of the triggering conversion
    pub trigger_day: String,

    /// Noised conversion value
    pub conversion_value: f64,

    /// Privacy budget left for this cohort/window after issuing the report
    pub privacy_budget_remaining: f64,
}

/// Capability granted to an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// May read anonymized cohort ids
    CohortAccess,

    /// May read aggregated metrics and submit events
    MetricsAccess,

    /// Grants every capability
    Admin,
}

/// Per-window request ceilings for one API key
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per minute
    pub per_minute: u32,

    /// Requests allowed per hour
    pub per_hour: u32,

    /// Requests allowed per day
    pub per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1_000,
            per_day: 10_000,
        }
    }
}

/// Registered API key and its scoping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// The key material itself
    pub key: String,

    /// Domain the key is bound to; `*` matches any
    pub domain: String,

    /// Capabilities granted to the key
    pub permissions: Vec<Permission>,

    /// When the key was minted
    pub created_at: DateTime<Utc>,

    /// Optional hard expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Revoked keys stay registered but inactive
    pub is_active: bool,

    /// Per-window ceilings applied to this key
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ApiKeyRecord {
    /// Whether the key carries `permission` directly or via Admin
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| *p == permission || *p == Permission::Admin)
    }
}

/// Declared purpose of an external request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Ad targeting; requires cohort access
    Advertising,

    /// Reporting and event submission; requires metrics access
    Measurement,
}

impl RequestType {
    /// Permission an authenticated request of this type must hold
    pub fn required_permission(&self) -> Permission {
        match self {
            RequestType::Advertising => Permission::CohortAccess,
            RequestType::Measurement => Permission::MetricsAccess,
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Advertising => write!(f, "advertising"),
            RequestType::Measurement => write!(f, "measurement"),
        }
    }
}

/// Identity and intent of one external request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller's domain
    pub domain: String,

    /// Caller's API key
    pub api_key: String,

    /// Declared purpose
    pub request_type: RequestType,

    /// Caller-stamped time; stale values fail replay protection
    pub timestamp: DateTime<Utc>,
}

/// Per-user sharing controls, host-writable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingPreferences {
    /// Master switch for cohort computation exposure
    pub cohort_sharing_enabled: bool,

    /// Switch for sharing with advertising callers
    pub advertiser_sharing_enabled: bool,

    /// Topics the user has opted out of individually
    #[serde(default)]
    pub disabled_topics: Vec<TopicId>,
}

impl Default for SharingPreferences {
    fn default() -> Self {
        Self {
            cohort_sharing_enabled: true,
            advertiser_sharing_enabled: true,
            disabled_topics: Vec::new(),
        }
    }
}

/// One entry in the gateway's append-only audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Gateway-assigned request id
    pub request_id: String,

    /// Requesting domain
    pub domain: String,

    /// When the gateway handled the request
    pub timestamp: DateTime<Utc>,

    /// Anonymized cohort ids included in the response (empty on failure)
    pub cohorts_shared: Vec<String>,

    /// Declared request purpose, or the failure category
    pub request_type: String,

    /// Whether user preferences permitted sharing at the time
    pub user_consent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_assignment_expiry() {
        let now = Utc::now();
        let assignment = CohortAssignment {
            topic_id: TopicId(7),
            topic_name: "Jazz".to_string(),
            confidence: 0.8,
            assigned_at: now,
            expires_at: now + Duration::days(21),
        };

        assert!(!assignment.is_expired(now));
        assert!(!assignment.is_expired(now + Duration::days(20)));
        assert!(assignment.is_expired(now + Duration::days(21)));
        assert!(assignment.is_expired(now + Duration::days(30)));
    }

    #[test]
    fn test_aggregation_level_from_cohort_count() {
        assert_eq!(
            AggregationLevel::for_cohort_count(1),
            AggregationLevel::Low
        );
        assert_eq!(
            AggregationLevel::for_cohort_count(2),
            AggregationLevel::Low
        );
        assert_eq!(
            AggregationLevel::for_cohort_count(3),
            AggregationLevel::Medium
        );
        assert_eq!(
            AggregationLevel::for_cohort_count(4),
            AggregationLevel::Medium
        );
        assert_eq!(
            AggregationLevel::for_cohort_count(5),
            AggregationLevel::High
        );
        assert_eq!(
            AggregationLevel::for_cohort_count(10),
            AggregationLevel::High
        );
    }

    #[test]
    fn test_admin_grants_everything() {
        let record = ApiKeyRecord {
            key: "k".to_string(),
            domain: "ads.example".to_string(),
            permissions: vec![Permission::Admin],
            created_at: Utc::now(),
            expires_at: None,
            is_active: true,
            rate_limit: RateLimitConfig::default(),
        };

        assert!(record.grants(Permission::CohortAccess));
        assert!(record.grants(Permission::MetricsAccess));
        assert!(record.grants(Permission::Admin));
    }

    #[test]
    fn test_request_type_permission_mapping() {
        assert_eq!(
            RequestType::Advertising.required_permission(),
            Permission::CohortAccess
        );
        assert_eq!(
            RequestType::Measurement.required_permission(),
            Permission::MetricsAccess
        );
    }

    #[test]
    fn test_sharing_preferences_default_to_enabled() {
        let prefs = SharingPreferences::default();
        assert!(prefs.cohort_sharing_enabled);
        assert!(prefs.advertiser_sharing_enabled);
        assert!(prefs.disabled_topics.is_empty());
    }
}
