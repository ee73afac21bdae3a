//! Configuration for the Calypso service
//!
//! Each component reads its own section; everything has a sensible
//! default so a bare `CalypsoConfig::default()` is a working in-memory
//! deployment. Files are TOML, loaded through the `config` crate with
//! `CALYPSO_*` environment overrides (e.g. `CALYPSO_SERVER__PORT=9000`).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cohort assignment engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Domains visited fewer times than this contribute no signal
    #[serde(default = "default_min_visits")]
    pub min_visits: u32,

    /// Per-domain visit count saturation cap
    #[serde(default = "default_visit_count_cap")]
    pub visit_count_cap: u32,

    /// Half-life of the recency decay, in days
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,

    /// Maximum live assignments per user
    #[serde(default = "default_max_cohorts")]
    pub max_cohorts: usize,

    /// Maximum cohorts ever exposed through the sharing view
    #[serde(default = "default_sharing_limit")]
    pub sharing_limit: usize,

    /// Assignment lifetime in days
    #[serde(default = "default_assignment_ttl_days")]
    pub assignment_ttl_days: i64,

    /// Minimum days between maintenance passes for one user
    #[serde(default = "default_maintenance_interval_days")]
    pub maintenance_interval_days: i64,

    /// Visits idle longer than this many days are pruned by maintenance
    #[serde(default = "default_visit_retention_days")]
    pub visit_retention_days: i64,
}

fn default_min_visits() -> u32 {
    3
}

fn default_visit_count_cap() -> u32 {
    1_000
}

fn default_recency_half_life_days() -> f64 {
    14.0
}

fn default_max_cohorts() -> usize {
    5
}

fn default_sharing_limit() -> usize {
    3
}

fn default_assignment_ttl_days() -> i64 {
    21
}

fn default_maintenance_interval_days() -> i64 {
    7
}

fn default_visit_retention_days() -> i64 {
    90
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_visits: default_min_visits(),
            visit_count_cap: default_visit_count_cap(),
            recency_half_life_days: default_recency_half_life_days(),
            max_cohorts: default_max_cohorts(),
            sharing_limit: default_sharing_limit(),
            assignment_ttl_days: default_assignment_ttl_days(),
            maintenance_interval_days: default_maintenance_interval_days(),
            visit_retention_days: default_visit_retention_days(),
        }
    }
}

/// Privacy thresholds and noise calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Minimum samples per bucket at High aggregation
    #[serde(default = "default_threshold_high")]
    pub min_samples_high: u64,

    /// Minimum samples per bucket at Medium aggregation
    #[serde(default = "default_threshold_medium")]
    pub min_samples_medium: u64,

    /// Minimum samples per bucket at Low aggregation
    #[serde(default = "default_threshold_low")]
    pub min_samples_low: u64,

    /// Laplace epsilon at High aggregation (largest = least noise)
    #[serde(default = "default_epsilon_high")]
    pub epsilon_high: f64,

    /// Laplace epsilon at Medium aggregation
    #[serde(default = "default_epsilon_medium")]
    pub epsilon_medium: f64,

    /// Laplace epsilon at Low aggregation
    #[serde(default = "default_epsilon_low")]
    pub epsilon_low: f64,

    /// Rate denominators below this report a rate of 0
    #[serde(default = "default_low_volume_cutoff")]
    pub low_volume_cutoff: u64,

    /// Starting attribution budget per cohort/window
    #[serde(default = "default_attribution_budget")]
    pub attribution_budget: f64,

    /// Budget drained by each issued attribution report
    #[serde(default = "default_attribution_report_cost")]
    pub attribution_report_cost: f64,

    /// How far back a conversion may look for its impression
    #[serde(default = "default_attribution_window_days")]
    pub attribution_window_days: i64,
}

fn default_threshold_high() -> u64 {
    50
}

fn default_threshold_medium() -> u64 {
    75
}

fn default_threshold_low() -> u64 {
    100
}

fn default_epsilon_high() -> f64 {
    1.0
}

fn default_epsilon_medium() -> f64 {
    0.5
}

fn default_epsilon_low() -> f64 {
    0.25
}

fn default_low_volume_cutoff() -> u64 {
    10
}

fn default_attribution_budget() -> f64 {
    1.0
}

fn default_attribution_report_cost() -> f64 {
    0.1
}

fn default_attribution_window_days() -> i64 {
    7
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            min_samples_high: default_threshold_high(),
            min_samples_medium: default_threshold_medium(),
            min_samples_low: default_threshold_low(),
            epsilon_high: default_epsilon_high(),
            epsilon_medium: default_epsilon_medium(),
            epsilon_low: default_epsilon_low(),
            low_volume_cutoff: default_low_volume_cutoff(),
            attribution_budget: default_attribution_budget(),
            attribution_report_cost: default_attribution_report_cost(),
            attribution_window_days: default_attribution_window_days(),
        }
    }
}

impl PrivacyConfig {
    /// Suppression threshold for `level`
    pub fn min_samples(&self, level: crate::types::AggregationLevel) -> u64 {
        use crate::types::AggregationLevel::*;
        match level {
            High => self.min_samples_high,
            Medium => self.min_samples_medium,
            Low => self.min_samples_low,
        }
    }

    /// Laplace epsilon for `level`
    pub fn epsilon(&self, level: crate::types::AggregationLevel) -> f64 {
        use crate::types::AggregationLevel::*;
        match level {
            High => self.epsilon_high,
            Medium => self.epsilon_medium,
            Low => self.epsilon_low,
        }
    }
}

/// Authentication and replay-protection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Request timestamps older than this many seconds are replays
    #[serde(default = "default_replay_window_secs")]
    pub replay_window_secs: i64,

    /// Tolerated forward clock skew in seconds
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
}

fn default_replay_window_secs() -> i64 {
    300
}

fn default_max_clock_skew_secs() -> i64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            replay_window_secs: default_replay_window_secs(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
        }
    }
}

/// Gateway anonymization and audit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Secret keying the weekly cohort-id HMAC; rotate to invalidate ids
    #[serde(default = "default_anonymization_secret")]
    pub anonymization_secret: String,

    /// Secret keying at-rest state encryption through the cipher seam
    #[serde(default = "default_storage_secret")]
    pub storage_secret: String,

    /// Audit entries kept before oldest-first pruning
    #[serde(default = "default_audit_retention")]
    pub audit_retention: usize,
}

fn default_anonymization_secret() -> String {
    // Placeholder for local development; deployments must override.
    "calypso-dev-anonymization-secret".to_string()
}

fn default_storage_secret() -> String {
    "calypso-dev-storage-secret".to_string()
}

fn default_audit_retention() -> usize {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            anonymization_secret: default_anonymization_secret(),
            storage_secret: default_storage_secret(),
            audit_retention: default_audit_retention(),
        }
    }
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8722
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalypsoConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl CalypsoConfig {
    /// Load from a TOML file with `CALYPSO_*` environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("CALYPSO").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load from environment overrides alone
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("CALYPSO").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggregationLevel;

    #[test]
    fn test_defaults_are_sane() {
        let config = CalypsoConfig::default();
        assert_eq!(config.engine.max_cohorts, 5);
        assert_eq!(config.engine.sharing_limit, 3);
        assert_eq!(config.engine.assignment_ttl_days, 21);
        assert_eq!(config.auth.replay_window_secs, 300);
        assert_eq!(config.gateway.audit_retention, 10_000);
    }

    #[test]
    fn test_narrow_queries_get_strictest_settings() {
        let privacy = PrivacyConfig::default();

        assert!(privacy.min_samples(AggregationLevel::Low) > privacy.min_samples(AggregationLevel::High));
        assert!(privacy.epsilon(AggregationLevel::Low) < privacy.epsilon(AggregationLevel::High));
    }

    #[test]
    fn test_load_from_toml_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[engine]\nmin_visits = 5\n\n[server]\nport = 9000\n"
        )
        .unwrap();

        let config = CalypsoConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.min_visits, 5);
        assert_eq!(config.server.port, 9000);
        // Unspecified sections fall back to defaults
        assert_eq!(config.engine.max_cohorts, 5);
        assert_eq!(config.privacy.low_volume_cutoff, 10);
    }
}
