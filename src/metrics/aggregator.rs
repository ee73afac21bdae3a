//! Privacy-preserving metrics aggregation
//!
//! Accepts externally supplied ad events into an append-only log bucketed
//! by hour, and answers aggregate queries through a privacy gate: buckets
//! below the k-anonymity threshold are zeroed, passing buckets get
//! independent Laplace noise per count, and rates are derived from the
//! noised counts. Raw per-event data never leaves this module.

use crate::config::PrivacyConfig;
use crate::error::{CalypsoError, Result};
use crate::metrics::attribution::AttributionLedger;
use crate::metrics::noise;
use crate::types::{
    AggregatedMetrics, AggregationLevel, AttributionReport, EventType, Granularity, MetricsEvent,
};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Most cohorts one query may cover
pub const MAX_COHORTS_PER_QUERY: usize = 10;

/// Longest allowed query range in days
pub const MAX_RANGE_DAYS: i64 = 90;

/// One granularity window of a bucketed series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Start of the window, UTC
    pub window_start: DateTime<Utc>,

    /// Released metrics for the window
    pub metrics: AggregatedMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketCounts {
    impressions: u64,
    clicks: u64,
    conversions: u64,
}

impl BucketCounts {
    fn add(&mut self, event_type: EventType) {
        match event_type {
            EventType::Impression => self.impressions += 1,
            EventType::Click => self.clicks += 1,
            EventType::Conversion => self.conversions += 1,
        }
    }

    fn merge(&mut self, other: &BucketCounts) {
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.conversions += other.conversions;
    }

    fn total(&self) -> u64 {
        self.impressions + self.clicks + self.conversions
    }
}

#[derive(Default)]
struct AggregatorState {
    seen_event_ids: HashSet<String>,
    // cohort → hour index → counts
    cohorts: HashMap<String, BTreeMap<i64, BucketCounts>>,
    attribution: AttributionLedger,
    total_events: u64,
}

pub struct MetricsAggregator {
    config: PrivacyConfig,
    rng: Mutex<StdRng>,
    state: RwLock<AggregatorState>,
}

impl MetricsAggregator {
    pub fn new(config: PrivacyConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Build with a caller-supplied noise source
    pub fn with_rng(config: PrivacyConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
            state: RwLock::new(AggregatorState::default()),
        }
    }

    /// Append one event to the log
    ///
    /// Rejects blank identifying fields and duplicate event ids; a
    /// rejected event leaves the log untouched.
    pub async fn record_event(&self, event: &MetricsEvent) -> Result<()> {
        let event_id = event.event_id.trim();
        if event_id.is_empty() {
            return Err(CalypsoError::Validation("event id must not be empty".into()));
        }
        if event.cohort_id.trim().is_empty() {
            return Err(CalypsoError::Validation(
                "event cohort id must not be empty".into(),
            ));
        }
        if event.domain.trim().is_empty() {
            return Err(CalypsoError::Validation(
                "event domain must not be empty".into(),
            ));
        }

        let mut state = self.state.write().await;
        if !state.seen_event_ids.insert(event_id.to_string()) {
            return Err(CalypsoError::Validation(format!(
                "duplicate event id '{event_id}'"
            )));
        }
        state
            .cohorts
            .entry(event.cohort_id.clone())
            .or_default()
            .entry(hour_index(event.at))
            .or_default()
            .add(event.event_type);
        state.total_events += 1;

        let mut rng = self.rng.lock().await;
        state.attribution.observe(event, &mut rng, &self.config);
        debug!(
            event_id,
            cohort_id = %event.cohort_id,
            event_type = %event.event_type,
            "Event recorded"
        );
        Ok(())
    }

    /// Per-cohort released metrics over `[start, end)`
    ///
    /// The aggregation level follows the breadth of the query; every
    /// requested cohort appears in the result, suppressed or not.
    pub async fn aggregate(
        &self,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregatedMetrics>> {
        validate_query(cohort_ids, start, end)?;
        let level = AggregationLevel::for_cohort_count(cohort_ids.len());

        let state = self.state.read().await;
        let mut rng = self.rng.lock().await;
        let mut out = Vec::with_capacity(cohort_ids.len());
        for cohort_id in cohort_ids {
            let mut counts = BucketCounts::default();
            if let Some(buckets) = state.cohorts.get(cohort_id) {
                for (_, bucket) in buckets.range(hour_index(start)..hour_index_ceil(end)) {
                    counts.merge(bucket);
                }
            }
            out.push(self.release(cohort_id, counts, level, &mut rng));
        }
        Ok(out)
    }

    /// Released metrics bucketed by time window
    ///
    /// Each (cohort, window) bucket passes the privacy gate on its own,
    /// so a cohort can be released at day granularity yet suppressed for
    /// a quiet hour. Windows with no events are omitted.
    pub async fn aggregate_with_granularity(
        &self,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<HashMap<String, Vec<TimeBucket>>> {
        validate_query(cohort_ids, start, end)?;
        let level = AggregationLevel::for_cohort_count(cohort_ids.len());

        let state = self.state.read().await;
        let mut rng = self.rng.lock().await;
        let mut out: HashMap<String, Vec<TimeBucket>> = HashMap::new();
        for cohort_id in cohort_ids {
            let mut windows: BTreeMap<i64, BucketCounts> = BTreeMap::new();
            if let Some(buckets) = state.cohorts.get(cohort_id) {
                for (hour, bucket) in buckets.range(hour_index(start)..hour_index_ceil(end)) {
                    windows
                        .entry(window_index(*hour, granularity))
                        .or_default()
                        .merge(bucket);
                }
            }
            let mut series = Vec::with_capacity(windows.len());
            for (window, counts) in windows {
                series.push(TimeBucket {
                    window_start: window_start(window, granularity)?,
                    metrics: self.release(cohort_id, counts, level, &mut rng),
                });
            }
            out.insert(cohort_id.clone(), series);
        }
        Ok(out)
    }

    /// Attribution reports for the given cohorts with conversions in
    /// `[start, end)`
    pub async fn attribution_reports(
        &self,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AttributionReport>> {
        validate_query(cohort_ids, start, end)?;
        let state = self.state.read().await;
        Ok(state.attribution.reports_in_range(cohort_ids, start, end))
    }

    /// Total events accepted since startup
    pub async fn event_count(&self) -> u64 {
        self.state.read().await.total_events
    }

    /// Raw event count for one cohort over `[start, end)`
    ///
    /// Host-side diagnostic; not subject to the privacy gate and must
    /// never be exposed to external callers.
    pub async fn events_in_range(
        &self,
        cohort_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> u64 {
        let state = self.state.read().await;
        state
            .cohorts
            .get(cohort_id)
            .map(|buckets| {
                buckets
                    .range(hour_index(start)..hour_index_ceil(end))
                    .map(|(_, b)| b.total())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Push counts through the privacy gate
    fn release(
        &self,
        cohort_id: &str,
        counts: BucketCounts,
        level: AggregationLevel,
        rng: &mut StdRng,
    ) -> AggregatedMetrics {
        if counts.total() < self.config.min_samples(level) {
            return AggregatedMetrics {
                cohort_id: cohort_id.to_string(),
                impressions: 0,
                clicks: 0,
                conversions: 0,
                click_through_rate: 0.0,
                conversion_rate: 0.0,
                aggregation_level: level,
                data_points: 0,
                privacy_threshold_met: false,
            };
        }

        let epsilon = self.config.epsilon(level);
        let impressions = noise::noisy_count(rng, counts.impressions, epsilon);
        let clicks = noise::noisy_count(rng, counts.clicks, epsilon);
        let conversions = noise::noisy_count(rng, counts.conversions, epsilon);
        AggregatedMetrics {
            cohort_id: cohort_id.to_string(),
            impressions,
            clicks,
            conversions,
            click_through_rate: percentage(clicks, impressions, self.config.low_volume_cutoff),
            conversion_rate: percentage(conversions, clicks, self.config.low_volume_cutoff),
            aggregation_level: level,
            data_points: impressions + clicks + conversions,
            privacy_threshold_met: true,
        }
    }
}

/// `numerator / denominator` as a percentage, zeroed when the
/// denominator is below the low-volume cutoff
fn percentage(numerator: u64, denominator: u64, low_volume_cutoff: u64) -> f64 {
    if denominator < low_volume_cutoff.max(1) {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

fn validate_query(cohort_ids: &[String], start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if cohort_ids.is_empty() {
        return Err(CalypsoError::Validation(
            "query requires at least one cohort id".into(),
        ));
    }
    if cohort_ids.len() > MAX_COHORTS_PER_QUERY {
        return Err(CalypsoError::Validation(format!(
            "query covers {} cohorts, limit is {MAX_COHORTS_PER_QUERY}",
            cohort_ids.len()
        )));
    }
    if cohort_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(CalypsoError::Validation(
            "cohort ids must not be empty".into(),
        ));
    }
    if start >= end {
        return Err(CalypsoError::Validation(
            "time range start must precede end".into(),
        ));
    }
    if end - start > Duration::days(MAX_RANGE_DAYS) {
        return Err(CalypsoError::Validation(format!(
            "time range exceeds {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(())
}

fn hour_index(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(3600)
}

/// First hour index past `at`, exact hour boundaries excluded
fn hour_index_ceil(at: DateTime<Utc>) -> i64 {
    let ts = at.timestamp();
    ts.div_euclid(3600) + i64::from(ts.rem_euclid(3600) != 0)
}

fn window_index(hour: i64, granularity: Granularity) -> i64 {
    match granularity {
        Granularity::Hourly => hour,
        Granularity::Daily => hour.div_euclid(24),
        // Shift so weeks start on Monday (the epoch fell on a Thursday)
        Granularity::Weekly => (hour.div_euclid(24) + 3).div_euclid(7),
    }
}

fn window_start(index: i64, granularity: Granularity) -> Result<DateTime<Utc>> {
    let secs = match granularity {
        Granularity::Hourly => index * 3_600,
        Granularity::Daily => index * 86_400,
        Granularity::Weekly => (index * 7 - 3) * 86_400,
    };
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| CalypsoError::Internal(format!("window start {secs} out of range")))
}
