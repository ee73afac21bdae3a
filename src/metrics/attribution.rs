//! Impression-to-conversion attribution
//!
//! Pairs each conversion with the latest prior impression for the same
//! cohort inside the lookback window, and meters report emission with a
//! per-(cohort, week) privacy budget. Exhausted budgets suppress reports
//! silently; the pairing itself still consumes the impression.

use crate::config::PrivacyConfig;
use crate::metrics::noise;
use crate::types::{AttributionReport, EventType, MetricsEvent};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use std::collections::HashMap;
use tracing::debug;

/// Attribution state owned by the aggregator
#[derive(Debug, Default)]
pub struct AttributionLedger {
    /// Unconsumed impression times per cohort, ascending
    pending: HashMap<String, Vec<DateTime<Utc>>>,

    /// Remaining budget per (cohort, ISO week of the impression day)
    budgets: HashMap<(String, String), f64>,

    /// Issued reports tagged with their conversion time
    reports: Vec<(DateTime<Utc>, AttributionReport)>,
}

impl AttributionLedger {
    /// Feed one accepted event through the ledger
    ///
    /// Impressions are queued; conversions attempt a pairing and may
    /// yield a report. Clicks are not attributed.
    pub fn observe(
        &mut self,
        event: &MetricsEvent,
        rng: &mut StdRng,
        config: &PrivacyConfig,
    ) -> Option<AttributionReport> {
        match event.event_type {
            EventType::Impression => {
                let times = self.pending.entry(event.cohort_id.clone()).or_default();
                let pos = times.partition_point(|t| *t <= event.at);
                times.insert(pos, event.at);
                None
            }
            EventType::Click => None,
            EventType::Conversion => self.attribute(event, rng, config),
        }
    }

    fn attribute(
        &mut self,
        event: &MetricsEvent,
        rng: &mut StdRng,
        config: &PrivacyConfig,
    ) -> Option<AttributionReport> {
        let times = self.pending.get_mut(&event.cohort_id)?;
        let idx = times.partition_point(|t| *t <= event.at).checked_sub(1)?;
        let source_at = times[idx];
        if source_at < event.at - Duration::days(config.attribution_window_days) {
            return None;
        }
        times.remove(idx);

        let source_day = source_at.date_naive();
        let key = (event.cohort_id.clone(), iso_week_key(source_day));
        let budget = self
            .budgets
            .entry(key)
            .or_insert(config.attribution_budget);
        if *budget + 1e-9 < config.attribution_report_cost {
            debug!(
                cohort_id = %event.cohort_id,
                "Attribution budget exhausted, report suppressed"
            );
            return None;
        }
        *budget -= config.attribution_report_cost;
        let remaining = *budget;

        let raw_value = event
            .metadata
            .get("value")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        let report = AttributionReport {
            cohort_id: event.cohort_id.clone(),
            source_day: source_day.to_string(),
            trigger_day: event.at.date_naive().to_string(),
            conversion_value: noise::noisy_value(rng, raw_value, config.epsilon_high),
            privacy_budget_remaining: remaining,
        };
        self.reports.push((event.at, report.clone()));
        Some(report)
    }

    /// Issued reports for the given cohorts with conversion times in
    /// `[start, end)`
    pub fn reports_in_range(
        &self,
        cohort_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<AttributionReport> {
        self.reports
            .iter()
            .filter(|(at, report)| {
                *at >= start && *at < end && cohort_ids.contains(&report.cohort_id)
            })
            .map(|(_, report)| report.clone())
            .collect()
    }

    /// Budget left for reports sourced from `source_day`
    pub fn remaining_budget(
        &self,
        cohort_id: &str,
        source_day: NaiveDate,
        config: &PrivacyConfig,
    ) -> f64 {
        self.budgets
            .get(&(cohort_id.to_string(), iso_week_key(source_day)))
            .copied()
            .unwrap_or(config.attribution_budget)
    }
}

fn iso_week_key(day: NaiveDate) -> String {
    let week = day.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
