//! Visit scoring primitives
//!
//! Pure functions combining visit frequency with exponential recency
//! decay. Kept free of engine state so the ranking math can be tested
//! and benchmarked in isolation.

use crate::config::EngineConfig;
use crate::types::DomainVisit;
use chrono::{DateTime, Utc};

/// Log-scaled visit frequency in [0, 1]
///
/// `ln(1 + count) / ln(1 + cap)`, with the count saturating at the cap
/// so a single hammered domain cannot dominate the ranking.
pub fn frequency_score(visit_count: u32, visit_count_cap: u32) -> f64 {
    let cap = visit_count_cap.max(1);
    let count = visit_count.min(cap);
    ((1 + count) as f64).ln() / ((1 + cap) as f64).ln()
}

/// Exponential recency decay in (0, 1]
///
/// Halves every `half_life_days`; a visit from right now scores 1.0.
/// Future-dated visits (clock skew between recorders) clamp to 1.0
/// rather than scoring above it.
pub fn recency_score(last_visit: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - last_visit).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    (-age_days / half_life_days.max(f64::EPSILON) * std::f64::consts::LN_2).exp()
}

/// Combined score for one domain's visit history
pub fn visit_score(visit: &DomainVisit, now: DateTime<Utc>, config: &EngineConfig) -> f64 {
    frequency_score(visit.visit_count, config.visit_count_cap)
        * recency_score(visit.last_visit, now, config.recency_half_life_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn visit(domain: &str, count: u32, last: DateTime<Utc>) -> DomainVisit {
        DomainVisit {
            domain: domain.to_string(),
            last_visit: last,
            visit_count: count,
        }
    }

    #[test]
    fn test_frequency_is_monotonic_and_saturates() {
        let cap = 1_000;
        assert!(frequency_score(1, cap) < frequency_score(10, cap));
        assert!(frequency_score(10, cap) < frequency_score(100, cap));
        assert_eq!(frequency_score(1_000, cap), 1.0);
        assert_eq!(frequency_score(5_000, cap), 1.0);
    }

    #[test]
    fn test_recency_halves_at_half_life() {
        let now = Utc::now();
        let half = recency_score(now - Duration::days(14), now, 14.0);
        assert!((half - 0.5).abs() < 1e-9);

        let fresh = recency_score(now, now, 14.0);
        assert_eq!(fresh, 1.0);

        // Future-dated visits clamp instead of amplifying
        let future = recency_score(now + Duration::hours(3), now, 14.0);
        assert_eq!(future, 1.0);
    }

    #[test]
    fn test_heavy_recent_domain_outranks_light_stale_one() {
        let now = Utc::now();
        let config = EngineConfig::default();

        let heavy_recent = visit("streaming.example", 20, now);
        let light_stale = visit("music.example", 3, now - Duration::days(30));

        let a = visit_score(&heavy_recent, now, &config);
        let b = visit_score(&light_stale, now, &config);
        assert!(a > b, "expected {a} > {b}");

        // Even split across two topics still beats the stale domain whole
        assert!(a / 2.0 > b);
    }
}
