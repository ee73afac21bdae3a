//! Cohort assignment engine
//!
//! Tracks per-user domain visits, recomputes interest cohort assignments
//! from frequency and recency, and answers sharing queries under the
//! user's preferences. State is held in memory behind per-user locks and
//! written through to the key-value store encrypted at rest.

use crate::clock::Clock;
use crate::cohorts::scoring;
use crate::config::EngineConfig;
use crate::error::{CalypsoError, Result};
use crate::storage::{keys, EncryptionProvider, KeyValueStore};
use crate::taxonomy::Taxonomy;
use crate::types::{CohortAssignment, DomainVisit, SharingPreferences, Topic, TopicId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Everything the engine knows about one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCohortState {
    /// Visit history keyed by normalized domain
    pub visits: HashMap<String, DomainVisit>,

    /// Current assignments, at most `max_cohorts` entries
    pub assignments: Vec<CohortAssignment>,

    /// When periodic maintenance last ran for this user
    pub last_maintenance: Option<DateTime<Utc>>,
}

/// What a maintenance pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceOutcome {
    /// False when the pass was skipped because one ran recently
    pub ran: bool,
    /// Expired assignments dropped
    pub assignments_expired: usize,
    /// Visits dropped for exceeding the retention window
    pub visits_pruned: usize,
}

/// One scored topic candidate during recomputation
struct Candidate {
    topic_id: TopicId,
    topic_name: String,
    score: f64,
}

pub struct CohortEngine {
    taxonomy: Arc<Taxonomy>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    cipher: Arc<dyn EncryptionProvider>,
    storage_key: Vec<u8>,
    users: RwLock<HashMap<String, Arc<Mutex<UserCohortState>>>>,
}

impl CohortEngine {
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
        cipher: Arc<dyn EncryptionProvider>,
        storage_key: Vec<u8>,
    ) -> Self {
        Self {
            taxonomy,
            config,
            clock,
            store,
            cipher,
            storage_key,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Record one page visit for `user_id`
    ///
    /// Increments the domain's visit count (saturating) and moves its
    /// last-visit timestamp forward. Out-of-order arrivals never move it
    /// backward.
    pub async fn record_visit(
        &self,
        user_id: &str,
        domain: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let domain = normalize_domain(domain)?;
        let entry = self.user_entry(validate_user_id(user_id)?).await?;
        let mut state = entry.lock().await;

        let visit = state
            .visits
            .entry(domain.clone())
            .or_insert_with(|| DomainVisit {
                domain: domain.clone(),
                last_visit: at,
                visit_count: 0,
            });
        visit.visit_count = visit.visit_count.saturating_add(1);
        if at > visit.last_visit {
            visit.last_visit = at;
        }
        debug!(user_id, domain = %domain, count = visit.visit_count, "Visit recorded");

        self.persist(user_id, &state).await
    }

    /// Recompute `user_id`'s cohort assignments from current history
    ///
    /// Domains below the minimum visit count are ignored. Each remaining
    /// domain's score is split evenly across its assignable topics;
    /// sensitive topics never receive score. The top `max_cohorts` topics
    /// by accumulated score become the new assignment set, each carrying
    /// its share of the total as a confidence in (0, 1]. Topics already
    /// assigned keep their original assignment time; every selected topic
    /// gets a fresh expiry.
    pub async fn assign_cohorts(&self, user_id: &str) -> Result<Vec<CohortAssignment>> {
        let now = self.clock.now();
        let entry = self.user_entry(validate_user_id(user_id)?).await?;
        let mut state = entry.lock().await;

        prune_visits(&mut state, now, &self.config);
        self.recompute_assignments(&mut state, now);
        debug!(
            user_id,
            assignments = state.assignments.len(),
            "Cohorts recomputed"
        );

        self.persist(user_id, &state).await?;
        Ok(state.assignments.clone())
    }

    /// Current unexpired assignments, highest confidence first
    pub async fn assignments(&self, user_id: &str) -> Result<Vec<CohortAssignment>> {
        let now = self.clock.now();
        let entry = self.user_entry(validate_user_id(user_id)?).await?;
        let state = entry.lock().await;

        let mut live: Vec<CohortAssignment> = state
            .assignments
            .iter()
            .filter(|a| !a.is_expired(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(a.topic_id.cmp(&b.topic_id))
        });
        Ok(live)
    }

    /// The restricted view handed to external callers
    ///
    /// The most recently assigned unexpired cohorts, newest first, minus
    /// any the user has disabled, capped at the sharing limit. Sharing
    /// disabled means an empty answer, indistinguishable from having no
    /// cohorts at all.
    pub async fn cohorts_for_sharing(
        &self,
        user_id: &str,
        preferences: &SharingPreferences,
    ) -> Result<Vec<CohortAssignment>> {
        if !preferences.cohort_sharing_enabled {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let entry = self.user_entry(validate_user_id(user_id)?).await?;
        let state = entry.lock().await;

        let mut live: Vec<CohortAssignment> = state
            .assignments
            .iter()
            .filter(|a| !a.is_expired(now))
            .filter(|a| !preferences.disabled_topics.contains(&a.topic_id))
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.assigned_at
                .cmp(&a.assigned_at)
                .then(a.topic_id.cmp(&b.topic_id))
        });
        live.truncate(self.config.sharing_limit);
        Ok(live)
    }

    /// Run periodic cleanup for one user
    ///
    /// Drops expired assignments, prunes visits past retention, then
    /// re-scores from what remains. Skipped entirely when a pass ran
    /// within the maintenance interval.
    pub async fn run_maintenance(&self, user_id: &str) -> Result<MaintenanceOutcome> {
        let now = self.clock.now();
        let entry = self.user_entry(validate_user_id(user_id)?).await?;
        let mut state = entry.lock().await;

        if let Some(last) = state.last_maintenance {
            if now - last < Duration::days(self.config.maintenance_interval_days) {
                return Ok(MaintenanceOutcome {
                    ran: false,
                    assignments_expired: 0,
                    visits_pruned: 0,
                });
            }
        }

        let before = state.assignments.len();
        state.assignments.retain(|a| !a.is_expired(now));
        let assignments_expired = before - state.assignments.len();
        let visits_pruned = prune_visits(&mut state, now, &self.config);
        self.recompute_assignments(&mut state, now);
        state.last_maintenance = Some(now);

        if assignments_expired > 0 || visits_pruned > 0 {
            info!(
                user_id,
                assignments_expired, visits_pruned, "Maintenance pass completed"
            );
        }
        self.persist(user_id, &state).await?;
        Ok(MaintenanceOutcome {
            ran: true,
            assignments_expired,
            visits_pruned,
        })
    }

    /// Forget a user entirely, in memory and at rest
    pub async fn clear_user(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        self.users.write().await.remove(user_id);
        self.store.delete(&keys::user_state(user_id)).await?;
        self.store.delete(&keys::preferences(user_id)).await?;
        info!(user_id, "User cohort data cleared");
        Ok(())
    }

    /// Score current visits and replace the assignment set
    fn recompute_assignments(&self, state: &mut UserCohortState, now: DateTime<Utc>) {
        let mut topic_scores: HashMap<TopicId, f64> = HashMap::new();
        for visit in state.visits.values() {
            if visit.visit_count < self.config.min_visits {
                continue;
            }
            let assignable: Vec<&Topic> = self
                .taxonomy
                .topics_for_domain(&visit.domain)
                .into_iter()
                .filter(|t| !self.taxonomy.is_sensitive(t.id))
                .collect();
            if assignable.is_empty() {
                continue;
            }
            let share = scoring::visit_score(visit, now, &self.config) / assignable.len() as f64;
            for topic in assignable {
                *topic_scores.entry(topic.id).or_insert(0.0) += share;
            }
        }

        let total: f64 = topic_scores.values().sum();
        if total <= 0.0 {
            state.assignments.clear();
            return;
        }

        let mut candidates: Vec<Candidate> = topic_scores
            .into_iter()
            .filter_map(|(topic_id, score)| {
                self.taxonomy.topic(topic_id).map(|t| Candidate {
                    topic_id,
                    topic_name: t.name.clone(),
                    score,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.topic_id.cmp(&b.topic_id))
        });
        candidates.truncate(self.config.max_cohorts);

        // A still-live topic keeps its whole window: the 21-day span
        // anchors at first assignment. Expired topics re-enter fresh.
        let previous: HashMap<TopicId, (DateTime<Utc>, DateTime<Utc>)> = state
            .assignments
            .iter()
            .filter(|a| !a.is_expired(now))
            .map(|a| (a.topic_id, (a.assigned_at, a.expires_at)))
            .collect();
        let fresh_window = (now, now + Duration::days(self.config.assignment_ttl_days));

        state.assignments = candidates
            .into_iter()
            .map(|c| {
                let (assigned_at, expires_at) =
                    previous.get(&c.topic_id).copied().unwrap_or(fresh_window);
                CohortAssignment {
                    topic_id: c.topic_id,
                    topic_name: c.topic_name,
                    confidence: c.score / total,
                    assigned_at,
                    expires_at,
                }
            })
            .collect();
    }

    async fn user_entry(&self, user_id: &str) -> Result<Arc<Mutex<UserCohortState>>> {
        if let Some(existing) = self.users.read().await.get(user_id) {
            return Ok(existing.clone());
        }

        let loaded = self.load_state(user_id).await?;
        let mut map = self.users.write().await;
        // A concurrent loader may have won the race; keep its entry.
        let entry = map
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(entry.clone())
    }

    async fn load_state(&self, user_id: &str) -> Result<UserCohortState> {
        match self.store.get(&keys::user_state(user_id)).await? {
            Some(ciphertext) => {
                let plaintext = self.cipher.decrypt(&ciphertext, &self.storage_key).await?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
            None => Ok(UserCohortState::default()),
        }
    }

    async fn persist(&self, user_id: &str, state: &UserCohortState) -> Result<()> {
        let plaintext = serde_json::to_vec(state)?;
        let ciphertext = self.cipher.encrypt(&plaintext, &self.storage_key).await?;
        self.store.put(&keys::user_state(user_id), ciphertext).await
    }
}

/// Drop visits whose last activity fell out of the retention window
fn prune_visits(state: &mut UserCohortState, now: DateTime<Utc>, config: &EngineConfig) -> usize {
    let cutoff = now - Duration::days(config.visit_retention_days);
    let before = state.visits.len();
    state.visits.retain(|_, v| v.last_visit >= cutoff);
    before - state.visits.len()
}

fn validate_user_id(user_id: &str) -> Result<&str> {
    if user_id.trim().is_empty() {
        return Err(CalypsoError::Validation("user id must not be empty".into()));
    }
    Ok(user_id)
}

/// Lowercase and trim a domain, rejecting empty and malformed input
fn normalize_domain(domain: &str) -> Result<String> {
    let normalized = domain.trim().trim_end_matches('.').to_lowercase();
    if normalized.is_empty() {
        return Err(CalypsoError::Validation("domain must not be empty".into()));
    }
    if normalized.chars().any(char::is_whitespace) {
        return Err(CalypsoError::Validation(format!(
            "domain '{normalized}' contains whitespace"
        )));
    }
    Ok(normalized)
}
