//! Interest topic taxonomy
//!
//! An immutable forest of coarse interest topics plus a case-insensitive
//! domain → topic mapping, loaded once at startup and shared read-only
//! for the life of the process. Malformed source data (zero/duplicate
//! ids, unknown parents, cyclic parent links, level mismatches) fails the
//! load; lookups and traversals over unknown ids return empty results
//! rather than erroring.

pub mod data;

use crate::error::{CalypsoError, Result};
use crate::types::{Topic, TopicId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::info;

/// Serializable taxonomy source document
///
/// The JSON shape hosts supply when replacing the built-in seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomySource {
    /// All topics in the forest
    pub topics: Vec<Topic>,

    /// Domain (lower-cased on load) to topic ids
    pub domains: HashMap<String, Vec<u32>>,
}

/// Immutable topic forest with domain mapping
#[derive(Debug)]
pub struct Taxonomy {
    topics: HashMap<TopicId, Topic>,
    by_name: HashMap<String, TopicId>,
    children: HashMap<TopicId, Vec<TopicId>>,
    roots: Vec<TopicId>,
    domains: HashMap<String, Vec<TopicId>>,
}

impl Taxonomy {
    /// Build and validate a taxonomy from raw entries
    pub fn from_entries(
        topics: Vec<Topic>,
        domains: impl IntoIterator<Item = (String, Vec<TopicId>)>,
    ) -> Result<Self> {
        let mut by_id: HashMap<TopicId, Topic> = HashMap::with_capacity(topics.len());
        let mut by_name: HashMap<String, TopicId> = HashMap::with_capacity(topics.len());

        for topic in topics {
            if topic.id.0 == 0 {
                return Err(CalypsoError::Taxonomy(format!(
                    "topic '{}' has reserved id 0",
                    topic.name
                )));
            }
            let name_key = topic.name.to_lowercase();
            if by_name.contains_key(&name_key) {
                return Err(CalypsoError::Taxonomy(format!(
                    "duplicate topic name '{}'",
                    topic.name
                )));
            }
            if by_id.contains_key(&topic.id) {
                return Err(CalypsoError::Taxonomy(format!(
                    "duplicate topic id {}",
                    topic.id
                )));
            }
            by_name.insert(name_key, topic.id);
            by_id.insert(topic.id, topic);
        }

        // Parent links must resolve, and parent chains must terminate.
        for topic in by_id.values() {
            if let Some(parent_id) = topic.parent_id {
                if !by_id.contains_key(&parent_id) {
                    return Err(CalypsoError::Taxonomy(format!(
                        "topic {} references unknown parent {}",
                        topic.id, parent_id
                    )));
                }
            }

            let mut seen = HashSet::new();
            let mut cursor = topic.parent_id;
            while let Some(id) = cursor {
                if id == topic.id || !seen.insert(id) {
                    return Err(CalypsoError::Taxonomy(format!(
                        "cyclic parent links at topic {}",
                        topic.id
                    )));
                }
                cursor = by_id.get(&id).and_then(|t| t.parent_id);
            }
        }

        // Levels: roots sit at 1, children one below their parent.
        for topic in by_id.values() {
            match topic.parent_id {
                None if topic.level != 1 => {
                    return Err(CalypsoError::Taxonomy(format!(
                        "root topic {} has level {}, expected 1",
                        topic.id, topic.level
                    )));
                }
                Some(parent_id) => {
                    let parent_level = by_id[&parent_id].level;
                    if topic.level != parent_level + 1 {
                        return Err(CalypsoError::Taxonomy(format!(
                            "topic {} has level {}, expected {} (parent {} is level {})",
                            topic.id,
                            topic.level,
                            parent_level + 1,
                            parent_id,
                            parent_level
                        )));
                    }
                }
                None => {}
            }
        }

        let mut children: HashMap<TopicId, Vec<TopicId>> = HashMap::new();
        let mut roots: Vec<TopicId> = Vec::new();
        for topic in by_id.values() {
            match topic.parent_id {
                Some(parent_id) => children.entry(parent_id).or_default().push(topic.id),
                None => roots.push(topic.id),
            }
        }
        for ids in children.values_mut() {
            ids.sort();
        }
        roots.sort();

        let mut domain_map: HashMap<String, Vec<TopicId>> = HashMap::new();
        for (domain, topic_ids) in domains {
            for topic_id in &topic_ids {
                if !by_id.contains_key(topic_id) {
                    return Err(CalypsoError::Taxonomy(format!(
                        "domain '{domain}' references unknown topic {topic_id}"
                    )));
                }
            }
            domain_map.insert(domain.to_lowercase(), topic_ids);
        }

        info!(
            topics = by_id.len(),
            domains = domain_map.len(),
            roots = roots.len(),
            "Taxonomy loaded"
        );

        Ok(Self {
            topics: by_id,
            by_name,
            children,
            roots,
            domains: domain_map,
        })
    }

    /// Parse and validate a [`TaxonomySource`] JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let source: TaxonomySource = serde_json::from_str(json)?;
        let domains = source
            .domains
            .into_iter()
            .map(|(domain, ids)| (domain, ids.into_iter().map(TopicId).collect()));
        Self::from_entries(source.topics, domains)
    }

    /// The built-in seed taxonomy
    pub fn builtin() -> Result<Self> {
        let domains = data::seed_domains().into_iter().map(|(domain, ids)| {
            (
                domain.to_string(),
                ids.into_iter().map(TopicId).collect::<Vec<_>>(),
            )
        });
        Self::from_entries(data::seed_topics(), domains)
    }

    /// Look up a topic by id
    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.topics.get(&id)
    }

    /// Look up a topic by name, case-insensitively
    pub fn topic_by_name(&self, name: &str) -> Option<&Topic> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|id| self.topics.get(id))
    }

    /// Direct children of `id`, ordered by id; empty for leaves and unknowns
    pub fn children(&self, id: TopicId) -> Vec<&Topic> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.topics.get(c)).collect())
            .unwrap_or_default()
    }

    /// Parent of `id`, if it has one
    pub fn parent(&self, id: TopicId) -> Option<&Topic> {
        self.topics
            .get(&id)
            .and_then(|t| t.parent_id)
            .and_then(|p| self.topics.get(&p))
    }

    /// Ancestors of `id`, nearest first; empty for roots and unknowns
    pub fn ancestors(&self, id: TopicId) -> Vec<&Topic> {
        let mut out = Vec::new();
        let mut cursor = self.topics.get(&id).and_then(|t| t.parent_id);
        while let Some(parent_id) = cursor {
            match self.topics.get(&parent_id) {
                Some(parent) => {
                    out.push(parent);
                    cursor = parent.parent_id;
                }
                None => break,
            }
        }
        out
    }

    /// All descendants of `id` in breadth-first order
    pub fn descendants(&self, id: TopicId) -> Vec<&Topic> {
        let mut out = Vec::new();
        let mut queue: VecDeque<TopicId> = self
            .children
            .get(&id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        while let Some(child_id) = queue.pop_front() {
            if let Some(child) = self.topics.get(&child_id) {
                out.push(child);
            }
            if let Some(grandchildren) = self.children.get(&child_id) {
                queue.extend(grandchildren.iter().copied());
            }
        }
        out
    }

    /// Root topics, ordered by id
    pub fn roots(&self) -> Vec<&Topic> {
        self.roots
            .iter()
            .filter_map(|id| self.topics.get(id))
            .collect()
    }

    /// Case-insensitive substring search over names and descriptions
    ///
    /// An empty query matches nothing. Results are ordered by id.
    pub fn search(&self, query: &str) -> Vec<&Topic> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&Topic> = self
            .topics
            .values()
            .filter(|t| {
                t.name.to_lowercase().contains(&needle)
                    || t.description.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by_key(|t| t.id);
        hits
    }

    /// Whether `id` is sensitive, directly or through any ancestor
    ///
    /// Unknown ids are not sensitive (they are not assignable either).
    pub fn is_sensitive(&self, id: TopicId) -> bool {
        let Some(topic) = self.topics.get(&id) else {
            return false;
        };
        if topic.is_sensitive {
            return true;
        }
        self.ancestors(id).iter().any(|t| t.is_sensitive)
    }

    /// All topics eligible for assignment (not sensitive, not under a
    /// sensitive ancestor), ordered by id
    pub fn assignable_topics(&self) -> Vec<&Topic> {
        let mut out: Vec<&Topic> = self
            .topics
            .values()
            .filter(|t| !self.is_sensitive(t.id))
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Topics mapped to `domain`, case-insensitively
    ///
    /// Falls back from `music.example.com` to `example.com` when only the
    /// registrable suffix is mapped. Sensitivity is NOT filtered here; the
    /// assignment engine needs to distinguish unmapped domains from
    /// sensitive-only ones.
    pub fn topics_for_domain(&self, domain: &str) -> Vec<&Topic> {
        let normalized = domain.trim().to_lowercase();
        let mut candidate = normalized.as_str();
        loop {
            if let Some(ids) = self.domains.get(candidate) {
                return ids.iter().filter_map(|id| self.topics.get(id)).collect();
            }
            // Strip one leading label; stop before a bare TLD.
            match candidate.split_once('.') {
                Some((_, rest)) if rest.contains('.') => candidate = rest,
                _ => return Vec::new(),
            }
        }
    }

    /// Number of topics
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the taxonomy holds no topics
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Number of mapped domains
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }
}
