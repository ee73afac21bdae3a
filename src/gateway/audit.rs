//! Append-only audit log of external data accesses

use crate::types::AuditLogEntry;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// In-memory audit trail with bounded retention
///
/// Oldest entries fall off once the cap is reached; the newest entry is
/// always kept.
pub struct AuditLog {
    retention: usize,
    entries: RwLock<VecDeque<AuditLogEntry>>,
}

impl AuditLog {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn append(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.retention {
            entries.pop_front();
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// The `n` newest entries, newest first
    pub async fn recent(&self, n: usize) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(n).cloned().collect()
    }

    /// All entries for `domain`, newest first
    pub async fn entries_for_domain(&self, domain: &str) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| e.domain.eq_ignore_ascii_case(domain))
            .cloned()
            .collect()
    }
}
