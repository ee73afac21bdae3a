//! Weekly-rotating anonymized cohort identifiers
//!
//! External callers never see raw topic ids or names. Each topic maps to
//! an opaque 32-character token derived from a keyed HMAC over the topic
//! and the ISO week, so tokens are stable within a week, rotate across
//! weeks, and cannot be correlated across deployments with different
//! secrets.

use crate::error::{CalypsoError, Result};
use crate::types::TopicId;
use chrono::{DateTime, Datelike, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct CohortAnonymizer {
    secret: Vec<u8>,
}

impl CohortAnonymizer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Opaque sharing token for `topic` during the ISO week containing `at`
    ///
    /// The token alphabet is 'a'..'p' only, so no decimal topic id or
    /// Title-Case topic name can ever appear inside it.
    pub fn anonymize(&self, topic_id: TopicId, topic_name: &str, at: DateTime<Utc>) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CalypsoError::Internal(format!("invalid anonymization key: {e}")))?;

        let week = at.iso_week();
        let data = format!("{}|{}|{}-{:02}", topic_id.0, topic_name, week.year(), week.week());
        mac.update(data.as_bytes());

        let digest = mac.finalize().into_bytes();
        let mut token = String::with_capacity(32);
        for byte in &digest[..16] {
            token.push((b'a' + (byte >> 4)) as char);
            token.push((b'a' + (byte & 0x0f)) as char);
        }
        Ok(token)
    }
}
