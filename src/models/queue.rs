use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::case::{JobRecord, MediaKind};

/// Pipeline stage a queued case is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageLabel {
    Preprocessing,
    Analyzing,
    LlmExplaining,
    SendingResult,
}

/// Live projection of an in-flight case, as shown on the queue dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    pub media_type: MediaKind,
    pub submitted_at: DateTime<Utc>,
    pub progress: u8,
    /// Stage label; the dashboard contract names this field `status`.
    #[serde(rename = "status")]
    pub stage: StageLabel,
    pub worker_id: String,
}

impl QueueEntry {
    pub fn for_record(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            media_type: record.media_type,
            submitted_at: record.submitted_at,
            progress: 0,
            stage: StageLabel::Preprocessing,
            worker_id: record.worker_id.clone(),
        }
    }
}

/// Complete ordered state of the live queue at one instant.
///
/// Serializes as a bare JSON array of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    /// Position of this snapshot in the hub's broadcast sequence.
    #[serde(skip)]
    pub seq: u64,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}
