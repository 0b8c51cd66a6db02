//! # queue: pending content ideas and their audit trail
//!
//! A queue file holds `{queue: [...], generated: [...], metadata: {...}}`.
//! Items are never removed: generating one flips its status in `queue` and
//! appends a copy to `generated`, so the file only grows. Two item types share
//! the same mechanics through [`QueueItem`]:
//!
//! - [`ComparisonIdea`]: a comparison article waiting to be written.
//! - [`StackIdea`]: a curated stack waiting to be assembled.
//!
//! Dequeue order is the array order. The `priority` on comparison ideas is
//! carried and displayed but never reorders the queue.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Generated,
}

/// Behaviour the queue needs from an item.
pub trait QueueItem: Clone + Serialize + DeserializeOwned {
    /// The human-facing identity used for de-duplication.
    fn key(&self) -> &str;
    fn status(&self) -> QueueStatus;
    fn set_generated(&mut self, date: NaiveDate);
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonIdea {
    pub title: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComparisonIdea {
    pub fn new(title: impl Into<String>, tool_names: Vec<String>) -> Self {
        Self {
            title: title.into(),
            keywords: String::new(),
            category: String::new(),
            tool_names,
            priority: 2,
            status: QueueStatus::Pending,
            generated_date: None,
            extra: Map::new(),
        }
    }
}

impl QueueItem for ComparisonIdea {
    fn key(&self) -> &str {
        &self.title
    }

    fn status(&self) -> QueueStatus {
        self.status
    }

    fn set_generated(&mut self, date: NaiveDate) {
        self.status = QueueStatus::Generated;
        self.generated_date = Some(format_date(date));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackIdea {
    pub stack_name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub estimated_cost: String,
    #[serde(default)]
    pub badge: String,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(
        default,
        rename = "generatedDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueItem for StackIdea {
    fn key(&self) -> &str {
        &self.stack_name
    }

    fn status(&self) -> QueueStatus {
        self.status
    }

    fn set_generated(&mut self, date: NaiveDate) {
        self.status = QueueStatus::Generated;
        self.generated_date = Some(format_date(date));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_generated: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned", serialize = "T: Serialize"))]
pub struct ContentQueue<T> {
    #[serde(default)]
    pub queue: Vec<T>,
    #[serde(default)]
    pub generated: Vec<T>,
    #[serde(default)]
    pub metadata: QueueMetadata,
}

impl<T> Default for ContentQueue<T> {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            generated: Vec::new(),
            metadata: QueueMetadata::default(),
        }
    }
}

impl<T: QueueItem> ContentQueue<T> {
    fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.last_updated =
            Some(now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    }

    fn contains_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.queue.iter().any(|item| item.key().to_lowercase() == key)
    }

    /// Appends ideas whose key is not already queued (case-insensitive, also
    /// within `ideas` itself). Returns how many were added.
    pub fn enqueue(&mut self, ideas: Vec<T>, now: DateTime<Utc>) -> usize {
        let mut added = 0;
        for idea in ideas {
            if self.contains_key(idea.key()) {
                debug!(key = %idea.key(), "Duplicate idea dropped");
                continue;
            }
            self.queue.push(idea);
            added += 1;
        }
        self.touch(now);
        info!(added, queued = self.queue.len(), "Queue updated");
        added
    }

    /// Up to `n` pending items in queue order.
    pub fn dequeue_pending(&self, n: usize) -> Vec<T> {
        self.queue
            .iter()
            .filter(|item| item.status() == QueueStatus::Pending)
            .take(n)
            .cloned()
            .collect()
    }

    /// Flips the first pending item with `key` to generated and records a copy
    /// in the audit list. Returns `false` when no such pending item exists.
    pub fn mark_generated(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        let Some(item) = self
            .queue
            .iter_mut()
            .find(|item| item.key() == key && item.status() == QueueStatus::Pending)
        else {
            return false;
        };
        item.set_generated(now.date_naive());
        let copy = item.clone();
        self.generated.push(copy);
        self.metadata.total_generated = Some(self.generated.len());
        self.touch(now);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.queue
            .iter()
            .filter(|item| item.status() == QueueStatus::Pending)
            .count()
    }
}
