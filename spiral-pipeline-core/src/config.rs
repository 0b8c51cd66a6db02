use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::DEFAULT_MODEL;

/// Non-secret settings for every pipeline run. Secrets never live here; the
/// CLI reads them from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_root: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub model: String,
    pub enrichment: EnrichmentSettings,
    pub articles: RunSettings,
    pub stacks: RunSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            templates_dir: None,
            model: DEFAULT_MODEL.to_string(),
            enrichment: EnrichmentSettings::default(),
            articles: RunSettings::default(),
            stacks: RunSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub group_size: usize,
    pub group_delay_ms: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            group_size: 3,
            group_delay_ms: 1000,
        }
    }
}

impl EnrichmentSettings {
    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }
}

/// How many queue items one invocation handles, and the pause between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub per_run: usize,
    pub pause_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            per_run: 2,
            pause_ms: 2000,
        }
    }
}

impl RunSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl PipelineConfig {
    pub fn paths(&self) -> DataPaths {
        DataPaths::rooted_at(&self.data_root)
    }

    pub fn trace_loaded(&self) {
        info!(
            data_root = %self.data_root.display(),
            model = %self.model,
            templates_dir = ?self.templates_dir,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

/// Every file the pipeline reads or writes, derived from one data root.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub catalog: PathBuf,
    pub stacks: PathBuf,
    pub content_queue: PathBuf,
    pub stack_queue: PathBuf,
    pub content_index: PathBuf,
    pub comparisons: PathBuf,
    pub articles_dir: PathBuf,
    pub newsletter_dir: PathBuf,
}

impl DataPaths {
    pub fn rooted_at(root: &Path) -> Self {
        let data = root.join("src").join("data");
        Self {
            catalog: data.join("tools.json"),
            stacks: data.join("stacks.json"),
            content_queue: data.join("content-queue.json"),
            stack_queue: data.join("stack-queue.json"),
            content_index: data.join("content-index.json"),
            comparisons: data.join("comparisons.json"),
            articles_dir: root.join("content").join("comparisons"),
            newsletter_dir: root.join("newsletter-output"),
        }
    }
}
