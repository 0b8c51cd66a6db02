//! Model-assisted scoring, batched in fixed-size concurrent groups.
//!
//! Each group of entries is sent concurrently and awaited as a whole; a fixed
//! delay separates groups. A failing entry is logged and left out of the result,
//! it never aborts the batch. Cancellation is checked between groups and while a
//! group is in flight; entries finished before cancellation are still returned.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::catalog::{parse_alternatives, CatalogEntry, Scores};
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::LlmError;
use crate::llm::generate_json;
use crate::template::{Substitutions, Template};

const MAX_PEERS: usize = 10;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub group_size: usize,
    pub group_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            group_size: 3,
            group_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct EnrichmentFailure {
    pub entry_id: u32,
    pub name: String,
    pub error: LlmError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub enriched: Vec<CatalogEntry>,
    pub failed: Vec<EnrichmentFailure>,
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
struct ModelScores {
    #[serde(alias = "techiespiral_score")]
    scout_score: f64,
    value_score: f64,
    ease_score: f64,
    features_score: f64,
    #[serde(default)]
    alternatives: Value,
}

fn to_u8(v: f64, max: f64) -> u8 {
    v.round().clamp(0.0, max) as u8
}

/// Low temperature: repeated runs should score an entry the same way.
pub fn scoring_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(1000)
        .with_temperature(0.5)
}

/// Up to ten same-category peers as `- ID 4: Render ($7/month)`.
pub fn peer_list(entry: &CatalogEntry, catalog: &[CatalogEntry]) -> String {
    let lines: Vec<String> = entry
        .peers(catalog)
        .take(MAX_PEERS)
        .map(|p| format!("- ID {}: {} ({})", p.id, p.name, p.price_range))
        .collect();
    if lines.is_empty() {
        "No other tools in this category yet.".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn prompt_substitutions(entry: &CatalogEntry, catalog: &[CatalogEntry]) -> Substitutions {
    Substitutions::new()
        .set("tool_name", entry.name.as_str())
        .set("category", entry.category.as_str())
        .set("description", entry.description.as_str())
        .set("long_description", entry.long_description.as_str())
        .set("price_range", entry.price_range.as_str())
        .set("features", entry.features.as_str())
        .set("best_for", entry.best_for.as_str())
        .set("category_tools_list", peer_list(entry, catalog))
}

/// Scores one entry through the model. The entry is returned with scores,
/// alternatives and a fresh enrichment timestamp.
pub async fn enrich_one<G>(
    generator: &G,
    template: &Template,
    entry: &CatalogEntry,
    catalog: &[CatalogEntry],
    options: &GenerationOptions,
) -> Result<CatalogEntry, LlmError>
where
    G: TextGenerator + ?Sized,
{
    let prompt = template.render(&prompt_substitutions(entry, catalog));
    let reply: ModelScores = generate_json(generator, &prompt, options).await?;

    let scores = Scores {
        overall: to_u8(reply.scout_score, 100.0),
        value: to_u8(reply.value_score, 5.0),
        ease: to_u8(reply.ease_score, 5.0),
        features: to_u8(reply.features_score, 5.0),
    };
    let alternatives: Vec<u32> = parse_alternatives(&reply.alternatives)
        .into_iter()
        .filter(|id| *id != entry.id)
        .collect();

    let mut enriched = entry.clone();
    enriched.apply_scores(scores, alternatives, Utc::now());
    Ok(enriched)
}

/// Runs [`enrich_one`] over `pending` in groups of `batch.group_size`.
pub async fn enrich_batch<G>(
    generator: &G,
    template: &Template,
    pending: &[CatalogEntry],
    catalog: &[CatalogEntry],
    options: &GenerationOptions,
    batch: &BatchOptions,
    cancel: &CancelToken,
) -> BatchOutcome
where
    G: TextGenerator + ?Sized,
{
    let mut outcome = BatchOutcome::default();
    let groups: Vec<&[CatalogEntry]> = pending.chunks(batch.group_size.max(1)).collect();
    let total_groups = groups.len();

    for (index, group) in groups.into_iter().enumerate() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        info!(
            group = index + 1,
            total_groups,
            size = group.len(),
            "[ENRICH] Processing group"
        );

        let calls = group
            .iter()
            .map(|entry| enrich_one(generator, template, entry, catalog, options));
        let results = tokio::select! {
            results = join_all(calls) => results,
            _ = cancel.cancelled() => {
                warn!(group = index + 1, "[ENRICH] Cancelled while a group was in flight");
                outcome.cancelled = true;
                break;
            }
        };

        for (entry, result) in group.iter().zip(results) {
            match result {
                Ok(enriched) => {
                    info!(
                        entry_id = enriched.id,
                        name = %enriched.name,
                        overall = enriched.overall_score(),
                        "[ENRICH] Entry scored"
                    );
                    outcome.enriched.push(enriched);
                }
                Err(error) => {
                    warn!(entry_id = entry.id, name = %entry.name, error = %error, "[ENRICH] Entry failed, skipping");
                    outcome.failed.push(EnrichmentFailure {
                        entry_id: entry.id,
                        name: entry.name.clone(),
                        error,
                    });
                }
            }
        }

        if index + 1 < total_groups && !batch.group_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(batch.group_delay) => {}
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
            }
        }
    }

    info!(
        enriched = outcome.enriched.len(),
        failed = outcome.failed.len(),
        cancelled = outcome.cancelled,
        "[ENRICH] Batch finished"
    );
    outcome
}
