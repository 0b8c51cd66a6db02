//! Comparison idea generation from recently added catalog entries.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::CatalogEntry;
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::LlmError;
use crate::llm::generate_json;
use crate::queue::{ComparisonIdea, QueueStatus};
use crate::template::{Substitutions, Template};

pub const RECENT_DAYS: i64 = 60;
pub const POPULAR_THRESHOLD: u8 = 80;
pub const MAX_POPULAR: usize = 20;

pub fn ideas_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(2048)
        .with_temperature(0.8)
}

/// Entries discovered (or created) within the last [`RECENT_DAYS`].
pub fn recent_entries(catalog: &[CatalogEntry], now: DateTime<Utc>) -> Vec<&CatalogEntry> {
    let cutoff = now - Duration::days(RECENT_DAYS);
    catalog
        .iter()
        .filter(|e| e.discovered_at.or(e.created_at).is_some_and(|t| t > cutoff))
        .collect()
}

/// Up to [`MAX_POPULAR`] entries scoring above [`POPULAR_THRESHOLD`].
pub fn popular_entries(catalog: &[CatalogEntry]) -> Vec<&CatalogEntry> {
    catalog
        .iter()
        .filter(|e| e.overall_score().is_some_and(|s| s > POPULAR_THRESHOLD))
        .take(MAX_POPULAR)
        .collect()
}

fn summary_line(e: &CatalogEntry) -> String {
    match e.overall_score() {
        Some(score) => format!("- {} ({}, {}) score {score}/100", e.name, e.category, e.price_range),
        None => format!("- {} ({}, {})", e.name, e.category, e.price_range),
    }
}

pub fn prompt_substitutions(recent: &[&CatalogEntry], popular: &[&CatalogEntry]) -> Substitutions {
    let list = |entries: &[&CatalogEntry]| {
        if entries.is_empty() {
            "None".to_string()
        } else {
            entries.iter().map(|e| summary_line(e)).collect::<Vec<_>>().join("\n")
        }
    };
    Substitutions::new()
        .set("recent_tools", list(recent))
        .set("popular_tools", list(popular))
}

/// Keeps the well-formed ideas in a model reply, all set to pending.
pub fn parse_ideas(reply: &Value) -> Result<Vec<ComparisonIdea>, LlmError> {
    let items = reply.as_array().ok_or_else(|| LlmError::UnexpectedShape {
        expected: "a JSON array of comparison ideas",
        raw: reply.to_string(),
    })?;
    let mut ideas = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<ComparisonIdea>(item.clone()) {
            Ok(mut idea) if !idea.title.trim().is_empty() && !idea.tool_names.is_empty() => {
                idea.status = QueueStatus::Pending;
                idea.generated_date = None;
                ideas.push(idea);
            }
            Ok(_) => warn!(index, "[IDEAS] Idea without title or tools dropped"),
            Err(error) => warn!(index, error = %error, "[IDEAS] Malformed idea dropped"),
        }
    }
    Ok(ideas)
}

/// Asks the model for comparison ideas around recent entries. Returns an empty
/// list without calling the model when nothing is recent.
pub async fn generate_ideas<G>(
    generator: &G,
    template: &Template,
    catalog: &[CatalogEntry],
    options: &GenerationOptions,
    now: DateTime<Utc>,
) -> Result<Vec<ComparisonIdea>, LlmError>
where
    G: TextGenerator + ?Sized,
{
    let recent = recent_entries(catalog, now);
    if recent.is_empty() {
        info!("[IDEAS] No recently added tools, nothing to propose");
        return Ok(Vec::new());
    }
    let popular = popular_entries(catalog);
    info!(recent = recent.len(), popular = popular.len(), "[IDEAS] Requesting comparison ideas");

    let prompt = template.render(&prompt_substitutions(&recent, &popular));
    let reply: Value = generate_json(generator, &prompt, options).await?;
    parse_ideas(&reply)
}
