//! Curated stack generation from the stack queue.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::catalog::{CatalogEntry, TechStack};
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::LlmError;
use crate::llm::parse_json_reply;
use crate::queue::{ContentQueue, StackIdea};
use crate::template::{Substitutions, Template};

pub const MIN_STACK_TOOLS: usize = 5;
pub const PUBLISHED: &str = "published";

pub fn stack_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(2048)
        .with_temperature(0.7)
}

/// Every catalog entry, the menu the model picks stack members from.
pub fn tools_data(catalog: &[CatalogEntry]) -> String {
    catalog
        .iter()
        .map(|e| {
            let score = e
                .overall_score()
                .map_or_else(|| "Not rated".to_string(), |s| s.to_string());
            let best_for = if e.best_for.trim().is_empty() {
                "General use"
            } else {
                e.best_for.as_str()
            };
            format!(
                "ID: {}\nName: {}\nCategory: {}\nPrice: {}\nDescription: {}\nTechieSpiral Score: {}/100\nBest For: {}",
                e.id, e.name, e.category, e.price_range, e.description, score, best_for
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn prompt_substitutions(idea: &StackIdea, catalog: &[CatalogEntry]) -> Substitutions {
    Substitutions::new()
        .set("stack_name", idea.stack_name.as_str())
        .set("tagline", idea.tagline.as_str())
        .set("target_audience", idea.target_audience.as_str())
        .set("focus", idea.focus.as_str())
        .set("estimated_cost", idea.estimated_cost.as_str())
        .set("badge", idea.badge.as_str())
        .set("tools_data", tools_data(catalog))
}

/// `max(id) + 1`, or 1 when there are no stacks yet.
pub fn next_stack_id(stacks: &[TechStack]) -> u32 {
    stacks.iter().map(|s| s.id).max().map_or(1, |m| m + 1)
}

#[derive(Debug)]
pub enum StackOutcome {
    Published { stack_name: String, id: u32, tools: usize },
    Skipped { stack_name: String, reason: String },
    Failed { stack_name: String, error: LlmError },
}

/// Turns a model reply into a stack, filling gaps from the queued idea.
pub fn stack_from_reply(raw: &str, idea: &StackIdea, id: u32) -> Result<TechStack, String> {
    let value: Value = parse_json_reply(raw).map_err(|e| e.to_string())?;
    let mut obj: Map<String, Value> = match value {
        Value::Object(obj) => obj,
        _ => return Err("reply is not a JSON object".to_string()),
    };
    let ids = obj.get("tool_ids").and_then(Value::as_array).map_or(0, Vec::len);
    if ids < MIN_STACK_TOOLS {
        return Err(format!("stack lists {ids} tools, need at least {MIN_STACK_TOOLS}"));
    }
    obj.insert("id".into(), Value::from(id));
    obj.insert("view_count".into(), Value::from(0));
    obj.insert("status".into(), Value::from(PUBLISHED));
    obj.entry("stack_name")
        .or_insert_with(|| Value::from(idea.stack_name.as_str()));
    for (key, fallback) in [
        ("tagline", &idea.tagline),
        ("target_audience", &idea.target_audience),
        ("badge", &idea.badge),
    ] {
        if !fallback.is_empty() {
            obj.entry(key).or_insert_with(|| Value::from(fallback.as_str()));
        }
    }
    serde_json::from_value(Value::Object(obj)).map_err(|e| format!("invalid stack: {e}"))
}

pub struct StackGenerator<'a, G: ?Sized> {
    pub generator: &'a G,
    pub template: &'a Template,
    pub options: GenerationOptions,
}

impl<'a, G> StackGenerator<'a, G>
where
    G: TextGenerator + ?Sized,
{
    /// Generates up to `limit` pending stacks, appending accepted ones to
    /// `stacks` and marking their queue items generated.
    pub async fn run_batch(
        &self,
        queue: &mut ContentQueue<StackIdea>,
        stacks: &mut Vec<TechStack>,
        catalog: &[CatalogEntry],
        limit: usize,
        pause: Duration,
    ) -> Vec<StackOutcome> {
        let ideas = queue.dequeue_pending(limit);
        let total = ideas.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, idea) in ideas.iter().enumerate() {
            let stack_name = idea.stack_name.clone();
            info!(stack = %stack_name, "[STACKS] Generating");
            let prompt = self.template.render(&prompt_substitutions(idea, catalog));

            let raw = match self.generator.generate_text(&prompt, &self.options).await {
                Ok(raw) => raw,
                Err(error) => {
                    error!(stack = %stack_name, error = %error, "[STACKS] Generation failed");
                    outcomes.push(StackOutcome::Failed { stack_name, error });
                    continue;
                }
            };

            let id = next_stack_id(stacks);
            match stack_from_reply(&raw, idea, id) {
                Ok(stack) => {
                    let tools = stack.tool_ids.len();
                    info!(stack = %stack_name, id, tools, cost = %stack.total_monthly_cost, "[STACKS] Published");
                    stacks.push(stack);
                    queue.mark_generated(&idea.stack_name, Utc::now());
                    outcomes.push(StackOutcome::Published {
                        stack_name,
                        id,
                        tools,
                    });
                    if i + 1 < total && !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                Err(reason) => {
                    warn!(stack = %stack_name, reason = %reason, "[STACKS] Skipping");
                    outcomes.push(StackOutcome::Skipped { stack_name, reason });
                }
            }
        }
        outcomes
    }
}
