//! Discovery of new catalog entries through the model.
//!
//! The model is shown every existing name and asked for a JSON array of new
//! candidates. Each candidate is validated on its own: a missing required field
//! or a duplicate name rejects that candidate only. Survivors get sequential ids
//! after the current maximum.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::catalog::{next_id, CatalogEntry, StartupStage};
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::LlmError;
use crate::llm::generate_json;
use crate::template::{Substitutions, Template};

pub const REQUIRED_FIELDS: [&str; 5] = [
    "tool_name",
    "category",
    "description",
    "price_range",
    "website_url",
];

const DEFAULT_BEST_FOR: &str = "Developers";

pub fn discovery_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(4096)
        .with_temperature(0.8)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotAnObject,
    MissingField(&'static str),
    DuplicateName(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAnObject => write!(f, "candidate is not a JSON object"),
            RejectReason::MissingField(field) => write!(f, "missing required field `{field}`"),
            RejectReason::DuplicateName(name) => write!(f, "`{name}` is already listed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub index: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub accepted: Vec<CatalogEntry>,
    pub rejected: Vec<Rejected>,
}

impl DiscoveryOutcome {
    /// Accepted entries per category, alphabetically.
    pub fn by_category(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.accepted {
            *counts.entry(e.category.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

pub fn prompt_substitutions(catalog: &[CatalogEntry]) -> Substitutions {
    let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
    Substitutions::new().set("existing_tool_names", names.join(", "))
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn stages_field(obj: &Map<String, Value>) -> Vec<StartupStage> {
    let stages: Vec<StartupStage> = obj
        .get("startup_stages")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(StartupStage::parse)
                .collect()
        })
        .unwrap_or_default();
    if stages.is_empty() {
        StartupStage::defaults()
    } else {
        stages
    }
}

/// Validates one candidate object and turns it into an entry with `id`.
pub fn normalize_candidate(
    candidate: &Value,
    id: u32,
    now: DateTime<Utc>,
) -> Result<CatalogEntry, RejectReason> {
    let obj = candidate.as_object().ok_or(RejectReason::NotAnObject)?;
    let required =
        |field: &'static str| text_field(obj, field).ok_or(RejectReason::MissingField(field));
    let name = required(REQUIRED_FIELDS[0])?;
    let category = required(REQUIRED_FIELDS[1])?;
    let description = required(REQUIRED_FIELDS[2])?;
    let price_range = required(REQUIRED_FIELDS[3])?;
    let website_url = required(REQUIRED_FIELDS[4])?;

    let mut entry = CatalogEntry::new(id, name, category);
    entry.long_description = text_field(obj, "long_description").unwrap_or_else(|| description.clone());
    entry.description = description;
    entry.price_range = price_range;
    entry.affiliate_link = Some(text_field(obj, "affiliate_link").unwrap_or_else(|| website_url.clone()));
    entry.website_url = website_url;
    entry.logo_url = text_field(obj, "logo_url");
    entry.features = text_field(obj, "features").unwrap_or_default();
    entry.pros_cons = text_field(obj, "pros_cons").unwrap_or_default();
    entry.use_cases = text_field(obj, "use_cases").unwrap_or_default();
    entry.best_for = text_field(obj, "best_for").unwrap_or_else(|| DEFAULT_BEST_FOR.to_string());
    entry.startup_stages = stages_field(obj);
    entry.discovered_at = Some(now);
    Ok(entry)
}

/// Validates a parsed model reply against the catalog. Ids start at
/// `next_id(catalog)` and are only consumed by accepted candidates.
pub fn accept_candidates(
    reply: &Value,
    catalog: &[CatalogEntry],
    now: DateTime<Utc>,
) -> Result<DiscoveryOutcome, LlmError> {
    let candidates = reply.as_array().ok_or_else(|| LlmError::UnexpectedShape {
        expected: "a JSON array of candidate tools",
        raw: reply.to_string(),
    })?;

    let mut known: HashSet<String> = catalog.iter().map(|e| e.name.to_lowercase()).collect();
    let mut next = next_id(catalog);
    let mut outcome = DiscoveryOutcome::default();

    for (index, candidate) in candidates.iter().enumerate() {
        match normalize_candidate(candidate, next, now) {
            Ok(entry) if !known.insert(entry.name.to_lowercase()) => {
                let reason = RejectReason::DuplicateName(entry.name);
                warn!(index, reason = %reason, "[DISCOVER] Candidate rejected");
                outcome.rejected.push(Rejected { index, reason });
            }
            Ok(entry) => {
                info!(entry_id = entry.id, name = %entry.name, category = %entry.category, "[DISCOVER] Candidate accepted");
                next += 1;
                outcome.accepted.push(entry);
            }
            Err(reason) => {
                warn!(index, reason = %reason, "[DISCOVER] Candidate rejected");
                outcome.rejected.push(Rejected { index, reason });
            }
        }
    }
    Ok(outcome)
}

/// Prompts the model and validates its candidates.
pub async fn discover<G>(
    generator: &G,
    template: &Template,
    catalog: &[CatalogEntry],
    options: &GenerationOptions,
    now: DateTime<Utc>,
) -> Result<DiscoveryOutcome, LlmError>
where
    G: TextGenerator + ?Sized,
{
    let prompt = template.render(&prompt_substitutions(catalog));
    info!(existing = catalog.len(), "[DISCOVER] Asking model for new tools");
    let reply: Value = generate_json(generator, &prompt, options).await?;
    accept_candidates(&reply, catalog, now)
}
