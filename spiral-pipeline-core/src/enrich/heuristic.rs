//! Deterministic scoring from an entry's own text.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::catalog::{CatalogEntry, Scores};

const EASY_TERMS: [&str; 7] = [
    "simple",
    "easy",
    "intuitive",
    "quick",
    "no-code",
    "drag-and-drop",
    "beginner",
];

const COMPLEX_TERMS: [&str; 5] = [
    "enterprise",
    "advanced",
    "complex",
    "technical",
    "requires setup",
];

const WELL_KNOWN_BRANDS: [&str; 7] = [
    "github", "figma", "notion", "slack", "stripe", "vercel", "netlify",
];

const POPULAR_CATEGORIES: [&str; 5] = [
    "Developer Tools",
    "Design Tools",
    "Analytics",
    "Hosting",
    "Payment Processing",
];

pub const MIN_OVERALL: i32 = 40;
pub const MAX_OVERALL: i32 = 95;
const MAX_ALTERNATIVES: usize = 5;

fn dollar_amount() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("valid price regex")
    })
}

/// First `$amount` in the text, thousands separators ignored.
pub fn leading_dollar_amount(price: &str) -> Option<f64> {
    let caps = dollar_amount().captures(price)?;
    caps[1].replace(',', "").parse().ok()
}

/// 5 for free or anything priced from `$0`, otherwise by the first dollar
/// amount: <20 → 4, <50 → 3, <100 → 2, else 1. No amount at all also scores 1.
pub fn value_score(price: &str) -> u8 {
    if price.to_lowercase().contains("free") || price.trim_start().starts_with("$0") {
        return 5;
    }
    match leading_dollar_amount(price) {
        Some(a) if a <= 0.0 => 5,
        Some(a) if a < 20.0 => 4,
        Some(a) if a < 50.0 => 3,
        Some(a) if a < 100.0 => 2,
        _ => 1,
    }
}

pub fn is_well_known_brand(name: &str) -> bool {
    let name = name.to_lowercase();
    WELL_KNOWN_BRANDS.iter().any(|b| name.contains(b))
}

pub fn is_popular_category(category: &str) -> bool {
    POPULAR_CATEGORIES.contains(&category)
}

/// Base 3; easy wording lifts to 4, complex wording drops to 2 (complex wins);
/// a well-known brand adds 1, capped at 5.
pub fn ease_score(entry: &CatalogEntry) -> u8 {
    let text = format!("{} {}", entry.description, entry.long_description).to_lowercase();
    let mut score: u8 = 3;
    if EASY_TERMS.iter().any(|t| text.contains(t)) {
        score = 4;
    }
    if COMPLEX_TERMS.iter().any(|t| text.contains(t)) {
        score = 2;
    }
    if is_well_known_brand(&entry.name) {
        score = (score + 1).min(5);
    }
    score
}

/// Bucketed count of comma-separated features; blank items are not counted.
pub fn features_score(features: &str) -> u8 {
    let count = features.split(',').filter(|f| !f.trim().is_empty()).count();
    match count {
        n if n >= 6 => 5,
        n if n >= 4 => 4,
        n if n >= 2 => 3,
        _ => 2,
    }
}

/// Combines sub-scores and bonuses, clamped to `[MIN_OVERALL, MAX_OVERALL]`.
pub fn composite_score(
    value: u8,
    ease: u8,
    features: u8,
    popular_category: bool,
    brand: bool,
) -> u8 {
    let mut score = 50
        + (i32::from(value) - 3) * 10
        + (i32::from(ease) - 3) * 5
        + (i32::from(features) - 3) * 8;
    if popular_category {
        score += 10;
    }
    if brand {
        score += 15;
    }
    // Clamped into 40..=95, always fits.
    score.clamp(MIN_OVERALL, MAX_OVERALL) as u8
}

pub fn alternatives(entry: &CatalogEntry, catalog: &[CatalogEntry]) -> Vec<u32> {
    entry
        .peers(catalog)
        .take(MAX_ALTERNATIVES)
        .map(|e| e.id)
        .collect()
}

pub fn score_entry(entry: &CatalogEntry) -> Scores {
    let value = value_score(&entry.price_range);
    let ease = ease_score(entry);
    let features = features_score(&entry.features);
    Scores {
        overall: composite_score(
            value,
            ease,
            features,
            is_popular_category(&entry.category),
            is_well_known_brand(&entry.name),
        ),
        value,
        ease,
        features,
    }
}

/// Scores one entry. Already-scored entries come back unchanged.
pub fn enrich_entry(entry: &CatalogEntry, catalog: &[CatalogEntry], now: DateTime<Utc>) -> CatalogEntry {
    if entry.is_scored() {
        return entry.clone();
    }
    let scores = score_entry(entry);
    debug!(
        entry_id = entry.id,
        name = %entry.name,
        overall = scores.overall,
        "Heuristic scores computed"
    );
    let mut enriched = entry.clone();
    enriched.apply_scores(scores, alternatives(entry, catalog), now);
    enriched
}

/// Scores every unscored entry. Returns the new catalog and how many entries changed.
pub fn enrich_catalog(catalog: &[CatalogEntry], now: DateTime<Utc>) -> (Vec<CatalogEntry>, usize) {
    let mut changed = 0;
    let updated = catalog
        .iter()
        .map(|entry| {
            if !entry.is_scored() {
                changed += 1;
            }
            enrich_entry(entry, catalog, now)
        })
        .collect();
    (updated, changed)
}
