//! # catalog: typed records for the flat JSON data files
//!
//! [`CatalogEntry`] is the tool listing. On disk it is a loosely-typed JSON object
//! (string timestamps, comma-joined alternatives, an older `scout_score` name for
//! the composite score); in memory it is strongly typed, and scoring is an explicit
//! [`Scoring`] variant so an entry is either fully scored or not scored at all.
//!
//! Conversion goes through [`RawCatalogEntry`] with `serde(from, into)`. Fields the
//! pipeline does not know about are carried in `extra` and written back untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupStage {
    Validating,
    Mvp,
    Launched,
    Scaling,
}

impl StartupStage {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "validating" => Some(Self::Validating),
            "mvp" => Some(Self::Mvp),
            "launched" => Some(Self::Launched),
            "scaling" => Some(Self::Scaling),
            _ => None,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::Mvp, Self::Launched]
    }
}

/// Composite score (0-100) and the three sub-scores (1-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scores {
    pub overall: u8,
    pub value: u8,
    pub ease: u8,
    pub features: u8,
}

impl Scores {
    /// Clamps each field into its documented range.
    pub fn clamped(self) -> Self {
        Self {
            overall: self.overall.min(100),
            value: self.value.clamp(1, 5),
            ease: self.ease.clamp(1, 5),
            features: self.features.clamp(1, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scoring {
    /// Never enriched. `stale_enriched_at` survives from files where a timestamp
    /// was written without a complete score set.
    Unscored {
        stale_enriched_at: Option<DateTime<Utc>>,
    },
    Scored {
        scores: Scores,
        enriched_at: Option<DateTime<Utc>>,
    },
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring::Unscored {
            stale_enriched_at: None,
        }
    }
}

/// One tool listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCatalogEntry", into = "RawCatalogEntry")]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    pub category: String,
    pub description: String,
    pub long_description: String,
    pub price_range: String,
    pub website_url: String,
    pub affiliate_link: Option<String>,
    pub logo_url: Option<String>,
    pub features: String,
    pub pros_cons: String,
    pub use_cases: String,
    pub best_for: String,
    pub startup_stages: Vec<StartupStage>,
    pub scoring: Scoring,
    pub alternatives: Vec<u32>,
    pub featured: Option<bool>,
    pub sponsored_tier: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub discovered_at: Option<DateTime<Utc>>,
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(id: u32, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            description: String::new(),
            long_description: String::new(),
            price_range: String::new(),
            website_url: String::new(),
            affiliate_link: None,
            logo_url: None,
            features: String::new(),
            pros_cons: String::new(),
            use_cases: String::new(),
            best_for: String::new(),
            startup_stages: Vec::new(),
            scoring: Scoring::default(),
            alternatives: Vec::new(),
            featured: None,
            sponsored_tier: None,
            created_at: None,
            discovered_at: None,
            extra: Map::new(),
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self.scoring, Scoring::Scored { .. })
    }

    pub fn scores(&self) -> Option<Scores> {
        match self.scoring {
            Scoring::Scored { scores, .. } => Some(scores),
            Scoring::Unscored { .. } => None,
        }
    }

    pub fn overall_score(&self) -> Option<u8> {
        self.scores().map(|s| s.overall)
    }

    /// Any enrichment timestamp, including one left over on an unscored entry.
    pub fn enriched_at(&self) -> Option<DateTime<Utc>> {
        match self.scoring {
            Scoring::Scored { enriched_at, .. } => enriched_at,
            Scoring::Unscored { stale_enriched_at } => stale_enriched_at,
        }
    }

    /// Records a complete score set together with its timestamp.
    pub fn apply_scores(&mut self, scores: Scores, alternatives: Vec<u32>, at: DateTime<Utc>) {
        self.scoring = Scoring::Scored {
            scores: scores.clamped(),
            enriched_at: Some(at),
        };
        self.alternatives = alternatives;
    }

    pub fn is_featured(&self) -> bool {
        self.featured.unwrap_or(false)
    }

    /// Other entries in the same category, in catalog order.
    pub fn peers<'a>(
        &'a self,
        catalog: &'a [CatalogEntry],
    ) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        catalog
            .iter()
            .filter(move |other| other.category == self.category && other.id != self.id)
    }
}

/// `max(id) + 1`, or 1 for an empty catalog.
pub fn next_id(catalog: &[CatalogEntry]) -> u32 {
    catalog.iter().map(|e| e.id).max().map_or(1, |max| max + 1)
}

/// Replaces entries in `catalog` by id with their counterparts in `updated`.
/// Entries in `updated` with unknown ids are appended.
pub fn merge_by_id(catalog: &mut Vec<CatalogEntry>, updated: Vec<CatalogEntry>) {
    for entry in updated {
        match catalog.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => *slot = entry,
            None => catalog.push(entry),
        }
    }
}

/// Parses the timestamp shapes found in the data files: RFC 3339, a plain
/// `YYYY-MM-DD HH:MM:SS`, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// On-disk shape of a catalog entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCatalogEntry {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tool_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub long_description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub price_range: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub website_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliate_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub features: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pros_cons: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub use_cases: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub best_for: String,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub startup_stages: Option<Vec<String>>,
    #[serde(
        default,
        serialize_with = "whole_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub techiespiral_score: Option<f64>,
    #[serde(default, skip_serializing)]
    pub scout_score: Option<f64>,
    #[serde(
        default,
        serialize_with = "whole_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_score: Option<f64>,
    #[serde(
        default,
        serialize_with = "whole_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub ease_score: Option<f64>,
    #[serde(
        default,
        serialize_with = "whole_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub features_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsored_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const SCORE_KEYS: [&str; 4] = [
    "techiespiral_score",
    "value_score",
    "ease_score",
    "features_score",
];

/// A JSON `null` reads as an empty string.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Stages arrive as `["idea", "mvp"]` or as `"idea, mvp"`.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    let raw = Option::<StringOrList>::deserialize(deserializer)?;
    Ok(raw.map(|raw| match raw {
        StringOrList::One(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        StringOrList::Many(list) => list,
    }))
}

fn score_value(raw: f64) -> Option<Value> {
    if raw.fract() == 0.0 && raw.abs() < 1e15 {
        Some(Value::from(raw as i64))
    } else {
        serde_json::Number::from_f64(raw).map(Value::Number)
    }
}

/// Whole scores are written as integers.
fn whole_score<S: Serializer>(score: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match score {
        Some(raw) if raw.fract() == 0.0 && raw.abs() < 1e15 => serializer.serialize_i64(*raw as i64),
        Some(raw) => serializer.serialize_f64(*raw),
        None => serializer.serialize_none(),
    }
}

fn score_u8(raw: f64) -> u8 {
    raw.round().clamp(0.0, 255.0) as u8
}

/// Alternatives arrive either as `"3,4,5"` or as a JSON array of numbers/strings.
pub fn parse_alternatives(raw: &Value) -> Vec<u32> {
    match raw {
        Value::String(s) => s
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

/// Parses a timestamp field; an unparseable value is kept verbatim in `extra`.
fn lenient_timestamp(
    key: &str,
    raw: Option<String>,
    extra: &mut Map<String, Value>,
) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match parse_timestamp(&raw) {
        Some(ts) => Some(ts),
        None => {
            debug!(field = key, value = %raw, "Unparseable timestamp kept verbatim");
            extra.insert(key.to_string(), Value::String(raw));
            None
        }
    }
}

impl From<RawCatalogEntry> for CatalogEntry {
    fn from(raw: RawCatalogEntry) -> Self {
        let mut extra = raw.extra;

        let overall = raw.techiespiral_score.or(raw.scout_score);
        let enriched_at = lenient_timestamp("enriched_at", raw.enriched_at, &mut extra);
        let scoring = match (overall, raw.value_score, raw.ease_score, raw.features_score) {
            (Some(o), Some(v), Some(e), Some(f)) => Scoring::Scored {
                scores: Scores {
                    overall: score_u8(o),
                    value: score_u8(v),
                    ease: score_u8(e),
                    features: score_u8(f),
                },
                enriched_at,
            },
            partial => {
                // Incomplete score sets are not trusted; keep the numbers so the
                // file round-trips until the entry is re-enriched.
                let (o, v, e, f) = partial;
                for (key, value) in SCORE_KEYS.iter().zip([o, v, e, f]) {
                    if let Some(v) = value.and_then(score_value) {
                        extra.insert((*key).to_string(), v);
                    }
                }
                Scoring::Unscored {
                    stale_enriched_at: enriched_at,
                }
            }
        };

        let startup_stages = raw
            .startup_stages
            .unwrap_or_default()
            .iter()
            .filter_map(|s| StartupStage::parse(s))
            .collect();

        let created_at = lenient_timestamp("created_at", raw.created_at, &mut extra);
        let discovered_at = lenient_timestamp("discovered_at", raw.discovered_at, &mut extra);

        CatalogEntry {
            id: raw.id,
            name: raw.tool_name,
            category: raw.category,
            description: raw.description,
            long_description: raw.long_description,
            price_range: raw.price_range,
            website_url: raw.website_url,
            affiliate_link: raw.affiliate_link,
            logo_url: raw.logo_url,
            features: raw.features,
            pros_cons: raw.pros_cons,
            use_cases: raw.use_cases,
            best_for: raw.best_for,
            startup_stages,
            scoring,
            alternatives: raw
                .alternatives
                .as_ref()
                .map(parse_alternatives)
                .unwrap_or_default(),
            featured: raw.featured,
            sponsored_tier: raw.sponsored_tier,
            created_at,
            discovered_at,
            extra,
        }
    }
}

impl From<CatalogEntry> for RawCatalogEntry {
    fn from(entry: CatalogEntry) -> Self {
        let mut extra = entry.extra;

        let (scores, enriched_at) = match entry.scoring {
            Scoring::Scored {
                scores,
                enriched_at,
            } => {
                for key in SCORE_KEYS {
                    extra.remove(key);
                }
                (Some(scores), enriched_at)
            }
            Scoring::Unscored { stale_enriched_at } => (None, stale_enriched_at),
        };
        for (key, typed) in [
            ("enriched_at", enriched_at.is_some()),
            ("created_at", entry.created_at.is_some()),
            ("discovered_at", entry.discovered_at.is_some()),
        ] {
            if typed {
                extra.remove(key);
            }
        }
        extra.remove("scout_score");

        let alternatives = if entry.alternatives.is_empty() {
            None
        } else {
            Some(Value::String(
                entry
                    .alternatives
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ))
        };

        RawCatalogEntry {
            id: entry.id,
            tool_name: entry.name,
            category: entry.category,
            description: entry.description,
            long_description: entry.long_description,
            price_range: entry.price_range,
            website_url: entry.website_url,
            affiliate_link: entry.affiliate_link,
            logo_url: entry.logo_url,
            features: entry.features,
            pros_cons: entry.pros_cons,
            use_cases: entry.use_cases,
            best_for: entry.best_for,
            startup_stages: if entry.startup_stages.is_empty() {
                None
            } else {
                Some(
                    entry
                        .startup_stages
                        .iter()
                        .filter_map(|s| serde_json::to_value(s).ok())
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                )
            },
            techiespiral_score: scores.map(|s| f64::from(s.overall)),
            scout_score: None,
            value_score: scores.map(|s| f64::from(s.value)),
            ease_score: scores.map(|s| f64::from(s.ease)),
            features_score: scores.map(|s| f64::from(s.features)),
            alternatives,
            featured: entry.featured,
            sponsored_tier: entry.sponsored_tier,
            created_at: entry.created_at.as_ref().map(format_timestamp),
            discovered_at: entry.discovered_at.as_ref().map(format_timestamp),
            enriched_at: enriched_at.as_ref().map(format_timestamp),
            extra,
        }
    }
}

/// A curated collection of catalog entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub id: u32,
    pub stack_name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub tool_ids: Vec<u32>,
    #[serde(default)]
    pub total_monthly_cost: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_annual_cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TechStack {
    /// The referenced entries that exist, in stack order. Dangling ids are skipped.
    pub fn resolve_entries<'a>(&self, catalog: &'a [CatalogEntry]) -> Vec<&'a CatalogEntry> {
        let by_id: BTreeMap<u32, &CatalogEntry> = catalog.iter().map(|e| (e.id, e)).collect();
        self.tool_ids
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Tool1,
    Tool2,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// A hand-curated head-to-head comparison page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedComparison {
    pub id: String,
    pub tool1_id: u32,
    pub tool2_id: u32,
    pub tool1_slug: String,
    pub tool2_slug: String,
    pub title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    #[serde(default)]
    pub use_case_recommendations: String,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popular_searches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl FeaturedComparison {
    /// The declared winner's entry; `None` for a tie, no verdict, or a missing entry.
    pub fn winner_entry<'a>(&self, catalog: &'a [CatalogEntry]) -> Option<&'a CatalogEntry> {
        let id = match self.winner? {
            Winner::Tool1 => self.tool1_id,
            Winner::Tool2 => self.tool2_id,
            Winner::Tie => return None,
        };
        catalog.iter().find(|e| e.id == id)
    }
}
