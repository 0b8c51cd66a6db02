//! # article: comparison articles from queued ideas
//!
//! Each pending [`ComparisonIdea`] moves through
//! `resolving → prompting → validating → formatting → persisted`, or ends as
//! [`ArticleOutcome::Skipped`] when none of its tools exist in the catalog, or
//! [`ArticleOutcome::Failed`] when the model call or the write fails. A bad item
//! never stops the batch.
//!
//! Validation is advisory: word count and required sections are reported as
//! warnings and the article is written regardless, for a human to review.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::catalog::CatalogEntry;
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::PipelineError;
use crate::queue::{ComparisonIdea, ContentQueue};
use crate::store;
use crate::template::{Substitutions, Template};

pub const MIN_WORDS: usize = 2000;
pub const MAX_WORDS: usize = 4000;
pub const REQUIRED_SECTIONS: [&str; 5] = ["Comparison Table", "Pros", "Cons", "FAQ", "Recommendation"];
pub const DESCRIPTION_MAX_CHARS: usize = 160;
pub const DEFAULT_AUTHOR: &str = "TechieSpiral";

/// Queue ideas naming this instead of real tools cannot be resolved.
const VARIOUS: &str = "various";

pub fn article_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(8000)
        .with_temperature(0.7)
}

/// Lowercase ASCII alphanumerics, every other run collapsed to one hyphen,
/// no hyphen at either end.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Catalog entries for the named tools: exact (case-insensitive) name match
/// first, then substring match. Unresolvable names are dropped.
pub fn resolve_entries<'a>(names: &[String], catalog: &'a [CatalogEntry]) -> Vec<&'a CatalogEntry> {
    let mut resolved: Vec<&CatalogEntry> = Vec::new();
    for name in names {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() || wanted == VARIOUS {
            continue;
        }
        let found = catalog
            .iter()
            .find(|e| e.name.to_lowercase() == wanted)
            .or_else(|| catalog.iter().find(|e| e.name.to_lowercase().contains(&wanted)));
        match found {
            Some(entry) if !resolved.iter().any(|r| r.id == entry.id) => resolved.push(entry),
            Some(_) => {}
            None => warn!(tool = %name, "[ARTICLE] Tool not found in catalog"),
        }
    }
    resolved
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() {
        "N/A"
    } else {
        s
    }
}

pub fn format_entry_block(e: &CatalogEntry) -> String {
    let mut block = format!(
        "Tool: {}\nCategory: {}\nPrice: {}\nDescription: {}\nDetails: {}\nFeatures: {}\nPros/Cons: {}\nUse cases: {}\nBest for: {}\n",
        e.name,
        or_na(&e.category),
        or_na(&e.price_range),
        or_na(&e.description),
        or_na(&e.long_description),
        or_na(&e.features),
        or_na(&e.pros_cons),
        or_na(&e.use_cases),
        or_na(&e.best_for),
    );
    if let Some(s) = e.scores() {
        block.push_str(&format!(
            "TechieSpiral score: {}/100\nValue: {}/5\nEase of use: {}/5\nFeatures: {}/5\n",
            s.overall, s.value, s.ease, s.features
        ));
    }
    block.push_str(&format!("Website: {}", or_na(&e.website_url)));
    block
}

pub fn prompt_substitutions(idea: &ComparisonIdea, entries: &[&CatalogEntry]) -> Substitutions {
    let tool_data = entries
        .iter()
        .map(|e| format_entry_block(e))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let name_at = |i: usize| {
        entries
            .get(i)
            .map_or_else(|| format!("Tool {}", i + 1), |e| e.name.clone())
    };
    Substitutions::new()
        .set("title", idea.title.as_str())
        .set("keywords", idea.keywords.as_str())
        .set("category", idea.category.as_str())
        .set("tool_data", tool_data)
        .set("tool_1_name", name_at(0))
        .set("tool_2_name", name_at(1))
        .set("tool_3_name", name_at(2))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationProblem {
    TooShort(usize),
    TooLong(usize),
    MissingSection(&'static str),
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationProblem::TooShort(n) => {
                write!(f, "Article too short: {n} words (minimum {MIN_WORDS})")
            }
            ValidationProblem::TooLong(n) => {
                write!(f, "Article too long: {n} words (maximum {MAX_WORDS})")
            }
            ValidationProblem::MissingSection(s) => write!(f, "Missing required section: {s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub word_count: usize,
    pub problems: Vec<ValidationProblem>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

pub fn validate_article(content: &str) -> ValidationReport {
    let words = word_count(content);
    let mut problems = Vec::new();
    if words < MIN_WORDS {
        problems.push(ValidationProblem::TooShort(words));
    }
    if words > MAX_WORDS {
        problems.push(ValidationProblem::TooLong(words));
    }
    for section in REQUIRED_SECTIONS {
        if !content.contains(section) {
            problems.push(ValidationProblem::MissingSection(section));
        }
    }
    ValidationReport {
        word_count: words,
        problems,
    }
}

fn script_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid script regex"))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-z]*\n.*?\n```").expect("valid fence regex"))
}

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid link regex"))
}

fn leading_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s+").expect("valid heading regex"))
}

/// Strips `<script>` elements and trims fenced code blocks and the whole body.
pub fn sanitize_markdown(content: &str) -> String {
    let without_scripts = script_tag().replace_all(content, "");
    code_fence()
        .replace_all(&without_scripts, |caps: &regex::Captures| caps[0].trim().to_string())
        .trim()
        .to_string()
}

/// First paragraph as plain text, cut to `max_chars` with a `...` suffix.
pub fn extract_description(content: &str, max_chars: usize) -> String {
    let first = content.split("\n\n").next().unwrap_or_default();
    let without_heading = leading_heading().replace(first, "");
    let cleaned = markdown_link().replace_all(&without_heading, "$1");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() > max_chars {
        let cut: String = cleaned.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub published_date: NaiveDate,
    pub category: String,
    pub tools: Vec<String>,
    pub author: String,
    pub featured: bool,
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl FrontMatter {
    pub fn render(&self) -> String {
        let tools = serde_json::to_string(&self.tools).unwrap_or_else(|_| "[]".to_string());
        format!(
            "---\ntitle: {}\ndescription: {}\nkeywords: {}\npublishedDate: {}\ncategory: {}\ntools: {}\nauthor: {}\nfeatured: {}\n---",
            quoted(&self.title),
            quoted(&self.description),
            quoted(&self.keywords),
            quoted(&self.published_date.format("%Y-%m-%d").to_string()),
            quoted(&self.category),
            tools,
            quoted(&self.author),
            self.featured,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published_date: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_articles: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleIndex {
    #[serde(default)]
    pub articles: Vec<ArticleSummary>,
    #[serde(default)]
    pub metadata: IndexMetadata,
}

impl ArticleIndex {
    /// Inserts or replaces by slug, then re-sorts newest first.
    pub fn upsert(&mut self, summary: ArticleSummary, now: DateTime<Utc>) {
        match self.articles.iter_mut().find(|a| a.slug == summary.slug) {
            Some(existing) => *existing = summary,
            None => self.articles.push(summary),
        }
        self.articles
            .sort_by(|a, b| b.published_date.cmp(&a.published_date));
        self.metadata.total_articles = self.articles.len();
        self.metadata.last_updated =
            Some(now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    }

    /// Titles of the most recently published articles.
    pub fn latest_titles(&self, n: usize) -> Vec<&str> {
        self.articles.iter().take(n).map(|a| a.title.as_str()).collect()
    }
}

#[derive(Debug)]
pub enum ArticleOutcome {
    Persisted {
        title: String,
        slug: String,
        path: PathBuf,
        report: ValidationReport,
    },
    Skipped {
        title: String,
    },
    Failed {
        title: String,
        error: PipelineError,
    },
}

impl ArticleOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, ArticleOutcome::Persisted { .. })
    }
}

pub struct ArticleGenerator<'a, G: ?Sized> {
    pub generator: &'a G,
    pub template: &'a Template,
    pub options: GenerationOptions,
    pub articles_dir: &'a Path,
}

impl<'a, G> ArticleGenerator<'a, G>
where
    G: TextGenerator + ?Sized,
{
    /// Writes the article for `idea` and records it in `index`. The queue is not
    /// touched here.
    pub async fn generate_one(
        &self,
        idea: &ComparisonIdea,
        catalog: &[CatalogEntry],
        index: &mut ArticleIndex,
        now: DateTime<Utc>,
    ) -> ArticleOutcome {
        let title = idea.title.clone();
        let entries = resolve_entries(&idea.tool_names, catalog);
        if entries.is_empty() {
            warn!(title = %title, tools = ?idea.tool_names, "[ARTICLE] No tools resolved, skipping");
            return ArticleOutcome::Skipped { title };
        }
        info!(title = %title, resolved = entries.len(), "[ARTICLE] Generating");

        let prompt = self.template.render(&prompt_substitutions(idea, &entries));
        let raw = match self.generator.generate_text(&prompt, &self.options).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(title = %title, error = %e, "[ARTICLE] Generation failed");
                return ArticleOutcome::Failed {
                    title,
                    error: e.into(),
                };
            }
        };

        let body = sanitize_markdown(&raw);
        let report = validate_article(&body);
        for problem in &report.problems {
            warn!(title = %title, problem = %problem, "[ARTICLE] Validation warning");
        }

        let slug = slugify(&title);
        let description = extract_description(&body, DESCRIPTION_MAX_CHARS);
        let tools: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let front = FrontMatter {
            title: title.clone(),
            description: description.clone(),
            keywords: idea.keywords.clone(),
            published_date: now.date_naive(),
            category: idea.category.clone(),
            tools: tools.clone(),
            author: DEFAULT_AUTHOR.to_string(),
            featured: idea.priority == 1,
        };
        let path = self.articles_dir.join(format!("{slug}.md"));
        if let Err(e) = store::write_text(&path, &format!("{}\n\n{}", front.render(), body)) {
            error!(title = %title, error = %e, "[ARTICLE] Write failed");
            return ArticleOutcome::Failed {
                title,
                error: e.into(),
            };
        }
        info!(path = %path.display(), words = report.word_count, "[ARTICLE] Saved");

        index.upsert(
            ArticleSummary {
                slug: slug.clone(),
                title: title.clone(),
                description,
                published_date: front.published_date.format("%Y-%m-%d").to_string(),
                category: idea.category.clone(),
                tools,
                keywords: idea.keywords.clone(),
                word_count: report.word_count,
                extra: Map::new(),
            },
            now,
        );

        ArticleOutcome::Persisted {
            title,
            slug,
            path,
            report,
        }
    }

    /// Handles up to `limit` pending ideas in queue order, pausing after each
    /// written article except the last. Persisted ideas are marked generated.
    pub async fn run_batch(
        &self,
        queue: &mut ContentQueue<ComparisonIdea>,
        index: &mut ArticleIndex,
        catalog: &[CatalogEntry],
        limit: usize,
        pause: Duration,
    ) -> Vec<ArticleOutcome> {
        let ideas = queue.dequeue_pending(limit);
        let total = ideas.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, idea) in ideas.iter().enumerate() {
            let now = Utc::now();
            let outcome = self.generate_one(idea, catalog, index, now).await;
            if outcome.is_persisted() {
                queue.mark_generated(&idea.title, now);
                if i + 1 < total && !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}
