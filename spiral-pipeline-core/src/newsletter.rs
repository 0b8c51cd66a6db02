//! # newsletter: weekly digest generation
//!
//! Selects recent, featured and top-rated entries plus catalog statistics,
//! has the model write the digest in Markdown, renders it to HTML inside a
//! fixed email shell, and asks the model separately for a subject line.
//! Unlike articles, the checks here are hard: a short body or subject aborts
//! the run so a broken newsletter is never produced or sent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Utc};
use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::article::ArticleIndex;
use crate::catalog::{CatalogEntry, FeaturedComparison};
use crate::contract::{GenerationOptions, TextGenerator};
use crate::error::NewsletterError;
use crate::store;
use crate::template::{Substitutions, TemplateKind, TemplateSet};

pub const NEW_WINDOW_DAYS: i64 = 7;
pub const MAX_NEW: usize = 5;
pub const MAX_FEATURED: usize = 3;
pub const MAX_POPULAR: usize = 3;
pub const MIN_BODY_CHARS: usize = 100;
pub const MIN_SUBJECT_CHARS: usize = 5;
pub const MAX_SUBJECT_CHARS: usize = 60;
pub const MIN_SEND_HTML_CHARS: usize = 200;

pub fn body_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(2048)
        .with_temperature(0.8)
}

pub fn subject_options(model: &str) -> GenerationOptions {
    GenerationOptions::for_model(model)
        .with_max_tokens(100)
        .with_temperature(0.9)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStats {
    pub total: usize,
    pub new_this_month: usize,
    pub categories: usize,
    pub top_category: Option<String>,
}

impl CatalogStats {
    pub fn compute(catalog: &[CatalogEntry], now: DateTime<Utc>) -> Self {
        let new_this_month = catalog
            .iter()
            .filter_map(|e| e.created_at)
            .filter(|t| t.year() == now.year() && t.month() == now.month())
            .count();
        let mut per_category: BTreeMap<&str, usize> = BTreeMap::new();
        for e in catalog {
            *per_category.entry(e.category.as_str()).or_insert(0) += 1;
        }
        // Ties resolve to the alphabetically first category.
        let top_category = per_category
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(c, _)| (*c).to_string());
        Self {
            total: catalog.len(),
            new_this_month,
            categories: per_category.len(),
            top_category,
        }
    }
}

/// What goes into one digest.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub new_entries: Vec<&'a CatalogEntry>,
    pub featured: Vec<&'a CatalogEntry>,
    pub popular: Vec<&'a CatalogEntry>,
    pub stats: CatalogStats,
}

impl<'a> Selection<'a> {
    pub fn pick(catalog: &'a [CatalogEntry], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(NEW_WINDOW_DAYS);
        let new_entries = catalog
            .iter()
            .filter(|e| e.created_at.is_some_and(|t| t > cutoff))
            .take(MAX_NEW)
            .collect();
        let featured = catalog
            .iter()
            .filter(|e| e.is_featured())
            .take(MAX_FEATURED)
            .collect();
        let mut rated: Vec<&CatalogEntry> = catalog.iter().filter(|e| e.is_scored()).collect();
        rated.sort_by(|a, b| b.overall_score().cmp(&a.overall_score()));
        rated.truncate(MAX_POPULAR);
        Self {
            new_entries,
            featured,
            popular: rated,
            stats: CatalogStats::compute(catalog, now),
        }
    }
}

/// Latest article titles, or the curated comparisons when nothing is published.
fn popular_comparisons(index: &ArticleIndex, featured: &[FeaturedComparison]) -> String {
    let mut titles = index.latest_titles(MAX_POPULAR);
    if titles.is_empty() {
        titles = featured
            .iter()
            .take(MAX_POPULAR)
            .map(|c| c.title.as_str())
            .collect();
    }
    if titles.is_empty() {
        "No comparison articles published yet (highlight the top-rated tools instead)".to_string()
    } else {
        titles
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn prompt_substitutions(
    selection: &Selection<'_>,
    index: &ArticleIndex,
    featured_comparisons: &[FeaturedComparison],
) -> Substitutions {
    let new_tools = if selection.new_entries.is_empty() {
        "No new tools this week (use existing popular tools instead)".to_string()
    } else {
        selection
            .new_entries
            .iter()
            .map(|e| format!("- {}: {} | {} | {}", e.name, e.description, e.price_range, e.best_for))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let featured = if selection.featured.is_empty() {
        "No featured tools this week".to_string()
    } else {
        selection
            .featured
            .iter()
            .map(|e| {
                format!(
                    "- {} ({}): {} | {}",
                    e.name,
                    e.sponsored_tier.as_deref().unwrap_or("featured"),
                    e.description,
                    e.price_range
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let mut stats = format!(
        "- {} total tools\n- {} new tools this month\n- {} categories",
        selection.stats.total, selection.stats.new_this_month, selection.stats.categories
    );
    if let Some(top) = &selection.stats.top_category {
        stats.push_str(&format!("\n- {top} is the largest category"));
    }
    if !selection.popular.is_empty() {
        let top_rated = selection
            .popular
            .iter()
            .map(|e| format!("{} ({}/100)", e.name, e.overall_score().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", ");
        stats.push_str(&format!("\n- Top rated: {top_rated}"));
    }

    Substitutions::new()
        .set("new_tools", new_tools)
        .set(
            "popular_comparisons",
            popular_comparisons(index, featured_comparisons),
        )
        .set("featured_tools", featured)
        .set("stats", stats)
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}

const EMAIL_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>TechieSpiral Newsletter</title>
  <style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; }
    .container { background-color: #ffffff; padding: 40px; border-radius: 8px; }
    h1 { color: #000; font-size: 28px; border-bottom: 3px solid #FFD700; padding-bottom: 12px; }
    h2 { color: #000; font-size: 20px; margin-top: 32px; }
    p, li { color: #555; }
    a { color: #6B46C1; text-decoration: none; }
    .header { text-align: center; margin-bottom: 32px; }
    .logo { font-size: 32px; font-weight: 700; color: #6B46C1; }
    .tagline { color: #888; font-size: 14px; }
    .footer { margin-top: 40px; padding-top: 20px; border-top: 1px solid #ddd; font-size: 14px; color: #888; text-align: center; }
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <div class="logo">TechieSpiral</div>
      <div class="tagline">Tech Stack Advisor for Indie Hackers</div>
    </div>
"#;

const EMAIL_FOOT: &str = r#"
    <div class="footer">
      <p>
        <a href="https://techiespiral.com">Visit TechieSpiral</a> |
        <a href="https://techiespiral.com/sponsorship">Sponsor Us</a> |
        <a href="{{ UnsubscribeURL }}">Unsubscribe</a>
      </p>
      <p style="font-size: 12px; color: #aaa;">
        You're receiving this because you subscribed to TechieSpiral updates.
      </p>
    </div>
  </div>
</body>
</html>"#;

/// Rendered digest wrapped in the email shell. The unsubscribe link is a
/// mailing-service merge tag and is left for the service to fill.
pub fn render_html(markdown: &str) -> String {
    format!("{EMAIL_HEAD}{}{EMAIL_FOOT}", markdown_to_html(markdown))
}

/// Trims whitespace and one layer of surrounding quotes.
pub fn clean_subject(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix(['"', '\''])
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterStats {
    pub new_tools: usize,
    pub featured_tools: usize,
    pub total_tools: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Newsletter {
    pub subject: String,
    pub markdown: String,
    pub html: String,
    pub generated_at: DateTime<Utc>,
    pub stats: NewsletterStats,
}

impl Newsletter {
    /// Send-time guard: the subject and HTML must be substantial.
    pub fn validate_for_send(&self) -> Result<(), NewsletterError> {
        if self.subject.trim().chars().count() < MIN_SUBJECT_CHARS {
            return Err(NewsletterError::SubjectTooShort(self.subject.clone()));
        }
        let html_len = self.html.trim().chars().count();
        if html_len < MIN_SEND_HTML_CHARS {
            return Err(NewsletterError::HtmlTooShort(html_len));
        }
        Ok(())
    }
}

/// Generates the digest body and subject. Nothing is written.
pub async fn generate_newsletter<G>(
    generator: &G,
    templates: &TemplateSet,
    catalog: &[CatalogEntry],
    index: &ArticleIndex,
    featured_comparisons: &[FeaturedComparison],
    model: &str,
    now: DateTime<Utc>,
) -> Result<Newsletter, NewsletterError>
where
    G: TextGenerator + ?Sized,
{
    let selection = Selection::pick(catalog, now);
    info!(
        new = selection.new_entries.len(),
        featured = selection.featured.len(),
        popular = selection.popular.len(),
        "[NEWSLETTER] Selection ready"
    );

    let prompt = templates
        .get(TemplateKind::Newsletter)
        .render(&prompt_substitutions(&selection, index, featured_comparisons));
    let markdown = generator
        .generate_text(&prompt, &body_options(model))
        .await?;
    let body_len = markdown.trim().chars().count();
    if body_len < MIN_BODY_CHARS {
        return Err(NewsletterError::BodyTooShort(body_len));
    }

    let subject_prompt = templates.get(TemplateKind::Subject).render(
        &Substitutions::new()
            .set("newsletter_content", markdown.as_str())
            .set("max_chars", MAX_SUBJECT_CHARS.to_string()),
    );
    let subject = clean_subject(
        &generator
            .generate_text(&subject_prompt, &subject_options(model))
            .await?,
    );
    if subject.chars().count() < MIN_SUBJECT_CHARS {
        return Err(NewsletterError::SubjectTooShort(subject));
    }
    info!(subject = %subject, "[NEWSLETTER] Subject generated");

    Ok(Newsletter {
        subject,
        html: render_html(&markdown),
        markdown,
        generated_at: now,
        stats: NewsletterStats {
            new_tools: selection.new_entries.len(),
            featured_tools: selection.featured.len(),
            total_tools: selection.stats.total,
        },
    })
}

/// The `.json`, `.html` and `.md` files written for one newsletter.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsletterFiles {
    pub json: PathBuf,
    pub html: PathBuf,
    pub markdown: PathBuf,
}

/// Writes `newsletter-YYYY-MM-DD.{json,html,md}` into `dir`, creating it.
pub fn write_outputs(dir: &Path, newsletter: &Newsletter) -> Result<NewsletterFiles, NewsletterError> {
    let stem = format!("newsletter-{}", newsletter.generated_at.format("%Y-%m-%d"));
    let files = NewsletterFiles {
        json: dir.join(format!("{stem}.json")),
        html: dir.join(format!("{stem}.html")),
        markdown: dir.join(format!("{stem}.md")),
    };
    store::write_json(&files.json, newsletter)?;
    store::write_text(&files.html, &newsletter.html)?;
    store::write_text(&files.markdown, &newsletter.markdown)?;
    info!(dir = %dir.display(), stem = %stem, "[NEWSLETTER] Output written");
    Ok(files)
}
