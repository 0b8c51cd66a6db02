//! High-level pipeline: one function per content job, end to end.
//!
//! Each `run_*` function is what one CLI subcommand does: load the data files it
//! needs, run one component, write the results back. The catalog file is always
//! backed up before it is overwritten. Files are only rewritten when something
//! changed.
//!
//! # Navigation
//! - Enrichment: [`run_local_enrichment`], [`run_assisted_enrichment`]
//! - New entries: [`run_discovery`]
//! - Queues: [`run_idea_generation`], [`run_article_generation`], [`run_stack_generation`]
//! - Newsletter: [`run_newsletter_generation`], [`run_newsletter_send`]
//!
//! Every function returns a report implementing `Display` for the CLI to print.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::article::{ArticleGenerator, ArticleIndex, ArticleOutcome, article_options};
use crate::cancel::CancelToken;
use crate::catalog::{merge_by_id, CatalogEntry, FeaturedComparison, TechStack};
use crate::config::PipelineConfig;
use crate::contract::{MailTransport, TextGenerator};
use crate::discover::{discover, discovery_options};
use crate::enrich::assisted::{enrich_batch, scoring_options, BatchOptions};
use crate::enrich::heuristic::enrich_catalog;
use crate::enrich::EnrichmentStats;
use crate::error::PipelineError;
use crate::ideas::{generate_ideas, ideas_options};
use crate::mailing::{Campaign, MailingClient, SendRequest};
use crate::newsletter::{generate_newsletter, write_outputs, Newsletter, NewsletterFiles};
use crate::queue::{ComparisonIdea, ContentQueue, StackIdea};
use crate::stacks::{stack_options, StackGenerator, StackOutcome};
use crate::store;
use crate::template::{TemplateKind, TemplateSet};

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub loaded: usize,
    pub candidates: usize,
    pub enriched: Vec<CatalogEntry>,
    pub failed: Vec<String>,
    pub cancelled: bool,
    pub backup: Option<PathBuf>,
}

impl EnrichmentReport {
    pub fn stats(&self) -> Option<EnrichmentStats> {
        EnrichmentStats::from_entries(&self.enriched)
    }
}

impl fmt::Display for EnrichmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loaded {} tools, {} needed enrichment", self.loaded, self.candidates)?;
        if self.candidates == 0 {
            return write!(f, "No tools need enrichment.");
        }
        writeln!(f, "Successfully enriched {} tools", self.enriched.len())?;
        for name in &self.failed {
            writeln!(f, "   failed: {name}")?;
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled; completed results were kept.")?;
        }
        if let Some(backup) = &self.backup {
            writeln!(f, "Backup saved to: {}", backup.display())?;
        }
        match self.stats() {
            Some(stats) => write!(f, "{stats}"),
            None => write!(f, "Catalog left unchanged."),
        }
    }
}

/// Scores every unscored entry with the deterministic heuristic.
pub fn run_local_enrichment(
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<EnrichmentReport, PipelineError> {
    let paths = config.paths();
    let catalog = store::load_catalog(&paths.catalog)?;
    let (updated, changed) = enrich_catalog(&catalog, now);

    let mut report = EnrichmentReport {
        loaded: catalog.len(),
        candidates: changed,
        ..Default::default()
    };
    if changed == 0 {
        info!("[ENRICH] Every tool is already scored");
        return Ok(report);
    }
    report.enriched = updated
        .iter()
        .zip(&catalog)
        .filter(|(new, old)| new.is_scored() && !old.is_scored())
        .map(|(new, _)| new.clone())
        .collect();
    report.backup = store::save_catalog_with_backup(&paths.catalog, &updated, now)?;
    Ok(report)
}

/// Scores unscored entries through the model. With `new_only`, entries that
/// carry an old enrichment timestamp are left alone too.
pub async fn run_assisted_enrichment<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
    new_only: bool,
    cancel: &CancelToken,
) -> Result<EnrichmentReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let mut catalog = store::load_catalog(&paths.catalog)?;
    let pending: Vec<CatalogEntry> = catalog
        .iter()
        .filter(|e| !e.is_scored() && !(new_only && e.enriched_at().is_some()))
        .cloned()
        .collect();

    let mut report = EnrichmentReport {
        loaded: catalog.len(),
        candidates: pending.len(),
        ..Default::default()
    };
    if pending.is_empty() {
        info!("[ENRICH] No tools need enrichment");
        return Ok(report);
    }
    info!(pending = pending.len(), new_only, "[ENRICH] Starting assisted enrichment");

    let batch = BatchOptions {
        group_size: config.enrichment.group_size,
        group_delay: config.enrichment.group_delay(),
    };
    let outcome = enrich_batch(
        generator,
        templates.get(TemplateKind::Enrichment),
        &pending,
        &catalog,
        &scoring_options(&config.model),
        &batch,
        cancel,
    )
    .await;

    report.failed = outcome
        .failed
        .iter()
        .map(|f| format!("{} ({})", f.name, f.error))
        .collect();
    report.cancelled = outcome.cancelled;
    if !outcome.enriched.is_empty() {
        merge_by_id(&mut catalog, outcome.enriched.clone());
        report.backup = store::save_catalog_with_backup(&paths.catalog, &catalog, Utc::now())?;
    }
    report.enriched = outcome.enriched;
    Ok(report)
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub accepted: Vec<CatalogEntry>,
    pub rejected: usize,
    pub per_category: BTreeMap<String, usize>,
    pub backup: Option<PathBuf>,
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Discovered {} new tools ({} candidates rejected)",
            self.accepted.len(),
            self.rejected
        )?;
        for e in &self.accepted {
            writeln!(f, "   #{} {} [{}] {}", e.id, e.name, e.category, e.price_range)?;
        }
        for (category, count) in &self.per_category {
            writeln!(f, "   {category}: {count}")?;
        }
        if let Some(backup) = &self.backup {
            write!(f, "Backup saved to: {}", backup.display())?;
        }
        Ok(())
    }
}

pub async fn run_discovery<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
    now: DateTime<Utc>,
) -> Result<DiscoveryReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let mut catalog = store::load_catalog(&paths.catalog)?;
    let outcome = discover(
        generator,
        templates.get(TemplateKind::Discovery),
        &catalog,
        &discovery_options(&config.model),
        now,
    )
    .await?;

    let mut report = DiscoveryReport {
        rejected: outcome.rejected.len(),
        per_category: outcome
            .by_category()
            .into_iter()
            .map(|(c, n)| (c.to_string(), n))
            .collect(),
        ..Default::default()
    };
    if outcome.accepted.is_empty() {
        warn!("[DISCOVER] No valid new tools in the reply");
        return Ok(report);
    }
    catalog.extend(outcome.accepted.iter().cloned());
    report.backup = store::save_catalog_with_backup(&paths.catalog, &catalog, now)?;
    report.accepted = outcome.accepted;
    Ok(report)
}

#[derive(Debug, Default, PartialEq)]
pub struct IdeasReport {
    pub proposed: usize,
    pub added: usize,
    pub pending: usize,
}

impl fmt::Display for IdeasReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Comparison ideas: {} proposed, {} added, {} pending in queue",
            self.proposed, self.added, self.pending
        )
    }
}

pub async fn run_idea_generation<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
    now: DateTime<Utc>,
) -> Result<IdeasReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let catalog = store::load_catalog(&paths.catalog)?;
    let mut queue: ContentQueue<ComparisonIdea> = store::read_json_or_default(&paths.content_queue)?;

    let ideas = generate_ideas(
        generator,
        templates.get(TemplateKind::ComparisonIdeas),
        &catalog,
        &ideas_options(&config.model),
        now,
    )
    .await?;
    let proposed = ideas.len();
    let added = if ideas.is_empty() {
        0
    } else {
        queue.enqueue(ideas, now)
    };
    if added > 0 {
        store::write_json(&paths.content_queue, &queue)?;
    }
    Ok(IdeasReport {
        proposed,
        added,
        pending: queue.pending_count(),
    })
}

#[derive(Debug, Default)]
pub struct ArticleReport {
    pub written: Vec<(String, PathBuf)>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub remaining: usize,
}

impl fmt::Display for ArticleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Articles written: {}", self.written.len())?;
        for (title, path) in &self.written {
            writeln!(f, "   {title} -> {}", path.display())?;
        }
        for title in &self.skipped {
            writeln!(f, "   skipped (no matching tools): {title}")?;
        }
        for title in &self.failed {
            writeln!(f, "   failed: {title}")?;
        }
        write!(f, "Remaining in queue: {}", self.remaining)
    }
}

pub async fn run_article_generation<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
) -> Result<ArticleReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let catalog = store::load_catalog(&paths.catalog)?;
    let mut queue: ContentQueue<ComparisonIdea> = store::read_json_or_default(&paths.content_queue)?;
    let mut index: ArticleIndex = store::read_json_or_default(&paths.content_index)?;

    if queue.pending_count() == 0 {
        info!("[ARTICLE] No pending ideas in queue");
        return Ok(ArticleReport::default());
    }

    let generator = ArticleGenerator {
        generator,
        template: templates.get(TemplateKind::Comparison),
        options: article_options(&config.model),
        articles_dir: &paths.articles_dir,
    };
    let outcomes = generator
        .run_batch(
            &mut queue,
            &mut index,
            &catalog,
            config.articles.per_run,
            config.articles.pause(),
        )
        .await;

    let mut report = ArticleReport::default();
    for outcome in outcomes {
        match outcome {
            ArticleOutcome::Persisted { title, path, .. } => report.written.push((title, path)),
            ArticleOutcome::Skipped { title } => report.skipped.push(title),
            ArticleOutcome::Failed { title, error } => report.failed.push(format!("{title} ({error})")),
        }
    }
    if !report.written.is_empty() {
        store::write_json(&paths.content_index, &index)?;
        store::write_json(&paths.content_queue, &queue)?;
    }
    report.remaining = queue.pending_count();
    Ok(report)
}

#[derive(Debug, Default)]
pub struct StackReport {
    pub published: Vec<(u32, String, usize)>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub total_stacks: usize,
    pub remaining: usize,
}

impl fmt::Display for StackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stacks generated: {}", self.published.len())?;
        for (id, name, tools) in &self.published {
            writeln!(f, "   #{id} {name} ({tools} tools)")?;
        }
        for name in &self.skipped {
            writeln!(f, "   skipped: {name}")?;
        }
        for name in &self.failed {
            writeln!(f, "   failed: {name}")?;
        }
        writeln!(f, "Total stacks: {}", self.total_stacks)?;
        write!(f, "Remaining in queue: {}", self.remaining)
    }
}

pub async fn run_stack_generation<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
) -> Result<StackReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let catalog = store::load_catalog(&paths.catalog)?;
    let mut stacks: Vec<TechStack> = store::read_json_or_default(&paths.stacks)?;
    let mut queue: ContentQueue<StackIdea> = store::read_json_or_default(&paths.stack_queue)?;

    let mut report = StackReport {
        total_stacks: stacks.len(),
        ..Default::default()
    };
    if queue.pending_count() == 0 {
        info!("[STACKS] No pending stacks in queue");
        return Ok(report);
    }

    let generator = StackGenerator {
        generator,
        template: templates.get(TemplateKind::Stack),
        options: stack_options(&config.model),
    };
    let outcomes = generator
        .run_batch(
            &mut queue,
            &mut stacks,
            &catalog,
            config.stacks.per_run,
            config.stacks.pause(),
        )
        .await;
    for outcome in outcomes {
        match outcome {
            StackOutcome::Published { stack_name, id, tools } => {
                report.published.push((id, stack_name, tools))
            }
            StackOutcome::Skipped { stack_name, reason } => {
                report.skipped.push(format!("{stack_name} ({reason})"))
            }
            StackOutcome::Failed { stack_name, error } => {
                report.failed.push(format!("{stack_name} ({error})"))
            }
        }
    }

    store::write_json(&paths.stacks, &stacks)?;
    store::write_json(&paths.stack_queue, &queue)?;
    report.total_stacks = stacks.len();
    report.remaining = queue.pending_count();
    Ok(report)
}

#[derive(Debug)]
pub struct NewsletterReport {
    pub newsletter: Newsletter,
    pub files: NewsletterFiles,
}

impl fmt::Display for NewsletterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subject: {}", self.newsletter.subject)?;
        writeln!(f, "Files created:")?;
        writeln!(f, "   {} (full output)", self.files.json.display())?;
        writeln!(f, "   {} (ready to send)", self.files.html.display())?;
        writeln!(f, "   {} (markdown source)", self.files.markdown.display())?;
        let stats = &self.newsletter.stats;
        write!(
            f,
            "New tools featured: {}, featured tools: {}, total tools: {}",
            stats.new_tools, stats.featured_tools, stats.total_tools
        )
    }
}

pub async fn run_newsletter_generation<G>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
    now: DateTime<Utc>,
) -> Result<NewsletterReport, PipelineError>
where
    G: TextGenerator + ?Sized,
{
    let paths = config.paths();
    let catalog = store::load_catalog(&paths.catalog)?;
    let index: ArticleIndex = store::read_json_or_default(&paths.content_index)?;
    let comparisons: Vec<FeaturedComparison> = store::read_json_or_default(&paths.comparisons)?;
    let newsletter = generate_newsletter(
        generator,
        templates,
        &catalog,
        &index,
        &comparisons,
        &config.model,
        now,
    )
    .await?;
    let files = write_outputs(&paths.newsletter_dir, &newsletter)?;
    Ok(NewsletterReport { newsletter, files })
}

/// Recipients and lists for a send; secrets stay with the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub list_ids: Vec<u64>,
    pub test_emails: Vec<String>,
    pub send_at: Option<String>,
}

#[derive(Debug)]
pub struct SendReport {
    pub generated: NewsletterReport,
    pub campaign: Campaign,
    pub delivery: Delivery,
}

impl fmt::Display for SendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.generated)?;
        writeln!(f, "Newsletter sent successfully!")?;
        writeln!(f, "   Campaign ID: {}", self.campaign.id)?;
        writeln!(f, "   Campaign Name: {}", self.campaign.name)?;
        let lists: Vec<String> = self.delivery.list_ids.iter().map(u64::to_string).collect();
        write!(f, "   Lists: {}", lists.join(", "))?;
        if !self.delivery.test_emails.is_empty() {
            write!(f, "\n   Test emails sent to: {}", self.delivery.test_emails.join(", "))?;
        }
        Ok(())
    }
}

/// Generates, writes, validates and sends this week's newsletter.
pub async fn run_newsletter_send<G, T>(
    config: &PipelineConfig,
    templates: &TemplateSet,
    generator: &G,
    client: &MailingClient<T>,
    delivery: Delivery,
    now: DateTime<Utc>,
) -> Result<SendReport, PipelineError>
where
    G: TextGenerator + ?Sized,
    T: MailTransport,
{
    let generated = run_newsletter_generation(config, templates, generator, now).await?;
    generated.newsletter.validate_for_send()?;

    let send = SendRequest {
        name: format!("Weekly Newsletter - {}", now.format("%Y-%m-%d")),
        subject: generated.newsletter.subject.clone(),
        html: generated.newsletter.html.clone(),
        list_ids: delivery.list_ids.clone(),
        send_at: delivery.send_at.clone(),
        test_emails: delivery.test_emails.clone(),
    };
    let campaign = client.send_newsletter(&send).await?;
    Ok(SendReport {
        generated,
        campaign,
        delivery,
    })
}
