/// # spiral-pipeline CLI Interface (Module)
///
/// Command parsing and orchestration for the `spiral-pipeline` binary. Every
/// subcommand maps to one `pipeline::run_*` function in
/// [`spiral-pipeline-core`]; this module only loads settings, builds the real
/// model client and mailing transport, and prints the resulting report.
///
/// ## How To Use
/// - From a shell: `spiral-pipeline --help`.
/// - From tests: build a [`Cli`] and call [`run`].
///
/// [`spiral-pipeline-core`]: ../../spiral_pipeline_core/
use crate::load_config::{anthropic_api_key, load_config, mailing_settings};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use spiral_pipeline_core::cancel::cancel_pair;
use spiral_pipeline_core::config::PipelineConfig;
use spiral_pipeline_core::llm::AnthropicClient;
use spiral_pipeline_core::mailing::{HttpTransport, MailingClient};
use spiral_pipeline_core::pipeline::{self, Delivery};
use spiral_pipeline_core::template::TemplateSet;
use std::path::PathBuf;

/// CLI for the TechieSpiral content pipeline.
#[derive(Parser, Debug)]
#[clap(
    name = "spiral-pipeline",
    version,
    about = "Enrich the tool catalog and generate comparison articles, stacks and newsletters"
)]
pub struct Cli {
    /// Optional YAML settings file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Site root holding src/data, content/ and newsletter-output/
    #[clap(long, global = true)]
    pub data_root: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Score unscored tools with the offline heuristic
    EnrichLocal,
    /// Score unscored tools with the language model
    Enrich {
        /// Skip tools that were enriched before and lost their scores
        #[clap(long)]
        new_only: bool,
    },
    /// Ask the model for new tools and append them to the catalog
    Discover,
    /// Propose comparison ideas from recent and popular tools
    Ideas,
    /// Write comparison articles for pending queue items
    Articles,
    /// Generate curated stacks for pending stack ideas
    Stacks,
    /// Generate this week's newsletter files
    Newsletter,
    /// Generate the newsletter and send it as a campaign
    SendNewsletter {
        /// Schedule instead of sending now (RFC 3339 timestamp)
        #[clap(long)]
        send_at: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::EnrichLocal => "enrich-local",
            Commands::Enrich { .. } => "enrich",
            Commands::Discover => "discover",
            Commands::Ideas => "ideas",
            Commands::Articles => "articles",
            Commands::Stacks => "stacks",
            Commands::Newsletter => "newsletter",
            Commands::SendNewsletter { .. } => "send-newsletter",
        }
    }
}

fn model_client() -> Result<AnthropicClient> {
    let key = anthropic_api_key()?;
    Ok(AnthropicClient::new(key)?)
}

fn templates(config: &PipelineConfig) -> Result<TemplateSet> {
    Ok(TemplateSet::load(config.templates_dir.as_deref())?)
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref(), cli.data_root.as_deref())?;
    let command = cli.command.name();
    tracing::info!(command, "Starting pipeline command");

    let report = match cli.command {
        Commands::EnrichLocal => pipeline::run_local_enrichment(&config, Utc::now())?.to_string(),
        Commands::Enrich { new_only } => {
            let client = model_client()?;
            let templates = templates(&config)?;
            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("[ENRICH] Interrupt received, finishing the current group");
                    handle.cancel();
                }
            });
            pipeline::run_assisted_enrichment(&config, &templates, &client, new_only, &token)
                .await?
                .to_string()
        }
        Commands::Discover => {
            let client = model_client()?;
            pipeline::run_discovery(&config, &templates(&config)?, &client, Utc::now())
                .await?
                .to_string()
        }
        Commands::Ideas => {
            let client = model_client()?;
            pipeline::run_idea_generation(&config, &templates(&config)?, &client, Utc::now())
                .await?
                .to_string()
        }
        Commands::Articles => {
            let client = model_client()?;
            pipeline::run_article_generation(&config, &templates(&config)?, &client)
                .await?
                .to_string()
        }
        Commands::Stacks => {
            let client = model_client()?;
            pipeline::run_stack_generation(&config, &templates(&config)?, &client)
                .await?
                .to_string()
        }
        Commands::Newsletter => {
            let client = model_client()?;
            pipeline::run_newsletter_generation(&config, &templates(&config)?, &client, Utc::now())
                .await?
                .to_string()
        }
        Commands::SendNewsletter { send_at } => {
            let client = model_client()?;
            let mailing = mailing_settings()?;
            let transport = HttpTransport::new(&mailing.username, &mailing.password)?;
            let mail = MailingClient::new(transport, &mailing.base_url);
            let delivery = Delivery {
                list_ids: mailing.list_ids,
                test_emails: mailing.test_emails,
                send_at,
            };
            pipeline::run_newsletter_send(
                &config,
                &templates(&config)?,
                &client,
                &mail,
                delivery,
                Utc::now(),
            )
            .await?
            .to_string()
        }
    };

    tracing::info!(command, "Pipeline command complete");
    println!("{report}");
    Ok(())
}
