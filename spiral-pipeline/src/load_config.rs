/// `load_config` module: reads the optional YAML settings file and the secrets
/// the pipeline needs from the environment.
///
/// Settings (data root, model, batch sizes) live in YAML and map straight onto
/// [`PipelineConfig`]. Secrets (the model API key, mailing-list credentials)
/// are only ever read from environment variables, which `main` may have filled
/// from a `.env` file.
///
/// # Errors
/// Everything here returns `anyhow::Error` with the file path or variable name
/// in the message; these surface unchanged at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use spiral_pipeline_core::config::PipelineConfig;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const LISTMONK_URL: &str = "LISTMONK_URL";
pub const LISTMONK_USER: &str = "LISTMONK_USER";
pub const LISTMONK_PASSWORD: &str = "LISTMONK_PASSWORD";
pub const LISTMONK_LIST_IDS: &str = "LISTMONK_LIST_IDS";
pub const TEST_EMAILS: &str = "TEST_EMAILS";

/// Loads settings from `path`, or the defaults when no file is given.
/// `data_root`, when set, wins over the file.
pub fn load_config(path: Option<&Path>, data_root: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            info!("No config file given, using defaults");
            PipelineConfig::default()
        }
    };
    if let Some(root) = data_root {
        config.data_root = root.to_path_buf();
    }
    config.trace_loaded();
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<PipelineConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;
    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(PipelineConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })
}

fn required_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(variable = name, "Required environment variable missing");
            Err(anyhow!("{name} environment variable is required"))
        }
    }
}

pub fn anthropic_api_key() -> Result<String> {
    required_var(ANTHROPIC_API_KEY)
}

/// Connection and delivery settings for the mailing-list service.
#[derive(Debug, Clone, PartialEq)]
pub struct MailingSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub list_ids: Vec<u64>,
    pub test_emails: Vec<String>,
}

pub fn mailing_settings() -> Result<MailingSettings> {
    let base_url = required_var(LISTMONK_URL)?;
    let username = required_var(LISTMONK_USER)?;
    let password = required_var(LISTMONK_PASSWORD)?;
    let list_ids = match env::var(LISTMONK_LIST_IDS) {
        Ok(raw) if !raw.trim().is_empty() => parse_list_ids(&raw)?,
        _ => vec![1],
    };
    let test_emails = env::var(TEST_EMAILS)
        .map(|raw| parse_emails(&raw))
        .unwrap_or_default();
    info!(
        base_url = %base_url,
        lists = ?list_ids,
        test_recipients = test_emails.len(),
        "Loaded mailing settings from environment"
    );
    Ok(MailingSettings {
        base_url,
        username,
        password,
        list_ids,
        test_emails,
    })
}

/// `"1, 2,3"` -> `[1, 2, 3]`.
pub fn parse_list_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .with_context(|| format!("{LISTMONK_LIST_IDS} contains a non-numeric id: {s:?}"))
        })
        .collect()
}

pub fn parse_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
