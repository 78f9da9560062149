use crate::history::DEFAULT_MAX_ENTRIES;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 10;

#[derive(Parser, Debug)]
#[clap(name = "classifier-history", version, about)]
pub struct Cli {
    /// Path to configuration file
    #[clap(long, default_value = "./config.toml")]
    pub config: PathBuf,

    /// Override prediction history file
    #[clap(long)]
    pub history_file: Option<PathBuf>,

    /// Override inference server URL
    #[clap(long)]
    pub inference_url: Option<String>,

    /// Override log level (error, warn, info, debug, trace)
    #[clap(long)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a single image and record the result
    Classify {
        file: PathBuf,
        /// Number of predictions to return (1-10)
        #[clap(long)]
        top_k: Option<usize>,
        /// Print the raw response as JSON
        #[clap(long)]
        json: bool,
    },
    /// Classify several images in one request
    Batch {
        #[clap(required = true)]
        files: Vec<PathBuf>,
        #[clap(long)]
        top_k: Option<usize>,
        #[clap(long)]
        json: bool,
    },
    /// Inspect or clear the prediction history
    History {
        #[clap(subcommand)]
        action: HistoryAction,
    },
    /// Check that the inference server is reachable
    Health,
    /// Show supported formats, limits and configured endpoints
    Info {
        #[clap(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Show the most recent entries, newest first
    Recent {
        #[clap(long, default_value_t = 50)]
        limit: usize,
        #[clap(long)]
        json: bool,
    },
    /// Show entries recorded on a given day (YYYY-MM-DD)
    Date {
        date: String,
        #[clap(long)]
        json: bool,
    },
    /// Show aggregate statistics
    Stats {
        #[clap(long)]
        json: bool,
    },
    /// Delete every entry
    Clear {
        /// Confirm the deletion
        #[clap(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history_file: PathBuf,
    pub max_history_entries: usize,
    pub inference_url: String,
    pub health_url: Option<String>,
    pub top_k: usize,
    pub max_file_size: u64,
    pub max_batch_size: usize,
    pub client_label: String,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_file: PathBuf::from("prediction_history.json"),
            max_history_entries: DEFAULT_MAX_ENTRIES,
            inference_url: "http://127.0.0.1:8000/predict".to_string(),
            health_url: None,
            top_k: DEFAULT_TOP_K,
            max_file_size: 16 * 1024 * 1024,
            max_batch_size: 10,
            client_label: "cli-user".to_string(),
            request_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Requested top-k, falling back to the default when out of range.
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        let top_k = requested.unwrap_or(self.top_k);
        if (1..=MAX_TOP_K).contains(&top_k) {
            top_k
        } else {
            DEFAULT_TOP_K
        }
    }

    /// Health endpoint: explicit `health_url`, or the inference URL with its
    /// last path segment replaced by `health`.
    pub fn health_endpoint(&self) -> String {
        if let Some(ref url) = self.health_url {
            return url.clone();
        }

        let base = self.inference_url.split('?').next().unwrap_or_default();
        match base.rsplit_once('/') {
            Some((prefix, _)) if !prefix.ends_with('/') => format!("{}/health", prefix),
            _ => format!("{}/health", base.trim_end_matches('/')),
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        let config_content = fs::read_to_string(&cli.config)
            .with_context(|| format!("Failed to read config file: {:?}", cli.config))?;

        toml::from_str(&config_content).context("Failed to parse config file")?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(ref history_file) = cli.history_file {
        config.history_file = history_file.clone();
    }

    if let Some(ref inference_url) = cli.inference_url {
        config.inference_url = inference_url.clone();
    }

    if let Some(ref log_level) = cli.log_level {
        config.log_level = log_level.clone();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            history_file = "/var/lib/classifier/history.json"
            top_k = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.history_file, PathBuf::from("/var/lib/classifier/history.json"));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_history_entries, 1000);
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.client_label, "cli-user");
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "inference_url = \"http://model:9000/predict\"\n").unwrap();

        let cli = Cli::parse_from([
            "classifier-history",
            "--config",
            config_path.to_str().unwrap(),
            "--history-file",
            "other.json",
            "health",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.inference_url, "http://model:9000/predict");
        assert_eq!(config.history_file, PathBuf::from("other.json"));
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let cli = Cli::parse_from([
            "classifier-history",
            "--config",
            "/nonexistent/config.toml",
            "history",
            "stats",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.history_file, PathBuf::from("prediction_history.json"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "top_k = \"five\"\n").unwrap();

        let cli = Cli::parse_from([
            "classifier-history",
            "--config",
            config_path.to_str().unwrap(),
            "health",
        ]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_effective_top_k() {
        let config = Config::default();
        assert_eq!(config.effective_top_k(None), 5);
        assert_eq!(config.effective_top_k(Some(3)), 3);
        assert_eq!(config.effective_top_k(Some(0)), 5);
        assert_eq!(config.effective_top_k(Some(11)), 5);
    }

    #[test]
    fn test_health_endpoint() {
        let mut config = Config::default();
        assert_eq!(config.health_endpoint(), "http://127.0.0.1:8000/health");

        config.inference_url = "http://127.0.0.1:8000/api/classify?model=a".to_string();
        assert_eq!(config.health_endpoint(), "http://127.0.0.1:8000/api/health");

        config.health_url = Some("http://probe/healthz".to_string());
        assert_eq!(config.health_endpoint(), "http://probe/healthz");
    }
}
