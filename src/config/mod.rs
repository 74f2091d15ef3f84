mod file_config;

pub use file_config::{AiConfig, ContentStoreConfig, FileConfig};

use crate::ai::{AiClientOptions, CompletionOptions};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub public_base_url: Option<String>,
    pub content_store_url: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Prefix for the status endpoints handed back to clients. Relative paths
    /// are returned when unset.
    pub public_base_url: Option<String>,

    pub content_store: ContentStoreSettings,
    pub ai: AiSettings,
}

#[derive(Debug, Clone)]
pub struct ContentStoreSettings {
    pub base_url: String,
    pub timeout_sec: u64,
}

impl Default for ContentStoreSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout_sec: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_sec: u64,
    pub max_document_chars: usize,
    pub max_tags: usize,
}

impl Default for AiSettings {
    fn default() -> Self {
        let client = AiClientOptions::default();
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            temperature: client.completion.temperature,
            timeout_sec: client.completion.timeout.as_secs(),
            max_document_chars: client.max_document_chars,
            max_tags: client.max_tags,
        }
    }
}

impl AiSettings {
    pub fn client_options(&self) -> AiClientOptions {
        AiClientOptions {
            max_document_chars: self.max_document_chars,
            max_tags: self.max_tags,
            completion: CompletionOptions {
                temperature: self.temperature,
                max_tokens: None,
                timeout: Duration::from_secs(self.timeout_sec),
            },
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let public_base_url = file
            .public_base_url
            .or_else(|| cli.public_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());

        let cs_file = file.content_store.unwrap_or_default();
        let cs_defaults = ContentStoreSettings::default();
        let content_store = ContentStoreSettings {
            base_url: cs_file
                .base_url
                .or_else(|| cli.content_store_url.clone())
                .unwrap_or(cs_defaults.base_url),
            timeout_sec: cs_file.timeout_sec.unwrap_or(cs_defaults.timeout_sec),
        };

        let ai_file = file.ai.unwrap_or_default();
        let ai_defaults = AiSettings::default();
        let temperature = ai_file.temperature.unwrap_or(ai_defaults.temperature);
        if !(0.0..=2.0).contains(&temperature) {
            bail!("ai.temperature must be between 0.0 and 2.0, got {}", temperature);
        }
        let ai = AiSettings {
            base_url: ai_file
                .base_url
                .or_else(|| cli.ai_base_url.clone())
                .unwrap_or(ai_defaults.base_url),
            model: ai_file
                .model
                .or_else(|| cli.ai_model.clone())
                .unwrap_or(ai_defaults.model),
            api_key: ai_file.api_key.or(ai_defaults.api_key),
            temperature,
            timeout_sec: ai_file.timeout_sec.unwrap_or(ai_defaults.timeout_sec),
            max_document_chars: ai_file
                .max_document_chars
                .unwrap_or(ai_defaults.max_document_chars),
            max_tags: ai_file.max_tags.unwrap_or(ai_defaults.max_tags),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            public_base_url,
            content_store,
            ai,
        })
    }

    pub fn job_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Headers,
            public_base_url: Some("https://folio.example.org/".to_string()),
            content_store_url: Some("http://content:8090".to_string()),
            ai_base_url: None,
            ai_model: Some("mistral".to_string()),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(
            config.public_base_url.as_deref(),
            Some("https://folio.example.org")
        );
        assert_eq!(config.content_store.base_url, "http://content:8090");
        assert_eq!(config.ai.model, "mistral");
        assert_eq!(config.ai.base_url, AiSettings::default().base_url);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            port: 3001,
            metrics_port: 9091,
            ai_model: Some("cli-model".to_string()),
            ..Default::default()
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            ai: Some(AiConfig {
                model: Some("toml-model".to_string()),
                max_tags: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.ai.model, "toml-model");
        assert_eq!(config.ai.client_options().max_tags, 3);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_rejects_out_of_range_temperature() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            ai: Some(AiConfig {
                temperature: Some(3.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(file_config)).is_err());
    }

    #[test]
    fn test_job_db_path() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.job_db_path(), temp_dir.path().join("jobs.db"));
    }
}
