//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tweetline_twitter::ApiSettings;

/// Global configuration for tweetline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub api: ApiConfig,
    pub pagination: PaginationConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./data"),
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub recent_url: String,
    pub archive_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub bearer_token: Option<String>,
    pub lang: String,
    pub max_results: u32,
    pub conditions: String,
    pub tweet_fields: String,
    pub expansions: String,
    pub user_fields: String,
    pub place_fields: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let api = ApiSettings::default();
        Self {
            recent_url: api.recent_url,
            archive_url: api.archive_url,
            bearer_token: None,
            lang: "es".to_string(),
            max_results: api.max_results,
            conditions: api.conditions,
            tweet_fields: api.tweet_fields,
            expansions: api.expansions,
            user_fields: api.user_fields,
            place_fields: api.place_fields,
        }
    }
}

impl ApiConfig {
    pub fn settings(&self) -> ApiSettings {
        ApiSettings {
            recent_url: self.recent_url.clone(),
            archive_url: self.archive_url.clone(),
            bearer_token: self.bearer_token.clone(),
            max_results: self.max_results,
            conditions: self.conditions.clone(),
            tweet_fields: self.tweet_fields.clone(),
            expansions: self.expansions.clone(),
            user_fields: self.user_fields.clone(),
            place_fields: self.place_fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub batch_size: usize,
    pub num_batches: usize,
    pub sleep_secs: f64,
    pub chunk_size: Option<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            num_batches: 1,
            sleep_secs: 1.0,
            chunk_size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("./data/ids"),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./tweetline.toml (current directory)
    /// 2. ~/.config/tweetline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("tweetline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "tweetline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.default_dir, PathBuf::from("./data"));
        assert_eq!(config.output.compression_level, 3);
        assert_eq!(config.pagination.batch_size, 1000);
        assert!(config.ledger.enabled);
        assert!(config.api.bearer_token.is_none());
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("TWEETLINE_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${TWEETLINE_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("TWEETLINE_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[output]
default_dir = "/tmp/data"
compression_level = 5

[api]
lang = "pt"
bearer_token = "literal-token"
conditions = "-is:retweet -is:reply"

[pagination]
batch_size = 500
num_batches = 4
sleep_secs = 2.5

[ledger]
enabled = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.output.default_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.output.compression_level, 5);
        assert_eq!(config.api.lang, "pt");
        assert_eq!(config.api.bearer_token.as_deref(), Some("literal-token"));
        assert_eq!(config.api.max_results, 100);
        assert_eq!(config.pagination.batch_size, 500);
        assert_eq!(config.pagination.num_batches, 4);
        assert_eq!(config.pagination.sleep_secs, 2.5);
        assert!(!config.ledger.enabled);
        assert_eq!(config.ledger.dir, PathBuf::from("./data/ids"));

        let settings = config.api.settings();
        assert_eq!(settings.conditions, "-is:retweet -is:reply");
    }
}
