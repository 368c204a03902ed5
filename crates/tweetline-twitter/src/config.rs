//! Harvest configuration

use std::path::PathBuf;
use std::time::Duration;

use tweetline_core::PaginateOptions;

/// Environment variable consulted when no bearer token is configured
pub const BEARER_TOKEN_ENV: &str = "TWEETLINE_BEARER_TOKEN";

/// Search endpoint settings and requested field sets
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub recent_url: String,
    pub archive_url: String,
    pub bearer_token: Option<String>,
    /// Page size requested upstream (10..=100 recent, 10..=500 archive)
    pub max_results: u32,
    /// Extra search operators appended to every query, e.g. `-is:retweet`
    pub conditions: String,
    pub tweet_fields: String,
    pub expansions: String,
    pub user_fields: String,
    pub place_fields: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            recent_url: "https://api.twitter.com/2/tweets/search/recent".to_string(),
            archive_url: "https://api.twitter.com/2/tweets/search/all".to_string(),
            bearer_token: None,
            max_results: 100,
            conditions: "-is:retweet".to_string(),
            tweet_fields: "id,text,author_id,created_at,geo,lang,public_metrics,conversation_id"
                .to_string(),
            expansions: "author_id,geo.place_id".to_string(),
            user_fields: "id,name,username,location,created_at,public_metrics".to_string(),
            place_fields: "id,full_name,country,country_code,geo,name,place_type".to_string(),
        }
    }
}

impl ApiSettings {
    /// Configured token, else `TWEETLINE_BEARER_TOKEN`
    pub fn resolve_bearer_token(&self) -> Option<String> {
        self.bearer_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(BEARER_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }
}

/// A named search topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Label used in file names
    pub name: String,
    /// Search expression
    pub query: String,
}

impl Topic {
    /// Parse `NAME=QUERY`, or a bare query whose name is derived from it
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (name, query) = match s.split_once('=') {
            Some((name, query)) => (sanitize_name(name), query.trim().to_string()),
            None => (sanitize_name(s), s.trim().to_string()),
        };
        anyhow::ensure!(!query.is_empty(), "Empty search query in topic '{s}'");
        anyhow::ensure!(!name.is_empty(), "Cannot derive a file name from topic '{s}'");
        Ok(Self { name, query })
    }
}

/// Lowercase, with runs of anything but `[a-z0-9]` collapsed to `_`
fn sanitize_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Runtime configuration for one harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub output_dir: PathBuf,
    pub lang: String,
    /// Use the full-archive endpoint instead of recent search
    pub archive: bool,
    pub topics: Vec<Topic>,
    pub api: ApiSettings,
    pub batch_size: usize,
    pub num_batches: usize,
    pub sleep: Duration,
    pub chunk_size: Option<usize>,
    /// Ledger directory; `None` disables cross-session deduplication
    pub ledger_dir: Option<PathBuf>,
    pub zstd_level: i32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            lang: "es".to_string(),
            archive: false,
            topics: Vec::new(),
            api: ApiSettings::default(),
            batch_size: 1000,
            num_batches: 1,
            sleep: Duration::from_secs(1),
            chunk_size: None,
            ledger_dir: Some(PathBuf::from("./data/ids")),
            zstd_level: 3,
        }
    }
}

impl HarvestConfig {
    pub fn paginate_options(&self) -> PaginateOptions {
        PaginateOptions {
            batch_size: self.batch_size,
            num_batches: self.num_batches,
            sleep: self.sleep,
            chunk_size: self.chunk_size,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.topics.is_empty(), "No topics to harvest");
        anyhow::ensure!(!self.lang.trim().is_empty(), "Language must not be empty");
        anyhow::ensure!(
            (1..=22).contains(&self.zstd_level),
            "zstd level must be 1..=22, got {}",
            self.zstd_level
        );
        self.paginate_options().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_with_name() {
        let t = Topic::parse("vaccines=vacuna OR vacunas").unwrap();
        assert_eq!(t.name, "vaccines");
        assert_eq!(t.query, "vacuna OR vacunas");
    }

    #[test]
    fn topic_name_derived() {
        let t = Topic::parse("Vacuna OR #COVID19").unwrap();
        assert_eq!(t.name, "vacuna_or_covid19");
        assert_eq!(t.query, "Vacuna OR #COVID19");
    }

    #[test]
    fn topic_rejects_empty() {
        assert!(Topic::parse("name=").is_err());
        assert!(Topic::parse("   ").is_err());
        assert!(Topic::parse("#=x").is_err());
    }

    #[test]
    fn default_config_needs_topics() {
        let mut config = HarvestConfig::default();
        assert!(config.validate().is_err());
        config.topics.push(Topic::parse("covid").unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn invalid_pagination_rejected() {
        let config = HarvestConfig {
            topics: vec![Topic::parse("covid").unwrap()],
            batch_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn configured_token_wins() {
        let api = ApiSettings {
            bearer_token: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(api.resolve_bearer_token().as_deref(), Some("abc"));
    }
}
