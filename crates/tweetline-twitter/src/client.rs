//! Search API client implementing [`Fetcher`]

use serde_json::Value;
use tweetline_core::{FetchError, Fetcher, Query, SHARED_RUNTIME, http_client};

use crate::config::ApiSettings;

/// Blocking client for the recent / full-archive tweet search endpoints
#[derive(Debug, Clone)]
pub struct SearchClient {
    api: ApiSettings,
    bearer_token: String,
    archive: bool,
}

impl SearchClient {
    /// Fails when no bearer token is configured or set in the environment
    pub fn new(api: ApiSettings, archive: bool) -> anyhow::Result<Self> {
        let bearer_token = api.resolve_bearer_token().ok_or_else(|| {
            anyhow::anyhow!(
                "No bearer token: set api.bearer_token or {}",
                crate::config::BEARER_TOKEN_ENV
            )
        })?;
        Ok(Self {
            api,
            bearer_token,
            archive,
        })
    }

    pub fn endpoint(&self) -> &str {
        if self.archive {
            &self.api.archive_url
        } else {
            &self.api.recent_url
        }
    }

    /// Search expression: `<topic> lang:<lang> <conditions>`
    pub fn search_expression(&self, query: &Query) -> String {
        let mut expr = format!("{} lang:{}", query.topic.trim(), query.lang);
        let conditions = self.api.conditions.trim();
        if !conditions.is_empty() {
            expr.push(' ');
            expr.push_str(conditions);
        }
        expr
    }

    /// Query-string parameters for one page request
    pub fn query_params(&self, query: &Query, token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", self.search_expression(query)),
            ("max_results", self.api.max_results.to_string()),
        ];
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            params.push(("next_token", token.to_string()));
        }
        for (key, value) in [
            ("tweet.fields", &self.api.tweet_fields),
            ("expansions", &self.api.expansions),
            ("user.fields", &self.api.user_fields),
            ("place.fields", &self.api.place_fields),
        ] {
            if !value.is_empty() {
                params.push((key, value.clone()));
            }
        }
        params
    }
}

impl Fetcher for SearchClient {
    fn fetch(&mut self, query: &Query, token: Option<&str>) -> Result<Value, FetchError> {
        let params = self.query_params(query, token);
        log::debug!("GET {} (token: {})", self.endpoint(), token.unwrap_or("-"));

        let body = SHARED_RUNTIME.handle().block_on(async {
            let resp = http_client()
                .get(self.endpoint())
                .bearer_auth(&self.bearer_token)
                .query(&params)
                .send()
                .await
                .map_err(FetchError::from_reqwest)?;
            let status = resp.status();
            let body = resp.text().await.map_err(FetchError::from_reqwest)?;
            if status.is_success() {
                Ok::<_, FetchError>(body)
            } else {
                Err(FetchError::from_status(status.as_u16(), body))
            }
        })?;

        serde_json::from_str(&body).map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))
    }
}
