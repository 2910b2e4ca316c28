//! News sources feeding the ingestion pipeline

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NewsConfig;
use crate::error::{Error, Result};

const FETCH_TIMEOUT_SECS: u64 = 30;

/// A raw article as delivered by a source, before analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArticle {
    pub title: String,
    pub url: String,
    /// Text handed to the analyzer
    pub text: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch at most `max` articles.
    async fn fetch(&self, max: usize) -> Result<Vec<SourceArticle>>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    #[serde(default)]
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GNewsArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    published_at: Option<String>,
}

impl GNewsArticle {
    fn into_source(self) -> Option<SourceArticle> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return None;
        }

        let text = [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.content.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

        Some(SourceArticle {
            title: self.title.trim().to_string(),
            url,
            text,
            published_at: self.published_at,
        })
    }
}

/// GNews top-headlines client
pub struct GNewsSource {
    client: Client,
    endpoint: String,
    category: String,
    language: String,
    api_key: String,
}

impl GNewsSource {
    pub fn new(config: &NewsConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("GNews API key must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            category: config.category.clone(),
            language: config.language.clone(),
            api_key,
        })
    }

    /// Build from config, reading `GNEWS_API_KEY` from the environment.
    pub fn from_config(config: &NewsConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| Error::ConfigError("GNEWS_API_KEY is not set".to_string()))?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl ArticleSource for GNewsSource {
    async fn fetch(&self, max: usize) -> Result<Vec<SourceArticle>> {
        let max_param = max.to_string();
        info!(category = %self.category, max, "Fetching headlines");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("category", self.category.as_str()),
                ("lang", self.language.as_str()),
                ("max", max_param.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "News API returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: GNewsResponse = response.json().await?;
        let articles: Vec<SourceArticle> = body
            .articles
            .into_iter()
            .filter_map(GNewsArticle::into_source)
            .take(max)
            .collect();

        debug!(count = articles.len(), "Fetched headlines");
        Ok(articles)
    }

    fn name(&self) -> &str {
        "gnews"
    }
}

/// A fixed list of articles, e.g. replayed from a JSON file
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    articles: Vec<SourceArticle>,
}

impl StaticSource {
    pub fn new(articles: Vec<SourceArticle>) -> Self {
        Self { articles }
    }

    /// Load a JSON array of articles.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let articles: Vec<SourceArticle> = serde_json::from_str(&contents).map_err(|e| {
            Error::InvalidInput(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Self::new(articles))
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

#[async_trait]
impl ArticleSource for StaticSource {
    async fn fetch(&self, max: usize) -> Result<Vec<SourceArticle>> {
        Ok(self.articles.iter().take(max).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
