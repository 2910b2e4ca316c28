//! `config.toml` settings
//!
//! Settings live in a TOML file; secrets (LLM key, Neo4j password, GNews key)
//! are only ever read from the environment.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// ForeignEye configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseSettings,
    pub graph: GraphConfig,
    pub news: NewsConfig,
    pub pipeline: PipelineConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file; `None` means the platform default location
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

/// Which backend holds the derived graph view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    Neo4j,
    Memory,
    Disabled,
}

impl GraphBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neo4j => "neo4j",
            Self::Memory => "memory",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neo4j" => Some(Self::Neo4j),
            "memory" | "in-memory" => Some(Self::Memory),
            "disabled" | "off" | "none" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub uri: String,
    pub user: String,
    #[serde(skip)]
    pub password: Option<String>,
    pub database: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub endpoint: String,
    pub category: String,
    pub language: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_articles: usize,
    pub min_article_chars: usize,
    pub max_concepts_per_article: usize,
    pub max_prompt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            database: DatabaseSettings::default(),
            graph: GraphConfig::default(),
            news: NewsConfig::default(),
            pipeline: PipelineConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: "anthropic/claude-3-haiku".to_string(),
            fallback_models: vec!["openai/gpt-4o-mini".to_string()],
            temperature: 0.5,
            max_tokens: 3000,
            timeout_secs: 60,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: None,
            database: "neo4j".to_string(),
            max_connections: 8,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://gnews.io/api/v4/top-headlines".to_string(),
            category: "technology".to_string(),
            language: "en".to_string(),
            api_key: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_articles: 3,
            min_article_chars: 100,
            max_concepts_per_article: 5,
            max_prompt_chars: 3000,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_ms: 1000,
            max_attempts: 5,
            backoff_base_secs: 5,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("FOREIGNEYE_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "llm.api_key is not read from config.toml; export FOREIGNEYE_API_KEY instead"
            ));
        }
        Ok(())
    }
}

impl GraphConfig {
    pub fn resolved_password(&self) -> anyhow::Result<Option<String>> {
        if self.password.is_some() {
            return Err(anyhow!(
                "Neo4j passwords must be provided via NEO4J_PASSWORD, not stored in configuration"
            ));
        }
        Ok(env::var("NEO4J_PASSWORD").ok())
    }
}

impl NewsConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "GNews API keys must be provided via GNEWS_API_KEY, not stored in configuration"
            ));
        }
        Ok(env::var("GNEWS_API_KEY").ok())
    }
}

fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", suffix)
    }
}

impl Config {
    /// `$FOREIGNEYE_CONFIG_DIR`, else `<platform config dir>/foreigneye`
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("FOREIGNEYE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("No platform config directory; set FOREIGNEYE_CONFIG_DIR"))?
                .join("foreigneye")
        };
        Ok(dir)
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Defaults when the file is absent
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Cannot write {}", path.display()))?;

        Ok(())
    }

    /// Cross-field checks that serde cannot express
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.worker.concurrency == 0 {
            return Err(anyhow!("worker.concurrency must be at least 1"));
        }
        if self.worker.max_attempts == 0 {
            return Err(anyhow!("worker.max_attempts must be at least 1"));
        }
        if self.pipeline.max_concepts_per_article == 0 {
            return Err(anyhow!("pipeline.max_concepts_per_article must be at least 1"));
        }
        Ok(())
    }

    /// Dotted-key lookup used by `foreigneye config get`
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),

            "graph.backend" => Ok(self.graph.backend.as_str().to_string()),
            "graph.uri" => Ok(self.graph.uri.clone()),
            "graph.user" => Ok(self.graph.user.clone()),
            "graph.database" => Ok(self.graph.database.clone()),
            "graph.max_connections" => Ok(self.graph.max_connections.to_string()),

            "news.endpoint" => Ok(self.news.endpoint.clone()),
            "news.category" => Ok(self.news.category.clone()),
            "news.language" => Ok(self.news.language.clone()),

            "pipeline.max_articles" => Ok(self.pipeline.max_articles.to_string()),
            "pipeline.min_article_chars" => Ok(self.pipeline.min_article_chars.to_string()),
            "pipeline.max_concepts_per_article" => {
                Ok(self.pipeline.max_concepts_per_article.to_string())
            }
            "pipeline.max_prompt_chars" => Ok(self.pipeline.max_prompt_chars.to_string()),

            "worker.concurrency" => Ok(self.worker.concurrency.to_string()),
            "worker.poll_interval_ms" => Ok(self.worker.poll_interval_ms.to_string()),
            "worker.max_attempts" => Ok(self.worker.max_attempts.to_string()),
            "worker.backoff_base_secs" => Ok(self.worker.backoff_base_secs.to_string()),

            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use FOREIGNEYE_API_KEY or OPENROUTER_API_KEY env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `foreigneye config list` to see available keys.",
                key
            )),
        }
    }

    /// Parses and range-checks `value` before assigning it
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("llm.temperature: {:?} is not a number", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("llm.temperature must be within 0.0..=2.0, got {}", temp));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("llm.max_tokens: {:?} is not a number", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("llm.timeout_secs: {:?} is not a number", value))?;
            }

            "database.path" => {
                self.database.path = Some(PathBuf::from(value));
            }
            "database.max_connections" => {
                self.database.max_connections = parse_positive(key, value)?;
            }

            "graph.backend" => {
                self.graph.backend = GraphBackend::parse(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid graph backend: {}. Valid options: neo4j, memory, disabled",
                        value
                    )
                })?;
            }
            "graph.uri" => self.graph.uri = value.to_string(),
            "graph.user" => self.graph.user = value.to_string(),
            "graph.database" => self.graph.database = value.to_string(),
            "graph.max_connections" => {
                self.graph.max_connections = parse_positive(key, value)?;
            }

            "news.endpoint" => self.news.endpoint = value.to_string(),
            "news.category" => self.news.category = value.to_string(),
            "news.language" => self.news.language = value.to_string(),

            "pipeline.max_articles" => {
                self.pipeline.max_articles = parse_positive(key, value)?;
            }
            "pipeline.min_article_chars" => {
                self.pipeline.min_article_chars = value
                    .parse()
                    .with_context(|| format!("Invalid min_article_chars value: {}", value))?;
            }
            "pipeline.max_concepts_per_article" => {
                self.pipeline.max_concepts_per_article = parse_positive(key, value)?;
            }
            "pipeline.max_prompt_chars" => {
                self.pipeline.max_prompt_chars = parse_positive(key, value)?;
            }

            "worker.concurrency" => {
                self.worker.concurrency = parse_positive(key, value)?;
            }
            "worker.poll_interval_ms" => {
                self.worker.poll_interval_ms = parse_positive(key, value)?;
            }
            "worker.max_attempts" => {
                self.worker.max_attempts = parse_positive(key, value)?;
            }
            "worker.backoff_base_secs" => {
                self.worker.backoff_base_secs = value
                    .parse()
                    .with_context(|| format!("Invalid backoff_base_secs value: {}", value))?;
            }

            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "{} is a secret and stays out of config.toml; \
                     use the FOREIGNEYE_API_KEY or OPENROUTER_API_KEY environment variable",
                    key
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `foreigneye config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.api_key",
            "database.path",
            "database.max_connections",
            "graph.backend",
            "graph.uri",
            "graph.user",
            "graph.database",
            "graph.max_connections",
            "news.endpoint",
            "news.category",
            "news.language",
            "pipeline.max_articles",
            "pipeline.min_article_chars",
            "pipeline.max_concepts_per_article",
            "pipeline.max_prompt_chars",
            "worker.concurrency",
            "worker.poll_interval_ms",
            "worker.max_attempts",
            "worker.backoff_base_secs",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Deletes the file so the next load sees defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Cannot remove {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))?;
    if parsed <= T::default() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}
