use crate::{ConfigError, CoreError, MergeSettings, DEFAULT_MAX_RESULTS, DEFAULT_RELEVANCE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub twitter: TwitterConfig,
    pub gemini: GeminiConfig,
    pub pipeline: PipelineConfig,
    pub subscription: SubscriptionConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub token_url: String,
    pub oauth_base_url: String,
    pub public_base_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: None,
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            oauth_base_url: "https://oauth.reddit.com".to_string(),
            public_base_url: "https://www.reddit.com".to_string(),
        }
    }
}

impl RedditConfig {
    /// Everything the password-grant flow needs.
    pub fn has_oauth_credentials(&self) -> bool {
        [&self.client_id, &self.client_secret, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// The public JSON endpoint only needs a client id for the User-Agent.
    pub fn has_any_credentials(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn user_agent(&self) -> String {
        match (&self.user_agent, &self.client_id) {
            (Some(agent), _) if !agent.is_empty() => agent.clone(),
            (_, Some(client_id)) => format!("web:sales-flow:v0.1.0 (by client {})", client_id),
            _ => "web:sales-flow:v0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// Backend function that holds the bearer token and calls recent search.
    pub proxy_url: Option<String>,
    pub proxy_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            proxy_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub fallback_model: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub key_cooldown_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gemini-2.5-flash".to_string(),
            fallback_model: Some("gemini-2.5-flash-lite".to_string()),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
            key_cooldown_secs: 300,
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn key_cooldown(&self) -> Duration {
        Duration::from_secs(self.key_cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub relevance_threshold: u8,
    pub max_results: usize,
    pub high_potential_threshold: u8,
    pub per_subreddit_limit: u32,
    pub global_search_limit: u32,
    pub twitter_max_results: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            high_potential_threshold: 90,
            per_subreddit_limit: 25,
            global_search_limit: 50,
            twitter_max_results: 50,
        }
    }
}

impl PipelineConfig {
    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            relevance_threshold: self.relevance_threshold,
            max_results: self.max_results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.whop.com/api/v2/memberships".to_string(),
            api_key: None,
            timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sales-flow.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the TOML file if present, applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading configuration");
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml_str(&raw)?
            }
            Some(path) => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
                .into())
            }
            None => {
                debug!("no configuration file given, using defaults");
                Self::default()
            }
        };

        config.apply_env_with(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(raw).map_err(ConfigError::from)?;
        Ok(config)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(keys) = get("GEMINI_API_KEYS") {
            self.gemini.api_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        } else if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_keys = vec![key.trim().to_string()];
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.gemini.model = model;
        }

        let reddit = &mut self.reddit;
        for (name, slot) in [
            ("REDDIT_CLIENT_ID", &mut reddit.client_id),
            ("REDDIT_CLIENT_SECRET", &mut reddit.client_secret),
            ("REDDIT_USERNAME", &mut reddit.username),
            ("REDDIT_PASSWORD", &mut reddit.password),
            ("REDDIT_USER_AGENT", &mut reddit.user_agent),
        ] {
            if let Some(value) = get(name) {
                *slot = Some(value);
            }
        }

        if let Some(url) = get("TWITTER_PROXY_URL") {
            self.twitter.proxy_url = Some(url);
        }
        if let Some(token) = get("TWITTER_PROXY_TOKEN") {
            self.twitter.proxy_token = Some(token);
        }
        if let Some(key) = get("WHOP_API_KEY") {
            self.subscription.api_key = Some(key);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let pipeline = &self.pipeline;
        if pipeline.relevance_threshold > 100 {
            return Err(invalid("pipeline.relevance_threshold", pipeline.relevance_threshold));
        }
        if pipeline.high_potential_threshold > 100 {
            return Err(invalid(
                "pipeline.high_potential_threshold",
                pipeline.high_potential_threshold,
            ));
        }
        if pipeline.max_results == 0 {
            return Err(invalid("pipeline.max_results", pipeline.max_results));
        }
        if self.gemini.model.trim().is_empty() {
            return Err(CoreError::missing_field("gemini.model"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> CoreError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
