use async_trait::async_trait;
use llm_interface::{GroundedSearch, LlmProvider};
use reddit_client::{RedditClient, SearchLimits};
use salesflow_core::{AppConfig, CandidatePost, CoreError, LeadSource, SourceQuery};
use std::sync::Arc;
use tracing::{debug, info, warn};
use twitter_client::TwitterClient;

/// One way of fetching raw candidates for a source.
#[async_trait]
pub trait SourceStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> LeadSource;

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError>;
}

pub struct RedditStrategy {
    client: RedditClient,
}

impl RedditStrategy {
    pub fn new(client: RedditClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceStrategy for RedditStrategy {
    fn name(&self) -> &str {
        self.client.mode().as_str()
    }

    fn source(&self) -> LeadSource {
        LeadSource::Reddit
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        self.client.search(query).await
    }
}

pub struct TwitterProxyStrategy {
    client: TwitterClient,
}

impl TwitterProxyStrategy {
    pub fn new(client: TwitterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceStrategy for TwitterProxyStrategy {
    fn name(&self) -> &str {
        "twitter_proxy"
    }

    fn source(&self) -> LeadSource {
        LeadSource::Twitter
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        self.client.search(query).await
    }
}

pub struct GroundedStrategy {
    search: GroundedSearch,
    source: LeadSource,
}

impl GroundedStrategy {
    pub fn new(provider: Arc<dyn LlmProvider>, source: LeadSource) -> Self {
        Self {
            search: GroundedSearch::new(provider),
            source,
        }
    }
}

#[async_trait]
impl SourceStrategy for GroundedStrategy {
    fn name(&self) -> &str {
        "llm_grounded"
    }

    fn source(&self) -> LeadSource {
        self.source
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        self.search.search(query).await
    }
}

/// Ordered fallback over the strategies of one source. The first strategy
/// that returns posts wins.
pub struct SourceChain {
    source: LeadSource,
    strategies: Vec<Box<dyn SourceStrategy>>,
    missing_credentials: Option<String>,
}

impl SourceChain {
    pub fn new(source: LeadSource, strategies: Vec<Box<dyn SourceStrategy>>) -> Self {
        Self {
            source,
            strategies,
            missing_credentials: None,
        }
    }

    /// Makes every fetch fail with a configuration error naming `field`.
    pub fn with_missing_credentials(mut self, field: impl Into<String>) -> Self {
        self.missing_credentials = Some(field.into());
        self
    }

    /// OAuth, then the public JSON API, then grounded search.
    pub fn reddit(config: &AppConfig, llm: Option<Arc<dyn LlmProvider>>) -> Result<Self, CoreError> {
        let limits = SearchLimits {
            per_subreddit: config.pipeline.per_subreddit_limit,
            global: config.pipeline.global_search_limit,
        };
        let mut strategies: Vec<Box<dyn SourceStrategy>> = Vec::new();

        if config.reddit.has_oauth_credentials() {
            strategies.push(Box::new(RedditStrategy::new(RedditClient::oauth(
                &config.reddit,
                limits,
            )?)));
        }
        if config.reddit.has_any_credentials() {
            strategies.push(Box::new(RedditStrategy::new(RedditClient::public(
                &config.reddit,
                limits,
            )?)));
        }
        if let Some(provider) = llm {
            strategies.push(Box::new(GroundedStrategy::new(provider, LeadSource::Reddit)));
        }

        let chain = Self::new(LeadSource::Reddit, strategies);
        if config.reddit.has_any_credentials() {
            Ok(chain)
        } else {
            Ok(chain.with_missing_credentials("reddit.client_id"))
        }
    }

    /// Backend proxy, then grounded search.
    pub fn twitter(config: &AppConfig, llm: Option<Arc<dyn LlmProvider>>) -> Result<Self, CoreError> {
        let mut strategies: Vec<Box<dyn SourceStrategy>> = Vec::new();

        if config.twitter.proxy_url.is_some() {
            strategies.push(Box::new(TwitterProxyStrategy::new(TwitterClient::new(
                &config.twitter,
                config.pipeline.twitter_max_results,
            )?)));
        }
        if let Some(provider) = llm {
            strategies.push(Box::new(GroundedStrategy::new(provider, LeadSource::Twitter)));
        }

        Ok(Self::new(LeadSource::Twitter, strategies))
    }

    pub fn source(&self) -> LeadSource {
        self.source
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        if let Some(field) = &self.missing_credentials {
            return Err(CoreError::missing_field(field.clone()));
        }

        let mut last_error = None;
        let mut any_succeeded = false;

        for strategy in &self.strategies {
            if !strategy.is_available() {
                debug!(strategy = strategy.name(), "strategy unavailable, skipping");
                continue;
            }

            match strategy.fetch(query).await {
                Ok(posts) if !posts.is_empty() => {
                    info!(strategy = strategy.name(), results = posts.len(), "source strategy succeeded");
                    return Ok(posts);
                }
                Ok(_) => {
                    debug!(strategy = strategy.name(), "strategy returned nothing, trying next");
                    any_succeeded = true;
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(error) if !any_succeeded => Err(error),
            _ => Ok(Vec::new()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use salesflow_core::{ConfigError, RedditApiError, TimeWindow};
    use std::sync::atomic::Ordering;

    fn query() -> SourceQuery {
        SourceQuery {
            source: LeadSource::Reddit,
            query: "\"crm\"".to_string(),
            time_window: TimeWindow::Day,
            keywords: vec!["crm".to_string()],
            negative_keywords: vec![],
            subreddits: vec![],
        }
    }

    fn forbidden() -> CoreError {
        CoreError::RedditApi(RedditApiError::Forbidden {
            resource: "/search".to_string(),
        })
    }

    #[tokio::test]
    async fn test_first_non_empty_strategy_wins() {
        let failing = FixedStrategy::failing("oauth", LeadSource::Reddit, forbidden);
        let empty = FixedStrategy::ok("public", LeadSource::Reddit, vec![]);
        let grounded = FixedStrategy::ok("grounded", LeadSource::Reddit, vec![reddit_post("a")]);
        let unused = FixedStrategy::ok("unused", LeadSource::Reddit, vec![reddit_post("b")]);
        let unused_calls = unused.calls.clone();

        let chain = SourceChain::new(
            LeadSource::Reddit,
            vec![
                Box::new(failing),
                Box::new(empty),
                Box::new(grounded),
                Box::new(unused),
            ],
        );

        let posts = chain.fetch(&query()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post a");
        assert_eq!(unused_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_strategies_are_skipped() {
        let mut offline = FixedStrategy::ok("offline", LeadSource::Reddit, vec![reddit_post("x")]);
        offline.available = false;
        let offline_calls = offline.calls.clone();
        let online = FixedStrategy::ok("online", LeadSource::Reddit, vec![reddit_post("y")]);

        let chain = SourceChain::new(LeadSource::Reddit, vec![Box::new(offline), Box::new(online)]);
        let posts = chain.fetch(&query()).await.unwrap();

        assert_eq!(posts[0].title, "Post y");
        assert_eq!(offline_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let chain = SourceChain::new(
            LeadSource::Reddit,
            vec![Box::new(FixedStrategy::failing(
                "oauth",
                LeadSource::Reddit,
                forbidden,
            ))],
        );
        assert!(matches!(
            chain.fetch(&query()).await,
            Err(CoreError::RedditApi(RedditApiError::Forbidden { .. }))
        ));
    }

    #[tokio::test]
    async fn test_empty_after_failure_is_not_an_error() {
        let chain = SourceChain::new(
            LeadSource::Reddit,
            vec![
                Box::new(FixedStrategy::failing("oauth", LeadSource::Reddit, forbidden)),
                Box::new(FixedStrategy::ok("public", LeadSource::Reddit, vec![])),
            ],
        );
        assert!(chain.fetch(&query()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_the_run() {
        let chain = SourceChain::reddit(&AppConfig::default(), None).unwrap();
        assert!(matches!(
            chain.fetch(&query()).await,
            Err(CoreError::Config(ConfigError::MissingField { .. }))
        ));
    }

    #[test]
    fn test_chain_order_from_config() {
        let mut config = AppConfig::default();
        config.reddit.client_id = Some("id".to_string());
        config.reddit.client_secret = Some("secret".to_string());
        config.reddit.username = Some("user".to_string());
        config.reddit.password = Some("pass".to_string());
        config.twitter.proxy_url = Some("https://proxy.example/search".to_string());

        let reddit = SourceChain::reddit(&config, None).unwrap();
        assert_eq!(reddit.strategy_names(), vec!["reddit_oauth", "reddit_public"]);

        let twitter = SourceChain::twitter(&config, None).unwrap();
        assert_eq!(twitter.strategy_names(), vec!["twitter_proxy"]);
        assert_eq!(twitter.source(), LeadSource::Twitter);
    }
}
