pub mod api;
pub mod auth;
pub mod metrics;
pub mod rate_limiter;

#[cfg(test)]
mod tests;

pub use api::{
    listing_to_candidates, RedditApiClient, RedditListing, RedditPostData, SearchParams,
    REDDIT_OAUTH_BASE, REDDIT_PUBLIC_BASE,
};
pub use auth::{AuthState, PasswordAuthenticator, RedditCredentials, RedditToken};

use salesflow_core::{
    dedup_by_url, CandidatePost, ConfigError, CoreError, RedditApiError, RedditConfig,
    SourceQuery,
};
use tracing::{debug, info, warn};

/// Page sizes for the two kinds of search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub per_subreddit: u32,
    pub global: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            per_subreddit: 25,
            global: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    OAuth,
    Public,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::OAuth => "reddit_oauth",
            AccessMode::Public => "reddit_public",
        }
    }
}

/// Reddit search client, either authenticated through the password grant
/// or against the public JSON endpoints.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    auth: Option<PasswordAuthenticator>,
    limits: SearchLimits,
}

impl RedditClient {
    pub fn oauth(config: &RedditConfig, limits: SearchLimits) -> Result<Self, CoreError> {
        let credentials = RedditCredentials::from_config(config).ok_or_else(|| {
            CoreError::Config(ConfigError::MissingField {
                field: "reddit.client_secret/username/password".to_string(),
            })
        })?;
        let api = RedditApiClient::oauth(&config.oauth_base_url, credentials.user_agent.clone())?;
        let auth = PasswordAuthenticator::new(credentials)?;

        Ok(Self {
            api,
            auth: Some(auth),
            limits,
        })
    }

    pub fn public(config: &RedditConfig, limits: SearchLimits) -> Result<Self, CoreError> {
        let api = RedditApiClient::public(&config.public_base_url, config.user_agent())?;
        Ok(Self {
            api,
            auth: None,
            limits,
        })
    }

    pub fn mode(&self) -> AccessMode {
        if self.auth.is_some() {
            AccessMode::OAuth
        } else {
            AccessMode::Public
        }
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    pub async fn auth_state(&self) -> Option<AuthState> {
        match &self.auth {
            Some(auth) => Some(auth.auth_state().await),
            None => None,
        }
    }

    /// Runs the query against every target subreddit in turn, or once
    /// globally when there are none.
    ///
    /// A failing subreddit does not abort the others; the run only fails
    /// when every request failed.
    pub async fn search(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        let mode = self.mode().as_str();

        if query.subreddits.is_empty() {
            let params = self.params(query, self.limits.global);
            let posts = self.search_scope(None, &params).await?;
            info!(mode, results = posts.len(), "global reddit search finished");
            return Ok(dedup_by_url(posts));
        }

        let params = self.params(query, self.limits.per_subreddit);
        let mut posts = Vec::new();
        let mut first_error = None;
        let mut succeeded = 0usize;

        // Sequential on purpose: the upstream limit is per client.
        for subreddit in &query.subreddits {
            match self.search_scope(Some(subreddit), &params).await {
                Ok(found) => {
                    debug!(mode, subreddit = %subreddit, results = found.len(), "subreddit searched");
                    succeeded += 1;
                    posts.extend(found);
                }
                Err(e) => {
                    warn!(mode, subreddit = %subreddit, error = %e, "subreddit search failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        let posts = dedup_by_url(posts);
        info!(
            mode,
            subreddits = query.subreddits.len(),
            results = posts.len(),
            "reddit search finished"
        );
        Ok(posts)
    }

    fn params(&self, query: &SourceQuery, limit: u32) -> SearchParams {
        SearchParams {
            query: query.query.clone(),
            time_window: query.time_window.token().to_string(),
            limit,
        }
    }

    async fn search_scope(
        &self,
        subreddit: Option<&str>,
        params: &SearchParams,
    ) -> Result<Vec<CandidatePost>, CoreError> {
        let listing = match &self.auth {
            None => self.api.search(None, subreddit, params).await?,
            Some(auth) => {
                let token = auth.access_token().await?;
                match self.api.search(Some(&token), subreddit, params).await {
                    Err(CoreError::RedditApi(RedditApiError::InvalidToken)) => {
                        debug!("reddit rejected the cached token, refreshing once");
                        auth.invalidate().await;
                        let token = auth.access_token().await?;
                        self.api.search(Some(&token), subreddit, params).await?
                    }
                    other => other?,
                }
            }
        };

        Ok(listing_to_candidates(listing, subreddit))
    }
}
