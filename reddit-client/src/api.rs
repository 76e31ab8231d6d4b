use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use salesflow_core::{normalize_reddit_url, CandidatePost, CoreError, LeadSource, RedditApiError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const REDDIT_OAUTH_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_PUBLIC_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
}

impl RedditPostData {
    /// Converts a listing entry into a candidate, dropping it when the
    /// permalink is not a canonical post URL.
    pub fn into_candidate(self) -> Option<CandidatePost> {
        let url = normalize_reddit_url(&self.permalink)?;
        let content = if self.selftext.trim().is_empty() {
            self.title.clone()
        } else {
            self.selftext
        };
        let author_url = if self.author.is_empty() || self.author == "[deleted]" {
            None
        } else {
            Some(format!("https://www.reddit.com/user/{}", self.author))
        };

        Some(CandidatePost {
            source: LeadSource::Reddit,
            url,
            source_name: format!("r/{}", self.subreddit),
            title: self.title,
            content,
            author_url,
            engagement: None,
            created_at: DateTime::<Utc>::from_timestamp(self.created_utc as i64, 0),
        })
    }
}

/// Parameters of one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub time_window: String,
    pub limit: u32,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    base_url: String,
    user_agent: String,
    json_suffix: bool,
}

impl RedditApiClient {
    /// Client for `oauth.reddit.com`; every request carries a bearer token.
    pub fn oauth(base_url: &str, user_agent: String) -> Result<Self, CoreError> {
        Self::build(base_url, user_agent, RateLimitConfig::reddit_oauth(), false)
    }

    /// Client for the unauthenticated `*.json` endpoints.
    pub fn public(base_url: &str, user_agent: String) -> Result<Self, CoreError> {
        Self::build(base_url, user_agent, RateLimitConfig::reddit_public(), true)
    }

    fn build(
        base_url: &str,
        user_agent: String,
        rate_config: RateLimitConfig,
        json_suffix: bool,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(rate_config)),
            metrics: Arc::new(MetricsCollector::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
            json_suffix,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn search_endpoint(&self, subreddit: Option<&str>) -> String {
        let suffix = if self.json_suffix { ".json" } else { "" };
        match subreddit {
            Some(name) => format!("/r/{}/search{}", name, suffix),
            None => format!("/search{}", suffix),
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: Option<&str>,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let start_time = Instant::now();

        let waited = self.rate_limiter.acquire_permit().await;
        debug!(%method, endpoint, ?waited, "acquired rate limit permit");

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .header("User-Agent", &self.user_agent)
            .query(query_params);
        if let Some(token) = access_token {
            request_builder = request_builder.bearer_auth(token);
        }

        let outcome = match request_builder.send().await {
            Ok(response) => Self::check_status(response, endpoint),
            Err(e) => {
                error!(%method, endpoint, error = %e, "network error");
                if e.is_timeout() {
                    Err(CoreError::RedditApi(RedditApiError::RequestTimeout))
                } else {
                    Err(CoreError::Network(e))
                }
            }
        };

        let (status_code, error_type) = match &outcome {
            Ok(response) => (Some(response.status().as_u16()), None),
            Err(CoreError::RedditApi(e)) => (None, Some(format!("{:?}", e))),
            Err(_) => (None, Some("network_error".to_string())),
        };
        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: outcome.is_ok(),
                rate_limited: matches!(
                    outcome,
                    Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. }))
                ),
                error_type,
            })
            .await;

        outcome
    }

    fn check_status(response: Response, endpoint: &str) -> Result<Response, CoreError> {
        let status = response.status();
        if status.is_success() {
            debug!(%status, endpoint, "request successful");
            return Ok(response);
        }

        warn!(%status, endpoint, "request failed");
        let error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(60);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => RedditApiError::SubredditNotFound {
                subreddit: endpoint.to_string(),
            },
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("unexpected status {}", code),
            },
        };
        Err(CoreError::RedditApi(error))
    }

    /// One search request, scoped to `subreddit` when given.
    pub async fn search(
        &self,
        access_token: Option<&str>,
        subreddit: Option<&str>,
        params: &SearchParams,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = self.search_endpoint(subreddit);
        let limit = params.limit.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("q", params.query.as_str()),
            ("sort", "new"),
            ("t", params.time_window.as_str()),
            ("limit", limit.as_str()),
            ("type", "link"),
            ("raw_json", "1"),
        ];
        if subreddit.is_some() {
            query.push(("restrict_sr", "1"));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &query)
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!(endpoint = %endpoint, error = %e, "failed to parse search listing");
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("failed to parse search results for {}", endpoint),
            })
        })?;

        info!(
            endpoint = %endpoint,
            results = listing.data.children.len(),
            "reddit search complete"
        );
        Ok(listing)
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

/// Keeps only posts from `requested` (case-insensitive) and converts them.
///
/// Reddit occasionally returns neighbouring subreddits even with
/// `restrict_sr=1`.
pub fn listing_to_candidates(
    listing: RedditListing<RedditPostData>,
    requested: Option<&str>,
) -> Vec<CandidatePost> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| match requested {
            Some(name) => {
                let matches = post.subreddit.eq_ignore_ascii_case(name);
                if !matches {
                    debug!(
                        requested = name,
                        actual = %post.subreddit,
                        "dropping post from another subreddit"
                    );
                }
                matches
            }
            None => true,
        })
        .filter(|post| !post.stickied)
        .filter_map(|post| {
            let permalink = post.permalink.clone();
            let candidate = post.into_candidate();
            if candidate.is_none() {
                debug!(%permalink, "dropping post with invalid permalink");
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_json() -> &'static str {
        r#"{
            "kind": "Listing",
            "data": {
                "after": null,
                "before": null,
                "dist": 3,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "abc123",
                        "title": "Looking for invoicing software",
                        "selftext": "Our spreadsheets are a mess",
                        "author": "owner42",
                        "subreddit": "smallbusiness",
                        "permalink": "/r/smallbusiness/comments/abc123/looking_for_invoicing_software/",
                        "created_utc": 1700000000.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "def456",
                        "title": "Unrelated",
                        "selftext": "",
                        "author": "someone",
                        "subreddit": "Entrepreneur",
                        "permalink": "/r/Entrepreneur/comments/def456/unrelated/",
                        "created_utc": 1700000000.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "ghi789",
                        "title": "Link post",
                        "author": "[deleted]",
                        "subreddit": "SmallBusiness",
                        "permalink": "/r/SmallBusiness/comments/ghi789/link_post/"
                    }}
                ]
            }
        }"#
    }

    #[test]
    fn test_listing_filters_to_requested_subreddit() {
        let listing: RedditListing<RedditPostData> = serde_json::from_str(listing_json()).unwrap();
        let candidates = listing_to_candidates(listing, Some("smallbusiness"));

        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].url,
            "https://www.reddit.com/r/smallbusiness/comments/abc123/looking_for_invoicing_software/"
        );
        assert_eq!(candidates[0].source_name, "r/smallbusiness");
        assert_eq!(
            candidates[0].author_url.as_deref(),
            Some("https://www.reddit.com/user/owner42")
        );
        assert!(candidates[0].created_at.is_some());
        // Link posts fall back to the title as content
        assert_eq!(candidates[1].content, "Link post");
        assert_eq!(candidates[1].author_url, None);
    }

    #[test]
    fn test_global_listing_keeps_all_subreddits() {
        let listing: RedditListing<RedditPostData> = serde_json::from_str(listing_json()).unwrap();
        assert_eq!(listing_to_candidates(listing, None).len(), 3);
    }

    #[test]
    fn test_invalid_permalink_is_dropped() {
        let post = RedditPostData {
            id: "x".to_string(),
            title: "t".to_string(),
            selftext: "s".to_string(),
            author: "a".to_string(),
            subreddit: "test".to_string(),
            permalink: "/r/test/".to_string(),
            url: None,
            created_utc: 0.0,
            score: 0,
            num_comments: 0,
            over_18: false,
            stickied: false,
        };
        assert!(post.into_candidate().is_none());
    }

    #[test]
    fn test_search_endpoints() {
        let oauth = RedditApiClient::oauth(REDDIT_OAUTH_BASE, "ua/1.0".to_string()).unwrap();
        assert_eq!(oauth.search_endpoint(Some("rust")), "/r/rust/search");
        assert_eq!(oauth.search_endpoint(None), "/search");

        let public = RedditApiClient::public(REDDIT_PUBLIC_BASE, "ua/1.0".to_string()).unwrap();
        assert_eq!(public.search_endpoint(Some("rust")), "/r/rust/search.json");
        assert_eq!(public.search_endpoint(None), "/search.json");
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = RedditApiClient::oauth(REDDIT_OAUTH_BASE, "test-user-agent/1.0".to_string())
            .unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");

        let status = client.get_rate_limit_status().await;
        assert!(status.available_tokens > 0);

        let metrics = client.get_metrics().await;
        assert_eq!(metrics.total_requests, 0);
    }
}
