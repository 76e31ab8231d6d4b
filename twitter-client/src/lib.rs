pub mod payload;

pub use payload::{ProxySearchRequest, RecentSearchResponse, Tweet, TwitterUser};

use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use salesflow_core::{
    dedup_by_url, CandidatePost, ConfigError, CoreError, SourceQuery, TwitterApiError,
    TwitterConfig,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recent search only accepts page sizes in this range.
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

/// Client for the backend function that proxies Twitter recent search.
///
/// The Twitter bearer token never leaves the proxy; `proxy_token` only
/// authenticates us to the proxy itself.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    http_client: Client,
    proxy_url: String,
    proxy_token: Option<String>,
    max_results: u32,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig, max_results: u32) -> Result<Self, CoreError> {
        let proxy_url = config
            .proxy_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                CoreError::Config(ConfigError::MissingField {
                    field: "twitter.proxy_url".to_string(),
                })
            })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            proxy_url,
            proxy_token: config.proxy_token.clone(),
            max_results: max_results.clamp(MIN_RESULTS, MAX_RESULTS),
        })
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn request_body<'a>(&self, query: &'a SourceQuery) -> ProxySearchRequest<'a> {
        let start_time = query.time_window.start_time(Utc::now());
        ProxySearchRequest {
            query: &query.query,
            max_results: self.max_results,
            start_time: start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub async fn search(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        let body = self.request_body(query);
        debug!(query = %body.query, start_time = %body.start_time, "twitter proxy search");

        let mut request = self.http_client.post(&self.proxy_url).json(&body);
        if let Some(token) = &self.proxy_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::TwitterApi(TwitterApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let message = response.text().await.unwrap_or_default();
            let error = status_error(status, retry_after, &message);
            warn!(%status, error = %error, "twitter proxy request failed");
            return Err(CoreError::TwitterApi(error));
        }

        let payload: RecentSearchResponse = response.json().await.map_err(|e| {
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: e.to_string(),
            })
        })?;

        for problem in &payload.errors {
            warn!(
                title = problem.title.as_deref().unwrap_or(""),
                detail = problem.detail.as_deref().unwrap_or(""),
                "twitter reported a partial error"
            );
        }

        let posts = dedup_by_url(payload.into_candidates());
        info!(results = posts.len(), "twitter search finished");
        Ok(posts)
    }
}

pub fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> TwitterApiError {
    match status.as_u16() {
        401 | 403 => TwitterApiError::Unauthorized {
            status_code: status.as_u16(),
        },
        429 => TwitterApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(900),
        },
        code => TwitterApiError::ProxyError {
            status_code: code,
            message: body.chars().take(200).collect(),
        },
    }
}
