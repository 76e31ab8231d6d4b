//! Twitter API v2 recent-search payload as relayed by the proxy.

use chrono::{DateTime, Utc};
use salesflow_core::{normalize_twitter_url, CandidatePost, Engagement, LeadSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize)]
pub struct ProxySearchRequest<'a> {
    pub query: &'a str,
    pub max_results: u32,
    pub start_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentSearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
    #[serde(default)]
    pub errors: Vec<ApiProblem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<TwitterUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub result_count: u32,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl RecentSearchResponse {
    /// Joins tweets with their authors. Tweets whose author is missing from
    /// `includes.users` cannot be linked and are dropped.
    pub fn into_candidates(self) -> Vec<CandidatePost> {
        let users: HashMap<&str, &str> = self
            .includes
            .users
            .iter()
            .map(|u| (u.id.as_str(), u.username.as_str()))
            .collect();

        self.data
            .iter()
            .filter_map(|tweet| {
                let username = tweet
                    .author_id
                    .as_deref()
                    .and_then(|id| users.get(id).copied());
                match username {
                    Some(username) => tweet_to_candidate(tweet, username),
                    None => {
                        debug!(tweet_id = %tweet.id, "tweet without a known author");
                        None
                    }
                }
            })
            .collect()
    }
}

pub fn tweet_to_candidate(tweet: &Tweet, username: &str) -> Option<CandidatePost> {
    let url = normalize_twitter_url(&format!("https://x.com/{}/status/{}", username, tweet.id))?;
    let text = tweet.text.trim();
    if text.is_empty() {
        return None;
    }

    let engagement = tweet.public_metrics.map(|m| Engagement {
        likes: m.like_count,
        reposts: m.retweet_count + m.quote_count,
        replies: m.reply_count,
    });

    Some(CandidatePost {
        source: LeadSource::Twitter,
        url,
        source_name: format!("@{}", username),
        title: title_from_text(text),
        content: text.to_string(),
        author_url: Some(format!("https://x.com/{}", username)),
        engagement,
        created_at: tweet.created_at,
    })
}

/// First line of the tweet, cut at a character boundary.
fn title_from_text(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text).trim();
    if first_line.chars().count() <= TITLE_CHARS {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(TITLE_CHARS).collect();
    format!("{}...", cut.trim_end())
}
