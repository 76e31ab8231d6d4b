//! Search-grounded discovery, used when a source's own API is unavailable.

use crate::parser::parse_json_array;
use crate::{GenerateRequest, LlmProvider};
use chrono::Utc;
use salesflow_core::{dedup_by_url, normalize_url, CandidatePost, CoreError, LeadSource, SourceQuery};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct GroundedPost {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    source_name: String,
}

#[derive(Clone)]
pub struct GroundedSearch {
    provider: Arc<dyn LlmProvider>,
}

impl GroundedSearch {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn search(&self, query: &SourceQuery) -> Result<Vec<CandidatePost>, CoreError> {
        let request = GenerateRequest::new(build_prompt(query)).grounded();
        let output = self.provider.generate(&request).await?;

        let posts = parse_candidates(query.source, &query.subreddits, &output);
        info!(source = %query.source, results = posts.len(), "grounded search finished");
        Ok(posts)
    }
}

fn build_prompt(query: &SourceQuery) -> String {
    let since = query
        .time_window
        .start_time(Utc::now())
        .format("%Y-%m-%d");

    let (site, permalink_rule) = match query.source {
        LeadSource::Reddit => (
            "reddit.com",
            "Every url must be a post permalink of the form https://www.reddit.com/r/<subreddit>/comments/<id>/<slug>/",
        ),
        LeadSource::Twitter => (
            "x.com",
            "Every url must be a post permalink of the form https://x.com/<username>/status/<id>",
        ),
    };

    let mut prompt = format!(
        "Use Google Search to find public {site} posts published after {since} that mention any of: {keywords}.\n",
        keywords = query.keywords.join(", "),
    );
    if !query.subreddits.is_empty() {
        let scoped: Vec<String> = query.subreddits.iter().map(|s| format!("r/{}", s)).collect();
        prompt.push_str(&format!("Only include posts from {}.\n", scoped.join(", ")));
    }
    if !query.negative_keywords.is_empty() {
        prompt.push_str(&format!(
            "Skip posts about: {}.\n",
            query.negative_keywords.join(", ")
        ));
    }
    prompt.push_str(&format!(
        "Only return posts you verified exist in the search results. Never invent or guess URLs. {permalink_rule}\n\
         Respond with only a JSON array of objects with \"url\", \"title\", \"content\" (the post text) and \"source_name\" \
         (r/<subreddit> or @<username>). Return [] if nothing matches."
    ));
    prompt
}

/// Reddit results must come from one of `subreddits` when any are given,
/// compared case-insensitively against the permalink's `/r/<name>/` segment.
fn parse_candidates(source: LeadSource, subreddits: &[String], output: &str) -> Vec<CandidatePost> {
    let posts = parse_json_array::<GroundedPost>(output)
        .into_iter()
        .filter_map(|raw| {
            let Some(url) = normalize_url(source, &raw.url) else {
                debug!(url = %raw.url, "grounded result is not a permalink");
                return None;
            };
            if source == LeadSource::Reddit && !in_requested_subreddit(&url, subreddits) {
                debug!(%url, "grounded result is outside the requested subreddits");
                return None;
            }
            let source_name = if raw.source_name.trim().is_empty() {
                source_name_from_url(source, &url)?
            } else {
                raw.source_name.trim().to_string()
            };
            let content = if raw.content.trim().is_empty() {
                raw.title.clone()
            } else {
                raw.content
            };

            Some(CandidatePost {
                source,
                url,
                source_name,
                title: raw.title,
                content,
                author_url: None,
                engagement: None,
                created_at: None,
            })
        })
        .collect();
    dedup_by_url(posts)
}

fn in_requested_subreddit(url: &str, subreddits: &[String]) -> bool {
    if subreddits.is_empty() {
        return true;
    }
    let Some(name) = source_name_from_url(LeadSource::Reddit, url) else {
        return false;
    };
    let sub = name.trim_start_matches("r/");
    subreddits.iter().any(|s| s.eq_ignore_ascii_case(sub))
}

/// `r/<subreddit>` or `@<username>` read from a canonical permalink.
pub fn source_name_from_url(source: LeadSource, url: &str) -> Option<String> {
    let path = url.split("://").nth(1)?.split_once('/')?.1;
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match source {
        LeadSource::Reddit => {
            if segments.next()? != "r" {
                return None;
            }
            segments.next().map(|sub| format!("r/{}", sub))
        }
        LeadSource::Twitter => segments.next().map(|user| format!("@{}", user)),
    }
}
