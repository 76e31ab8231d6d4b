use crate::parser::parse_json_array;
use crate::{GenerateRequest, LlmProvider};
use salesflow_core::{normalize_url, Campaign, CandidatePost, CoreError, LeadSource, ScoredPost};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Post bodies are cut to this many characters in the prompt.
const CONTENT_CHARS: usize = 1200;

/// What the scorer knows about the campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringContext {
    pub product_description: String,
    pub keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
}

impl ScoringContext {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        Self {
            product_description: campaign.product_description(),
            keywords: campaign.keywords.clone(),
            negative_keywords: campaign.negative_keywords.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PromptPost<'a> {
    url: &'a str,
    source_name: &'a str,
    title: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    url: String,
    relevance: f64,
}

pub fn score_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "url": { "type": "STRING" },
                "relevance": { "type": "INTEGER" }
            },
            "required": ["url", "relevance"]
        }
    })
}

/// Scores a batch of candidates against a campaign with a single LLM call.
#[derive(Clone)]
pub struct RelevanceScorer {
    provider: Arc<dyn LlmProvider>,
}

impl RelevanceScorer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn score(
        &self,
        context: &ScoringContext,
        source: LeadSource,
        candidates: Vec<CandidatePost>,
    ) -> Result<Vec<ScoredPost>, CoreError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_prompt(context, source, &candidates)?;
        let request = GenerateRequest::new(prompt)
            .with_schema(score_schema())
            .with_temperature(0.1);
        let output = self.provider.generate(&request).await?;

        let scored = join_scores(source, candidates, &output);
        info!(source = %source, scored = scored.len(), "relevance scoring finished");
        Ok(scored)
    }
}

fn build_prompt(
    context: &ScoringContext,
    source: LeadSource,
    candidates: &[CandidatePost],
) -> Result<String, CoreError> {
    let posts: Vec<PromptPost<'_>> = candidates
        .iter()
        .map(|c| PromptPost {
            url: &c.url,
            source_name: &c.source_name,
            title: &c.title,
            content: c.content.chars().take(CONTENT_CHARS).collect(),
        })
        .collect();
    let posts_json = serde_json::to_string_pretty(&posts)?;

    let negatives = if context.negative_keywords.is_empty() {
        "none".to_string()
    } else {
        context.negative_keywords.join(", ")
    };

    Ok(format!(
        "You qualify sales leads from {source} posts.\n\
         Product: {product}\n\
         Keywords: {keywords}\n\
         Exclude posts about: {negatives}\n\n\
         Rate each post from 0 to 100 for how likely its author is to buy the product:\n\
         - 90-100: the author explicitly asks for a solution, tool or recommendation like the product.\n\
         - 70-89: the author describes the problem the product solves without explicitly asking.\n\
         - below 70: anything else, including posts matching an excluded topic.\n\
         Only return posts scoring 70 or higher. Use the exact url given for each post.\n\
         Respond with a JSON array of objects with \"url\" and \"relevance\".\n\n\
         Posts:\n{posts_json}",
        source = source,
        product = context.product_description,
        keywords = context.keywords.join(", "),
    ))
}

/// Joins model scores back onto candidates by canonical URL. Unknown URLs
/// are ignored and scores are clamped to 0..=100.
fn join_scores(source: LeadSource, candidates: Vec<CandidatePost>, output: &str) -> Vec<ScoredPost> {
    let mut by_url: HashMap<String, CandidatePost> = candidates
        .into_iter()
        .map(|c| (c.url.clone(), c))
        .collect();

    let mut scored = Vec::new();
    for raw in parse_json_array::<RawScore>(output) {
        let Some(url) = normalize_url(source, &raw.url) else {
            debug!(url = %raw.url, "scored URL is not a valid permalink");
            continue;
        };
        let Some(post) = by_url.remove(&url) else {
            debug!(%url, "scored URL does not match any candidate");
            continue;
        };
        scored.push(ScoredPost {
            post,
            relevance: raw.relevance.round().clamp(0.0, 100.0) as u8,
        });
    }
    scored
}
