use crate::{GenerateRequest, LlmProvider};
use salesflow_core::{Campaign, CoreError, LlmError, Post};
use std::sync::Arc;
use tracing::info;

/// Writes outreach replies for stored posts.
#[derive(Clone)]
pub struct CommentGenerator {
    provider: Arc<dyn LlmProvider>,
}

impl CommentGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(&self, campaign: &Campaign, post: &Post) -> Result<String, CoreError> {
        let request = GenerateRequest::new(build_prompt(campaign, post)).with_temperature(0.7);
        let output = self.provider.generate(&request).await?;

        let comment = clean_comment(&output);
        if comment.is_empty() {
            return Err(CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: self.provider.name().to_string(),
                details: "empty comment".to_string(),
            }));
        }

        info!(post_id = %post.id, chars = comment.len(), "outreach comment generated");
        Ok(comment)
    }
}

fn build_prompt(campaign: &Campaign, post: &Post) -> String {
    let website = campaign
        .website_url
        .as_deref()
        .map(|url| format!("Product website: {}\n", url))
        .unwrap_or_default();

    format!(
        "Write a reply to this {source} post from {source_name}.\n\
         Title: {title}\n\
         Post: {content}\n\n\
         You represent this product: {product}\n\
         {website}\
         Be genuinely helpful first: address the author's problem directly, then mention the product \
         naturally as one option. Keep it under 120 words, conversational, no hashtags, no emojis, \
         no greeting or sign-off. Return only the reply text.",
        source = post.source,
        source_name = post.source_name,
        title = post.title,
        content = post.content,
        product = campaign.product_description(),
    )
}

/// Strips wrapping quotes and whitespace the model sometimes adds.
fn clean_comment(output: &str) -> String {
    output
        .trim()
        .trim_matches(|c| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
        .to_string()
}
