//! Runs one live Reddit search with credentials from the environment.
//!
//! REDDIT_CLIENT_ID is required; add REDDIT_CLIENT_SECRET, REDDIT_USERNAME
//! and REDDIT_PASSWORD to use the OAuth endpoint instead of the public one.

use reddit_client::{RedditClient, SearchLimits};
use salesflow_core::{AppConfig, Campaign, DateRange, LeadSource, NewCampaign, QueryBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load(None)?;
    let mut args = std::env::args().skip(1);
    let keyword = args.next().unwrap_or_else(|| "invoicing software".to_string());
    let subreddits: Vec<String> = args.collect();

    let campaign = Campaign::new(NewCampaign {
        name: "manual search".to_string(),
        description: None,
        keywords: vec![keyword],
        negative_keywords: vec![],
        subreddits,
        website_url: None,
        date_range: DateRange::LastWeek,
        lead_sources: vec![LeadSource::Reddit],
    });
    let query = QueryBuilder::build(&campaign, LeadSource::Reddit);
    println!("query: {}  window: {}", query.query, query.time_window.token());

    let limits = SearchLimits::default();
    let client = if config.reddit.has_oauth_credentials() {
        RedditClient::oauth(&config.reddit, limits)?
    } else {
        RedditClient::public(&config.reddit, limits)?
    };
    println!("mode: {}", client.mode().as_str());

    let posts = client.search(&query).await?;
    for post in &posts {
        println!("{}  {}\n    {}", post.source_name, post.title, post.url);
    }
    println!("\n{} posts", posts.len());

    let metrics = client.api().get_metrics().await;
    println!(
        "requests: {} ok, {} failed, avg {:?}",
        metrics.successful_requests,
        metrics.failed_requests,
        metrics.average_response_time()
    );
    Ok(())
}
