use crate::{api, rate_limiter, AccessMode, AuthState, RedditClient, SearchLimits};
use salesflow_core::{ConfigError, CoreError, RedditConfig};

fn oauth_config() -> RedditConfig {
    RedditConfig {
        client_id: Some("test_client_id".to_string()),
        client_secret: Some("test_client_secret".to_string()),
        username: Some("test_user".to_string()),
        password: Some("test_password".to_string()),
        user_agent: Some("sales-flow/0.1 by test_user".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_oauth_client_creation() {
    let client = RedditClient::oauth(&oauth_config(), SearchLimits::default()).unwrap();
    assert_eq!(client.mode(), AccessMode::OAuth);
    assert_eq!(client.api().user_agent(), "sales-flow/0.1 by test_user");
    assert_eq!(client.auth_state().await, Some(AuthState::NotAuthenticated));
}

#[test]
fn test_oauth_client_requires_full_credentials() {
    let config = RedditConfig {
        client_id: Some("only_id".to_string()),
        ..Default::default()
    };
    let result = RedditClient::oauth(&config, SearchLimits::default());
    assert!(matches!(
        result,
        Err(CoreError::Config(ConfigError::MissingField { .. }))
    ));
}

#[test]
fn test_public_client_uses_derived_user_agent() {
    let config = RedditConfig {
        client_id: Some("abc123".to_string()),
        ..Default::default()
    };
    let client = RedditClient::public(&config, SearchLimits::default()).unwrap();
    assert_eq!(client.mode(), AccessMode::Public);
    assert!(client.api().user_agent().contains("abc123"));
    assert_eq!(tokio_test::block_on(client.auth_state()), None);
    assert_eq!(
        client.api().search_endpoint(Some("smallbusiness")),
        "/r/smallbusiness/search.json"
    );
}

#[test]
fn test_access_mode_names() {
    assert_eq!(AccessMode::OAuth.as_str(), "reddit_oauth");
    assert_eq!(AccessMode::Public.as_str(), "reddit_public");
}

#[test]
fn test_default_search_limits() {
    let limits = SearchLimits::default();
    assert_eq!(limits.per_subreddit, 25);
    assert_eq!(limits.global, 50);
}

#[tokio::test]
async fn test_integration_client_metrics_and_limits() {
    let client = RedditClient::oauth(&oauth_config(), SearchLimits::default()).unwrap();

    let metrics = client.api().get_metrics().await;
    assert_eq!(metrics.total_requests, 0);

    let status = client.api().get_rate_limit_status().await;
    assert_eq!(
        status.max_tokens,
        rate_limiter::RateLimitConfig::reddit_oauth().burst_allowance
    );
    assert!(!status.is_near_limit());
}

#[test]
fn test_listing_with_missing_optional_fields_parses() {
    let raw = r#"{
        "kind": "Listing",
        "data": {
            "after": null,
            "before": null,
            "children": [
                {"kind": "t3", "data": {
                    "id": "zzz",
                    "title": "Any tool for quotes?",
                    "subreddit": "freelance",
                    "permalink": "/r/freelance/comments/zzz/any_tool_for_quotes/"
                }}
            ]
        }
    }"#;

    let listing: api::RedditListing<api::RedditPostData> = serde_json::from_str(raw).unwrap();
    let candidates = api::listing_to_candidates(listing, Some("Freelance"));
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].created_at.map(|t| t.timestamp()), Some(0));
}
