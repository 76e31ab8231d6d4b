//! Canonical permalink rules per source.
//!
//! A URL that fails its source's rule is dropped by the caller. Every
//! function here is idempotent on its own output.

use crate::LeadSource;
use url::Url;

const REDDIT_ORIGIN: &str = "https://www.reddit.com";
const TWITTER_ORIGIN: &str = "https://x.com";
const TWITTER_HOSTS: [&str; 4] = ["twitter.com", "www.twitter.com", "x.com", "www.x.com"];

pub fn normalize_url(source: LeadSource, raw: &str) -> Option<String> {
    match source {
        LeadSource::Reddit => normalize_reddit_url(raw),
        LeadSource::Twitter => normalize_twitter_url(raw),
    }
}

/// Canonical Reddit post permalink, or `None` for subreddit, profile and
/// foreign links.
pub fn normalize_reddit_url(raw: &str) -> Option<String> {
    let url = parse_loose(raw, REDDIT_ORIGIN)?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "reddit.com" && !host.ends_with(".reddit.com") {
        return None;
    }
    if !url.path().contains("/comments/") {
        return None;
    }
    Some(format!("{}{}", REDDIT_ORIGIN, url.path()))
}

/// Canonical tweet permalink on twitter.com or x.com.
pub fn normalize_twitter_url(raw: &str) -> Option<String> {
    let url = parse_loose(raw, TWITTER_ORIGIN)?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !TWITTER_HOSTS.contains(&host.as_str()) {
        return None;
    }
    if !url.path().contains("/status/") {
        return None;
    }
    Some(format!("https://{}{}", host, url.path()))
}

pub fn is_valid_url(source: LeadSource, raw: &str) -> bool {
    normalize_url(source, raw).is_some()
}

/// Parses relative paths against `origin` and adds a missing scheme.
fn parse_loose(raw: &str, origin: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = if raw.starts_with('/') {
        format!("{}{}", origin, raw)
    } else if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Host of a company website without `www.`, used to dedupe scraped leads.
pub fn website_host(raw: &str) -> Option<String> {
    let url = parse_loose(raw, "https://localhost")?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host == "localhost" {
        return None;
    }
    Some(host.trim_start_matches("www.").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reddit_rejects_subreddit_root() {
        assert_eq!(normalize_reddit_url("https://reddit.com/r/test"), None);
        assert_eq!(normalize_reddit_url("https://www.reddit.com/user/someone/"), None);
    }

    #[test]
    fn test_reddit_accepts_permalink() {
        let url = "https://www.reddit.com/r/test/comments/abc123/title/";
        assert_eq!(normalize_reddit_url(url).as_deref(), Some(url));
    }

    #[test]
    fn test_reddit_normalizes_variants() {
        let expected = Some("https://www.reddit.com/r/test/comments/abc123/title/".to_string());
        assert_eq!(
            normalize_reddit_url("/r/test/comments/abc123/title/"),
            expected
        );
        assert_eq!(
            normalize_reddit_url("old.reddit.com/r/test/comments/abc123/title/?utm=1#top"),
            expected
        );
        assert_eq!(
            normalize_reddit_url("http://reddit.com/r/test/comments/abc123/title/"),
            expected
        );
    }

    #[test]
    fn test_reddit_rejects_lookalike_hosts() {
        assert_eq!(
            normalize_reddit_url("https://notreddit.com/r/test/comments/abc123/"),
            None
        );
        assert_eq!(normalize_reddit_url(""), None);
        assert_eq!(normalize_reddit_url("ftp://reddit.com/r/a/comments/1/"), None);
    }

    #[test]
    fn test_twitter_rules() {
        assert_eq!(normalize_twitter_url("https://example.com/status/123"), None);
        assert_eq!(
            normalize_twitter_url("https://x.com/user/status/123").as_deref(),
            Some("https://x.com/user/status/123")
        );
        assert_eq!(
            normalize_twitter_url("twitter.com/user/status/123?s=20").as_deref(),
            Some("https://twitter.com/user/status/123")
        );
        assert_eq!(normalize_twitter_url("https://x.com/user"), None);
        assert_eq!(
            normalize_twitter_url("https://mobile.twitter.com/user/status/1"),
            None
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            (LeadSource::Reddit, "/r/SaaS/comments/xyz/need_a_crm/?sort=new"),
            (LeadSource::Reddit, "https://old.reddit.com/r/a/comments/1/b"),
            (LeadSource::Twitter, "http://www.x.com/founder/status/42#reply"),
        ];

        for (source, raw) in inputs {
            let once = normalize_url(source, raw).unwrap();
            let twice = normalize_url(source, &once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_website_host() {
        assert_eq!(
            website_host("https://www.acme.io/contact").as_deref(),
            Some("acme.io")
        );
        assert_eq!(website_host("acme.io").as_deref(), Some("acme.io"));
        assert_eq!(website_host("   "), None);
    }
}
