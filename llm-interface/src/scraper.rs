//! Company lead scraping through search-grounded generation.

use crate::parser::parse_json_array;
use crate::{GenerateRequest, LlmProvider};
use salesflow_core::retry::{retry_rate_limited, RetryConfig};
use salesflow_core::{website_host, CoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_COMPANIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySearch {
    pub industry: String,
    pub location: Option<String>,
    pub limit: usize,
}

impl CompanySearch {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.industry.trim().is_empty() {
            return Err(CoreError::invalid_input("industry is required"));
        }
        if self.limit == 0 || self.limit > MAX_COMPANIES {
            return Err(CoreError::invalid_input(format!(
                "limit must be between 1 and {}",
                MAX_COMPANIES
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLead {
    pub name: String,
    pub website: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
}

#[derive(Clone)]
pub struct LeadScraper {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
}

impl LeadScraper {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn find_companies(&self, search: &CompanySearch) -> Result<Vec<CompanyLead>, CoreError> {
        search.validate()?;
        let request = GenerateRequest::new(build_prompt(search)).grounded();

        let output = retry_rate_limited("find_companies", &self.retry, || {
            let provider = self.provider.clone();
            let request = request.clone();
            async move { provider.generate(&request).await }
        })
        .await?;

        let leads = clean_leads(parse_json_array::<CompanyLead>(&output), search.limit);
        info!(
            industry = %search.industry,
            results = leads.len(),
            "company search finished"
        );
        Ok(leads)
    }
}

fn build_prompt(search: &CompanySearch) -> String {
    let location = search
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .map(|l| format!(" located in {}", l))
        .unwrap_or_default();

    format!(
        "Use Google Search to find up to {limit} real, currently operating companies in the {industry} industry{location}.\n\
         For each company give its official website and any publicly listed contact details.\n\
         Only include details you found in the search results; use null when a detail is unknown.\n\
         Respond with only a JSON array of objects with \"name\", \"website\", \"description\", \
         \"email\", \"phone\" and \"linkedin\".",
        limit = search.limit,
        industry = search.industry.trim(),
    )
}

/// Drops leads without a usable website, dedupes by website host and
/// truncates to `limit`.
fn clean_leads(leads: Vec<CompanyLead>, limit: usize) -> Vec<CompanyLead> {
    let mut seen = HashSet::new();
    leads
        .into_iter()
        .filter(|lead| !lead.name.trim().is_empty())
        .filter_map(|mut lead| {
            let Some(host) = website_host(&lead.website) else {
                debug!(website = %lead.website, "dropping lead without a valid website");
                return None;
            };
            if !seen.insert(host.clone()) {
                return None;
            }
            if !lead.website.starts_with("http") {
                lead.website = format!("https://{}", lead.website.trim());
            }
            lead.email = lead.email.filter(|e| e.contains('@'));
            lead.phone = lead.phone.filter(|p| !p.trim().is_empty());
            lead.linkedin = lead.linkedin.filter(|l| !l.trim().is_empty());
            Some(lead)
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use salesflow_core::LlmError;

    fn search(limit: usize) -> CompanySearch {
        CompanySearch {
            industry: "accounting".to_string(),
            location: Some("Austin, TX".to_string()),
            limit,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        }
    }

    const OUTPUT: &str = r#"Sure:
    [
        {"name": "Acme Books", "website": "https://www.acmebooks.com", "email": "hello@acmebooks.com", "phone": "512-555-0100"},
        {"name": "Acme Books LLC", "website": "acmebooks.com/contact", "email": "n/a"},
        {"name": "Ledger Co", "website": "ledger.example", "linkedin": "https://linkedin.com/company/ledger"},
        {"name": "", "website": "https://nameless.example"},
        {"name": "No Site", "website": ""}
    ]"#;

    #[tokio::test]
    async fn test_find_companies_dedupes_by_host() {
        let provider = Arc::new(ScriptedProvider::replying(OUTPUT));
        let scraper = LeadScraper::new(provider.clone()).with_retry_config(fast_retry());

        let leads = scraper.find_companies(&search(10)).await.unwrap();
        let names: Vec<&str> = leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Books", "Ledger Co"]);
        assert_eq!(leads[1].website, "https://ledger.example");
        assert_eq!(leads[0].email.as_deref(), Some("hello@acmebooks.com"));

        let request = provider.last_request().unwrap();
        assert!(request.grounded);
        assert!(request.prompt.contains("Austin, TX"));
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let provider = Arc::new(ScriptedProvider::replying(OUTPUT));
        let scraper = LeadScraper::new(provider).with_retry_config(fast_retry());
        assert_eq!(scraper.find_companies(&search(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limits_are_retried() {
        let rate_limited = || {
            Err(CoreError::Llm(LlmError::RateLimitExceeded {
                provider: "gemini".to_string(),
                retry_after: 1,
            }))
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            rate_limited(),
            rate_limited(),
            Ok(OUTPUT.to_string()),
        ]));
        let scraper = LeadScraper::new(provider.clone()).with_retry_config(fast_retry());

        let leads = scraper.find_companies(&search(10)).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_search_is_rejected() {
        let provider = Arc::new(ScriptedProvider::replying(OUTPUT));
        let scraper = LeadScraper::new(provider.clone());

        let mut bad = search(10);
        bad.industry = " ".to_string();
        assert!(scraper.find_companies(&bad).await.is_err());
        assert!(scraper.find_companies(&search(0)).await.is_err());
        assert_eq!(provider.request_count(), 0);
    }
}
