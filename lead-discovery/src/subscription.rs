use reqwest::{Client, StatusCode};
use salesflow_core::{CoreError, SubscriptionConfig};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Checks whether an email has a paid membership. Any failure counts as no
/// membership.
#[derive(Debug, Clone)]
pub struct SubscriptionChecker {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl SubscriptionChecker {
    pub fn new(config: &SubscriptionConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub async fn has_active_membership(&self, email: &str) -> bool {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return false;
        }

        match tokio::time::timeout(self.timeout, self.fetch(email)).await {
            Ok(Ok(body)) => {
                let active = parse_membership_response(&body);
                debug!(active, "membership lookup finished");
                active
            }
            Ok(Err(e)) => {
                warn!(error = %e, "membership lookup failed");
                false
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "membership lookup timed out");
                false
            }
        }
    }

    async fn fetch(&self, email: &str) -> Result<Value, CoreError> {
        let mut request = self.client.get(&self.api_url).query(&[("email", email)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        Ok(response.json().await?)
    }
}

fn status_error(status: StatusCode) -> CoreError {
    CoreError::RequestFailed {
        message: format!("membership API returned {}", status),
        status_code: Some(status.as_u16()),
    }
}

/// True when the response holds at least one valid or active membership.
/// Accepts either a single membership object or a `{"data": [...]}` page.
pub fn parse_membership_response(body: &Value) -> bool {
    match body.get("data") {
        Some(Value::Array(items)) => items.iter().any(is_active),
        _ => is_active(body),
    }
}

fn is_active(membership: &Value) -> bool {
    if membership.get("valid").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    matches!(
        membership.get("status").and_then(Value::as_str),
        Some("active") | Some("trialing")
    )
}
