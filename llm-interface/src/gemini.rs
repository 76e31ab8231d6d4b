use crate::key_rotator::ApiKeyRotator;
use crate::{GenerateRequest, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use salesflow_core::{CoreError, GeminiConfig, LlmError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROVIDER: &str = "gemini";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Sends one `generateContent` body for a model and key and returns the
/// text output.
#[async_trait]
pub trait GeminiTransport: Send + Sync {
    async fn generate_content(&self, model: &str, api_key: &str, body: &Value) -> Result<String, CoreError>;
}

pub struct HttpTransport {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &GeminiConfig) -> Result<Self, CoreError> {
        Ok(Self {
            http_client: Client::builder().timeout(config.timeout()).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GeminiTransport for HttpTransport {
    async fn generate_content(&self, model: &str, api_key: &str, body: &Value) -> Result<String, CoreError> {
        let send = self
            .http_client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(body)
            .send();

        let response = match tokio::time::timeout(self.timeout, send).await {
            Err(_) => return Err(timeout_error()),
            Ok(Err(e)) if e.is_timeout() => return Err(timeout_error()),
            Ok(Err(e)) => return Err(CoreError::Network(e)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, model));
        }

        let payload: GenerateContentResponse = response.json().await.map_err(|e| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
                details: e.to_string(),
            })
        })?;
        extract_text(payload)
    }
}

/// Gemini `generateContent` client with key rotation and a lighter
/// fallback model for overload.
pub struct GeminiProvider {
    transport: Arc<dyn GeminiTransport>,
    model: String,
    fallback_model: Option<String>,
    keys: Arc<ApiKeyRotator>,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig, keys: Arc<ApiKeyRotator>) -> Result<Self, CoreError> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Self::with_transport(config, keys, transport)
    }

    pub fn with_transport(
        config: &GeminiConfig,
        keys: Arc<ApiKeyRotator>,
        transport: Arc<dyn GeminiTransport>,
    ) -> Result<Self, CoreError> {
        if keys.is_empty() {
            return Err(CoreError::missing_field("gemini.api_keys"));
        }

        Ok(Self {
            transport,
            model: config.model.clone(),
            fallback_model: config
                .fallback_model
                .clone()
                .filter(|m| !m.trim().is_empty() && *m != config.model),
            keys,
        })
    }

    /// Builds the provider together with its own key pool.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, CoreError> {
        let keys = Arc::new(ApiKeyRotator::new(
            config.api_keys.clone(),
            config.key_cooldown(),
        ));
        Self::new(config, keys)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn keys(&self) -> &Arc<ApiKeyRotator> {
        &self.keys
    }

    async fn call(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<String, CoreError> {
        debug!(model, grounded = request.grounded, "gemini request");
        self.transport
            .generate_content(model, api_key, &build_request_body(request))
            .await
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, CoreError> {
        let key = self
            .keys
            .next_key()
            .ok_or_else(|| CoreError::missing_field("gemini.api_keys"))?;

        match self.call(&self.model, &key, request).await {
            Err(e) if e.is_key_failure() => {
                self.keys.mark_failed(&key);
                let retry_key = match self.keys.next_key() {
                    Some(next) if next != key => next,
                    _ => return Err(e),
                };
                info!(error = %e, "rotating gemini API key and retrying once");

                let result = self.call(&self.model, &retry_key, request).await;
                if matches!(&result, Err(e) if e.is_key_failure()) {
                    self.keys.mark_failed(&retry_key);
                }
                result
            }
            Err(e) if e.is_overloaded() => match &self.fallback_model {
                Some(fallback) => {
                    warn!(
                        model = %self.model,
                        fallback = %fallback,
                        error = %e,
                        "gemini overloaded, trying fallback model once"
                    );
                    self.call(fallback, &key, request).await
                }
                None => Err(e),
            },
            other => other,
        }
    }
}

fn timeout_error() -> CoreError {
    CoreError::Llm(LlmError::RequestTimeout {
        provider: PROVIDER.to_string(),
    })
}

pub fn build_request_body(request: &GenerateRequest) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });

    let mut generation_config = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }

    if request.grounded {
        body["tools"] = json!([{ "google_search": {} }]);
    } else if let Some(schema) = &request.response_schema {
        generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }

    if !generation_config.is_empty() {
        body["generationConfig"] = Value::Object(generation_config);
    }
    body
}

/// Maps a non-success response to the error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str, model: &str) -> CoreError {
    let lower = body.to_ascii_lowercase();
    let provider = PROVIDER.to_string();

    let error = match status.as_u16() {
        400 if lower.contains("api key not valid") || lower.contains("api_key_invalid") => {
            LlmError::InvalidApiKey { provider }
        }
        401 | 403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        429 if lower.contains("quota") => LlmError::QuotaExceeded { provider },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: 60,
        },
        503 => LlmError::Overloaded {
            provider,
            model: model.to_string(),
        },
        _ if lower.contains("overloaded") => LlmError::Overloaded {
            provider,
            model: model.to_string(),
        },
        code => {
            return CoreError::RequestFailed {
                message: body.chars().take(300).collect(),
                status_code: Some(code),
            }
        }
    };
    CoreError::Llm(error)
}

/// Concatenates `candidates[0].content.parts[*].text`.
fn extract_text(payload: GenerateContentResponse) -> Result<String, CoreError> {
    if let Some(reason) = payload.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(CoreError::Llm(LlmError::ContentFiltered { reason }));
    }

    let candidate = payload.candidates.into_iter().next().ok_or_else(|| {
        CoreError::Llm(LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: "response has no candidates".to_string(),
        })
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r == "SAFETY") {
            return Err(CoreError::Llm(LlmError::ContentFiltered { reason }));
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_structured_request_body() {
        let schema = json!({"type": "ARRAY"});
        let request = GenerateRequest::new("score these")
            .with_schema(schema.clone())
            .with_temperature(0.2);
        let body = build_request_body(&request);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "score these");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"], schema);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_grounded_request_drops_schema() {
        let request = GenerateRequest::new("find posts")
            .with_schema(json!({"type": "ARRAY"}))
            .grounded();
        let body = build_request_body(&request);

        assert_eq!(body["tools"][0], json!({"google_search": {}}));
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_failure_classification() {
        let quota = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            "You exceeded your current quota",
            "m",
        );
        assert!(quota.is_key_failure());

        let busy = classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down", "m");
        assert!(busy.is_overloaded());
        assert!(!busy.is_key_failure());

        let overloaded = classify_failure(StatusCode::SERVICE_UNAVAILABLE, "", "m");
        assert!(matches!(
            overloaded,
            CoreError::Llm(LlmError::Overloaded { .. })
        ));

        let bad_key = classify_failure(
            StatusCode::BAD_REQUEST,
            "{\"error\": {\"message\": \"API key not valid. Please pass a valid API key.\"}}",
            "m",
        );
        assert!(matches!(bad_key, CoreError::Llm(LlmError::InvalidApiKey { .. })));

        let other = classify_failure(StatusCode::BAD_REQUEST, "bad schema", "m");
        assert!(matches!(
            other,
            CoreError::RequestFailed {
                status_code: Some(400),
                ..
            }
        ));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "[{\"url\":"}, {"text": " \"a\"}]"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(extract_text(payload).unwrap(), "[{\"url\": \"a\"}]");
    }

    #[test]
    fn test_blocked_prompt() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(matches!(
            extract_text(payload),
            Err(CoreError::Llm(LlmError::ContentFiltered { .. }))
        ));
    }

    #[test]
    fn test_provider_requires_keys() {
        let config = GeminiConfig::default();
        assert!(matches!(
            GeminiProvider::from_config(&config),
            Err(CoreError::Config(_))
        ));

        let config = GeminiConfig {
            api_keys: vec!["k1".to_string()],
            ..Default::default()
        };
        let provider = GeminiProvider::from_config(&config).unwrap();
        assert_eq!(provider.model(), "gemini-2.5-flash");
        assert_eq!(provider.keys().len(), 1);

        let transport = HttpTransport::new(&config).unwrap();
        assert!(transport
            .endpoint("gemini-2.5-flash")
            .ends_with("/v1beta/models/gemini-2.5-flash:generateContent"));
    }

    /// Replays canned results and records the `(model, key)` of every call.
    struct ScriptedTransport {
        results: Mutex<VecDeque<Result<String, CoreError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<String, CoreError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GeminiTransport for ScriptedTransport {
        async fn generate_content(&self, model: &str, api_key: &str, _body: &Value) -> Result<String, CoreError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), api_key.to_string()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("[]".to_string()))
        }
    }

    fn provider(keys: &[&str], transport: Arc<ScriptedTransport>) -> GeminiProvider {
        let config = GeminiConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        };
        let rotator = Arc::new(ApiKeyRotator::new(
            config.api_keys.clone(),
            config.key_cooldown(),
        ));
        GeminiProvider::with_transport(&config, rotator, transport).unwrap()
    }

    fn quota() -> CoreError {
        CoreError::Llm(LlmError::QuotaExceeded {
            provider: PROVIDER.to_string(),
        })
    }

    fn overloaded() -> CoreError {
        CoreError::Llm(LlmError::Overloaded {
            provider: PROVIDER.to_string(),
            model: "gemini-2.5-flash".to_string(),
        })
    }

    #[tokio::test]
    async fn test_key_failure_rotates_and_retries_once() {
        let transport = ScriptedTransport::new(vec![Err(quota()), Ok("[1]".to_string())]);
        let provider = provider(&["k1", "k2"], transport.clone());

        let output = provider.generate(&GenerateRequest::new("p")).await.unwrap();
        assert_eq!(output, "[1]");

        let keys: Vec<String> = transport.calls().into_iter().map(|(_, key)| key).collect();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(provider.keys().failed_count(), 1);
    }

    #[tokio::test]
    async fn test_second_key_failure_is_returned() {
        let transport = ScriptedTransport::new(vec![Err(quota()), Err(quota()), Ok("[1]".to_string())]);
        let provider = provider(&["k1", "k2", "k3"], transport.clone());

        let result = provider.generate(&GenerateRequest::new("p")).await;
        assert!(result.unwrap_err().is_key_failure());
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_single_key_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(quota()), Ok("[1]".to_string())]);
        let provider = provider(&["only"], transport.clone());

        let result = provider.generate(&GenerateRequest::new("p")).await;
        assert!(result.unwrap_err().is_key_failure());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_overload_tries_fallback_model_once() {
        let transport = ScriptedTransport::new(vec![Err(overloaded()), Err(overloaded()), Ok("[1]".to_string())]);
        let provider = provider(&["k1"], transport.clone());

        let result = provider.generate(&GenerateRequest::new("p")).await;
        assert!(result.unwrap_err().is_overloaded());

        let models: Vec<String> = transport.calls().into_iter().map(|(model, _)| model).collect();
        assert_eq!(models, vec!["gemini-2.5-flash", "gemini-2.5-flash-lite"]);
    }

    #[tokio::test]
    async fn test_overload_fallback_can_succeed() {
        let transport = ScriptedTransport::new(vec![Err(overloaded()), Ok("[2]".to_string())]);
        let provider = provider(&["k1"], transport.clone());

        let output = provider.generate(&GenerateRequest::new("p")).await.unwrap();
        assert_eq!(output, "[2]");
    }
}
