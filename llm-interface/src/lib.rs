pub mod comments;
pub mod gemini;
pub mod grounded;
pub mod key_rotator;
pub mod parser;
pub mod scorer;
pub mod scraper;

pub use comments::CommentGenerator;
pub use gemini::GeminiProvider;
pub use grounded::GroundedSearch;
pub use key_rotator::ApiKeyRotator;
pub use parser::{extract_json_arrays, parse_json_array};
pub use scorer::{RelevanceScorer, ScoringContext};
pub use scraper::{CompanyLead, CompanySearch, LeadScraper};

use async_trait::async_trait;
use salesflow_core::CoreError;
use serde_json::Value;

/// One text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Structured-output schema. Ignored when `grounded` is set because the
    /// search tool and JSON mode cannot be combined.
    pub response_schema: Option<Value>,
    pub grounded: bool,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response_schema: None,
            grounded: false,
            temperature: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn grounded(mut self) -> Self {
        self.grounded = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the model's text output.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, CoreError>;
}
