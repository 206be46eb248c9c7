//! AI extraction trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// One structured-extraction call.
///
/// `template`, `system_message` and `response_schema` are references the
/// extractor resolves; the pipeline never reads prompt content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub template: String,
    pub system_message: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub response_schema: Option<String>,
    /// Human-readable label for logs and errors (company or job title).
    pub context: String,
}

impl AiRequest {
    pub fn new(template: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            system_message: None,
            variables: BTreeMap::new(),
            response_schema: None,
            context: context.into(),
        }
    }

    pub fn with_system_message(mut self, message: Option<String>) -> Self {
        self.system_message = message;
        self
    }

    pub fn with_response_schema(mut self, schema: Option<String>) -> Self {
        self.response_schema = schema;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}

/// Turns page content into a schema-shaped JSON value.
///
/// Transport failures, timeouts and rate limits should be reported as
/// [`PipelineError::Ai`](crate::error::PipelineError::Ai). Shape problems
/// in the returned value are caught by the pipeline's mappers.
#[async_trait]
pub trait AiExtractor: Send + Sync {
    async fn extract(&self, request: &AiRequest) -> Result<Value>;

    /// Whether a template reference can be resolved. Checked once per run
    /// before any stage starts.
    fn knows_template(&self, _template: &str) -> bool {
        true
    }
}
