// ABOUTME: defines the model completion gateway seam used by the conversion services.
// ABOUTME: a gateway takes a prompt, an output contract, and optional tools, and returns one json object.

pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use gemini::{GeminiConfig, GeminiGateway};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("model returned no usable output: {0}")]
    OutputMissing(String),
    #[error("model requested unknown tool: {0}")]
    UnknownTool(String),
    #[error("model did not finish within {0} tool rounds")]
    ToolRoundsExceeded(u32),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A capability the model may call mid-inference. Errors are handed back to
/// the model as the tool's answer, not raised to the caller.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn call(&self, input: Value) -> Result<Value, String>;
}

/// Name and JSON Schema of the object the model must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContract {
    pub name: String,
    pub schema: Value,
}

impl OutputContract {
    pub fn of<T: schemars::JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: inline_schema_for::<T>(),
        }
    }
}

pub struct GenerateRequest {
    pub prompt: String,
    pub output: OutputContract,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, output: OutputContract) -> Self {
        Self {
            prompt: prompt.into(),
            output,
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(&self, request: GenerateRequest) -> Result<Value, GatewayError>;
}

/// Produces a self-contained schema (no $ref, no meta keys) that model apis
/// accept as a response or parameter schema.
pub fn inline_schema_for<T: schemars::JsonSchema>() -> Value {
    let generator = schemars::gen::SchemaSettings::openapi3()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root).unwrap_or_default();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("title");
        obj.remove("definitions");
    }
    schema
}

/// Pulls the first json object out of model text. Tolerates markdown code
/// fences and prose around the object.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
