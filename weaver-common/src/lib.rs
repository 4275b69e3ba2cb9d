// ABOUTME: defines the shared request/response protocol used by weaversh and weaverd.
// ABOUTME: provides parsing helpers so both sides reject malformed envelopes the same way.

pub mod compare;
pub mod input;

pub use compare::{compare_key_set, compare_schema, compare_structure, ComparatorMode};
pub use input::{check_input, input_verdict, InputField, InputIssue, InputVerdict, MIN_TEXT_CHARS};

use serde::{Deserialize, Serialize};

pub const CONVERSION_FAILED_MESSAGE: &str = "Failed to generate JSON from the AI model.";
pub const CORRECTION_FAILED_MESSAGE: &str = "Failed to generate or correct JSON from the AI model.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConversionRequest {
    pub text: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CorrectionRequest {
    pub text: String,
    pub schema: String,
}

// isValid is the model's own verdict; nothing downstream re-checks it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// The structured JSON output, serialized as a string.
    pub json_output: String,
    /// Whether the JSON output matches the schema.
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResult {
    /// The JSON output, corrected to match the schema, serialized as a string.
    pub corrected_json: String,
    /// Result of validation, including any errors caught.
    pub validation_result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Data(String),
    Error(String),
}

impl ActionOutcome {
    pub fn data(&self) -> Option<&str> {
        match self {
            ActionOutcome::Data(data) => Some(data),
            ActionOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionOutcome::Data(_) => None,
            ActionOutcome::Error(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FacadeRequest {
    Convert(ConversionRequest),
    Correct(CorrectionRequest),
}

impl FacadeRequest {
    pub fn op(&self) -> &'static str {
        match self {
            FacadeRequest::Convert(_) => "convert",
            FacadeRequest::Correct(_) => "correct",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            FacadeRequest::Convert(req) => &req.text,
            FacadeRequest::Correct(req) => &req.text,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            FacadeRequest::Convert(req) => &req.schema,
            FacadeRequest::Correct(req) => &req.schema,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidShapeDescriptor,
    ModelOutputMissing,
    ModelTransportFailure,
    MalformedResultPayload,
    ParseFailed,
    RequestTooLarge,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidShapeDescriptor => "invalid_shape_descriptor",
            ErrorCode::ModelOutputMissing => "model_output_missing",
            ErrorCode::ModelTransportFailure => "model_transport_failure",
            ErrorCode::MalformedResultPayload => "malformed_result_payload",
            ErrorCode::ParseFailed => "parse_failed",
            ErrorCode::RequestTooLarge => "request_too_large",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl RequestError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub fn parse_facade_request(input: &str) -> Result<FacadeRequest, serde_json::Error> {
    serde_json::from_str(input)
}

pub fn parse_shape_descriptor(schema: &str) -> Result<serde_json::Value, RequestError> {
    serde_json::from_str(schema).map_err(|err| RequestError {
        code: ErrorCode::InvalidShapeDescriptor,
        message: format!("invalid shape descriptor: {err}"),
    })
}
