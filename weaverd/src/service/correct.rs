// ABOUTME: converts text to json and lets the model self-check it with the structure comparator tool.
// ABOUTME: issues exactly one gateway call; any repair iterations happen inside that call.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use weaver_common::{compare_structure, ComparatorMode, CorrectionRequest, CorrectionResult};

use super::{ensure_shape_descriptor, ServiceError};
use crate::gateway::{inline_schema_for, GenerateRequest, ModelGateway, OutputContract, Tool, ToolDefinition};
use crate::prompt;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct StructureToolInput {
    /// The JSON string to validate.
    json_string: String,
    /// The target JSON structure to match.
    target_structure: String,
}

/// Exposes the structure comparator to the model.
pub struct StructureTool {
    mode: ComparatorMode,
}

impl StructureTool {
    pub fn new(mode: ComparatorMode) -> Self {
        Self { mode }
    }
}

impl Tool for StructureTool {
    fn definition(&self) -> ToolDefinition {
        let description = match self.mode {
            ComparatorMode::KeySet => {
                "Validates if a JSON string matches the structure of a given JSON example or schema."
            }
            ComparatorMode::Schema => "Validates a JSON string against a JSON schema and lists any errors.",
        };
        ToolDefinition {
            name: prompt::STRUCTURE_TOOL_NAME.to_string(),
            description: description.to_string(),
            input_schema: inline_schema_for::<StructureToolInput>(),
        }
    }

    fn call(&self, input: Value) -> Result<Value, String> {
        let input: StructureToolInput =
            serde_json::from_value(input).map_err(|err| format!("invalid tool input: {err}"))?;
        Ok(Value::String(compare_structure(
            &input.json_string,
            &input.target_structure,
            self.mode,
        )))
    }
}

pub async fn validate_and_correct(
    gateway: &dyn ModelGateway,
    request: &CorrectionRequest,
    mode: ComparatorMode,
) -> Result<CorrectionResult, ServiceError> {
    ensure_shape_descriptor(&request.schema)?;

    tracing::debug!(
        text_chars = request.text.chars().count(),
        schema = %request.schema,
        mode = mode.as_str(),
        "correction input received"
    );

    let prompt = prompt::correction_prompt(&request.text, &request.schema, mode);
    let generate = GenerateRequest::new(prompt, OutputContract::of::<CorrectionResult>("CorrectionResult"))
        .with_tool(Arc::new(StructureTool::new(mode)));
    let output = gateway.invoke(generate).await?;

    tracing::debug!(output = %output, "correction model output");

    let result: CorrectionResult = serde_json::from_value(output)
        .map_err(|err| ServiceError::ModelOutputMissing(format!("correction output does not match contract: {err}")))?;

    if result.corrected_json.trim().is_empty() {
        return Err(ServiceError::ModelOutputMissing("model returned an empty correctedJson".to_string()));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{ScriptedGateway, ToolCall};
    use weaver_common::ErrorCode;

    fn request(schema: &str) -> CorrectionRequest {
        CorrectionRequest {
            text: "John is 30 years old and lives in Paris.".to_string(),
            schema: schema.to_string(),
        }
    }

    fn structure_call(json: &str, target: &str) -> ToolCall {
        ToolCall {
            name: prompt::STRUCTURE_TOOL_NAME.to_string(),
            args: serde_json::json!({"jsonString": json, "targetStructure": target}),
        }
    }

    #[test]
    fn tool_reports_key_diff() {
        let tool = StructureTool::new(ComparatorMode::KeySet);
        let out = tool
            .call(serde_json::json!({"jsonString": r#"{"a":1}"#, "targetStructure": r#"{"a":0,"b":0}"#}))
            .unwrap();
        assert_eq!(out, Value::String("Missing keys: b".to_string()));
    }

    #[test]
    fn tool_rejects_malformed_input() {
        let tool = StructureTool::new(ComparatorMode::KeySet);
        let err = tool.call(serde_json::json!({"json": "{}"})).unwrap_err();
        assert!(err.starts_with("invalid tool input:"));
    }

    #[test]
    fn tool_definition_declares_both_inputs() {
        let def = StructureTool::new(ComparatorMode::Schema).definition();
        assert_eq!(def.name, "jsonStructureValidator");
        let required = def.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "jsonString"));
        assert!(required.iter().any(|v| v == "targetStructure"));
    }

    #[tokio::test]
    async fn correction_lets_model_iterate_within_one_call() {
        let schema = r#"{"name":"string","age":"number","city":"string"}"#;
        let gateway = ScriptedGateway::new();
        gateway.push(
            vec![
                structure_call(r#"{"name":"John","age":30}"#, schema),
                structure_call(r#"{"name":"John","age":30,"city":"Paris"}"#, schema),
            ],
            Ok(serde_json::json!({
                "correctedJson": r#"{"name":"John","age":30,"city":"Paris"}"#,
                "validationResult": "Valid structure"
            })),
        );

        let result = validate_and_correct(&gateway, &request(schema), ComparatorMode::KeySet)
            .await
            .unwrap();
        assert_eq!(result.validation_result, "Valid structure");
        assert_eq!(gateway.invocations(), 1);

        let outputs = gateway.tool_outputs.lock().unwrap();
        assert_eq!(outputs[0], Value::String("Missing keys: city".to_string()));
        assert_eq!(outputs[1], Value::String("Valid structure".to_string()));
        assert_eq!(gateway.tool_names.lock().unwrap()[0], vec!["jsonStructureValidator".to_string()]);
    }

    #[tokio::test]
    async fn correction_uses_schema_mode_when_configured() {
        let schema = r#"{"type":"object","required":["name"]}"#;
        let gateway = ScriptedGateway::new();
        gateway.push(
            vec![structure_call(r#"{"name":"John"}"#, schema)],
            Ok(serde_json::json!({"correctedJson": r#"{"name":"John"}"#, "validationResult": "Valid JSON"})),
        );

        validate_and_correct(&gateway, &request(schema), ComparatorMode::Schema)
            .await
            .unwrap();
        assert_eq!(gateway.tool_outputs.lock().unwrap()[0], Value::String("Valid JSON".to_string()));
    }

    #[tokio::test]
    async fn correction_returns_whatever_model_emits() {
        let gateway = ScriptedGateway::returning(serde_json::json!({
            "correctedJson": r#"{"name":"John"}"#,
            "validationResult": "Missing keys: age, city"
        }));

        let result = validate_and_correct(&gateway, &request(r#"{"name":"","age":0,"city":""}"#), ComparatorMode::KeySet)
            .await
            .unwrap();
        assert_eq!(result.validation_result, "Missing keys: age, city");
    }

    #[tokio::test]
    async fn correction_rejects_bad_shape_before_calling_model() {
        let gateway = ScriptedGateway::new();
        let err = validate_and_correct(&gateway, &request("not json"), ComparatorMode::KeySet)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidShapeDescriptor);
        assert_eq!(gateway.invocations(), 0);
    }

    #[tokio::test]
    async fn correction_treats_missing_output_as_missing() {
        let gateway = ScriptedGateway::returning(serde_json::json!({"validationResult": "Valid structure"}));
        let err = validate_and_correct(&gateway, &request("{}"), ComparatorMode::KeySet)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModelOutputMissing);
    }
}
