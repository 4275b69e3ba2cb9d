// ABOUTME: converts free text into json shaped by a target descriptor with a single model call.
// ABOUTME: trusts the model's isValid verdict; no local re-validation is done here.

use weaver_common::{ConversionRequest, ConversionResult};

use super::{ensure_shape_descriptor, ServiceError};
use crate::gateway::{GenerateRequest, ModelGateway, OutputContract};
use crate::prompt;

pub async fn convert(
    gateway: &dyn ModelGateway,
    request: &ConversionRequest,
) -> Result<ConversionResult, ServiceError> {
    ensure_shape_descriptor(&request.schema)?;

    let prompt = prompt::conversion_prompt(&request.text, &request.schema);
    let output = gateway
        .invoke(GenerateRequest::new(
            prompt,
            OutputContract::of::<ConversionResult>("ConversionResult"),
        ))
        .await?;

    let result: ConversionResult = serde_json::from_value(output)
        .map_err(|err| ServiceError::ModelOutputMissing(format!("conversion output does not match contract: {err}")))?;

    if result.json_output.trim().is_empty() {
        return Err(ServiceError::ModelOutputMissing("model returned an empty jsonOutput".to_string()));
    }

    Ok(result)
}
