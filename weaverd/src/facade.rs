// ABOUTME: translates client requests into service calls and folds every result into an action outcome.
// ABOUTME: no failure escapes this layer; callers only ever see {data} or {error}.

use std::sync::Arc;

use weaver_common::{
    ActionOutcome, ComparatorMode, ConversionRequest, CorrectionRequest, FacadeRequest, CONVERSION_FAILED_MESSAGE,
    CORRECTION_FAILED_MESSAGE,
};

use crate::gateway::ModelGateway;
use crate::service::{self, ServiceError};

pub struct Facade {
    gateway: Arc<dyn ModelGateway>,
    mode: ComparatorMode,
}

impl Facade {
    pub fn new(gateway: Arc<dyn ModelGateway>, mode: ComparatorMode) -> Self {
        Self { gateway, mode }
    }

    pub fn mode(&self) -> ComparatorMode {
        self.mode
    }

    pub async fn dispatch(&self, request: &FacadeRequest) -> ActionOutcome {
        match request {
            FacadeRequest::Convert(req) => self.run_conversion(req).await,
            FacadeRequest::Correct(req) => self.run_correction(req).await,
        }
    }

    pub async fn run_conversion(&self, request: &ConversionRequest) -> ActionOutcome {
        match service::convert(self.gateway.as_ref(), request).await {
            Ok(result) => ActionOutcome::Data(result.json_output),
            Err(err) => failure("conversion", err, CONVERSION_FAILED_MESSAGE),
        }
    }

    pub async fn run_correction(&self, request: &CorrectionRequest) -> ActionOutcome {
        match service::validate_and_correct(self.gateway.as_ref(), request, self.mode).await {
            Ok(result) => ActionOutcome::Data(result.corrected_json),
            Err(err) => failure("correction", err, CORRECTION_FAILED_MESSAGE),
        }
    }
}

// A missing model payload is reported with the fixed message; other failures
// carry their own description.
fn failure(op: &str, err: ServiceError, missing_message: &str) -> ActionOutcome {
    tracing::error!(op, code = ?err.code(), error = %err, "request failed");
    match err {
        ServiceError::ModelOutputMissing(_) => ActionOutcome::Error(missing_message.to_string()),
        other => ActionOutcome::Error(other.to_string()),
    }
}
