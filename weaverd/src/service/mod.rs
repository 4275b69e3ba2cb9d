// ABOUTME: hosts the conversion and validate-and-correct services that sit between the facade and the gateway.
// ABOUTME: maps gateway failures onto the wire error codes shared with clients.

pub mod convert;
pub mod correct;

pub use convert::convert;
pub use correct::{validate_and_correct, StructureTool};

use weaver_common::{parse_shape_descriptor, ErrorCode};

use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidShapeDescriptor(String),
    #[error("model output missing: {0}")]
    ModelOutputMissing(String),
    #[error("model transport failure: {0}")]
    ModelTransportFailure(String),
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::InvalidShapeDescriptor(_) => ErrorCode::InvalidShapeDescriptor,
            ServiceError::ModelOutputMissing(_) => ErrorCode::ModelOutputMissing,
            ServiceError::ModelTransportFailure(_) => ErrorCode::ModelTransportFailure,
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::OutputMissing(_) | GatewayError::ToolRoundsExceeded(_) => {
                ServiceError::ModelOutputMissing(err.to_string())
            }
            other => ServiceError::ModelTransportFailure(other.to_string()),
        }
    }
}

fn ensure_shape_descriptor(schema: &str) -> Result<(), ServiceError> {
    parse_shape_descriptor(schema)
        .map(|_| ())
        .map_err(|err| ServiceError::InvalidShapeDescriptor(err.message))
}
