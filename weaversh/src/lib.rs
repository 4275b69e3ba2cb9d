// ABOUTME: provides weaversh helpers for checking input, building requests, and rendering outcomes.
// ABOUTME: keeps client behavior deterministic by enforcing the input contract before anything is sent.

use weaver_common::{
    check_input, ActionOutcome, ConversionRequest, CorrectionRequest, ErrorCode, FacadeRequest,
    InputIssue, RequestError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Convert,
    Correct,
}

#[derive(Debug)]
pub struct InputRejected {
    pub issues: Vec<InputIssue>,
}

impl std::fmt::Display for InputRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.issues.iter().map(|i| i.message.as_str()).collect();
        write!(f, "input rejected: {}", messages.join(" "))
    }
}

impl std::error::Error for InputRejected {}

pub fn build_request(op: Op, text: &str, schema: &str) -> Result<FacadeRequest, InputRejected> {
    check_input(text, schema).map_err(|issues| InputRejected { issues })?;

    let text = text.to_string();
    let schema = schema.to_string();
    Ok(match op {
        Op::Convert => FacadeRequest::Convert(ConversionRequest { text, schema }),
        Op::Correct => FacadeRequest::Correct(CorrectionRequest { text, schema }),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub struct Rendered {
    pub stdout: String,
    pub stderr: Option<String>,
    pub ok: bool,
}

/// Data that parses as json is pretty-printed; data that does not is still
/// shown as-is with a warning.
pub fn render_outcome(outcome: &ActionOutcome, raw: bool) -> Rendered {
    match outcome {
        ActionOutcome::Error(message) => Rendered {
            stdout: String::new(),
            stderr: Some(format!("error: {message}")),
            ok: false,
        },
        ActionOutcome::Data(data) if raw => Rendered {
            stdout: data.clone(),
            stderr: None,
            ok: true,
        },
        ActionOutcome::Data(data) => match serde_json::from_str::<serde_json::Value>(data) {
            Ok(v) => Rendered {
                stdout: serde_json::to_string_pretty(&v).unwrap_or_else(|_| data.clone()),
                stderr: None,
                ok: true,
            },
            Err(err) => {
                let warning = RequestError::new(
                    ErrorCode::MalformedResultPayload,
                    format!("model output is not valid json ({err}); showing it unchanged"),
                );
                Rendered {
                    stdout: data.clone(),
                    stderr: Some(format!("warning[{}]: {warning}", warning.code.as_str())),
                    ok: true,
                }
            }
        },
    }
}

pub fn parse_outcome(response: &str) -> anyhow::Result<ActionOutcome> {
    serde_json::from_str(response).map_err(|e| anyhow::anyhow!("daemon sent an unreadable outcome: {e}"))
}
