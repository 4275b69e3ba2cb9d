// ABOUTME: writes append-only audit records for each request the daemon answers.
// ABOUTME: stores shape and outcome metadata as json lines; free text and produced data are redacted.

use anyhow::Context;
use weaver_common::{ActionOutcome, FacadeRequest};

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct PeerCredentials {
    pub pid: Option<i32>,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, serde::Serialize)]
#[serde(deny_unknown_fields)]
struct AuditRecord<'a> {
    ts_unix_ms: u64,
    peer: Option<PeerCredentials>,
    op: &'a str,
    comparator: &'a str,
    text_chars: usize,
    schema: &'a str,
    outcome: serde_json::Value,
}

pub async fn append_record(
    audit_path: &str,
    ts_unix_ms: u64,
    peer: Option<PeerCredentials>,
    comparator: &str,
    request: &FacadeRequest,
    outcome: &ActionOutcome,
) -> anyhow::Result<()> {
    let record = AuditRecord {
        ts_unix_ms,
        peer,
        op: request.op(),
        comparator,
        text_chars: request.text().chars().count(),
        schema: request.schema(),
        outcome: redact_outcome(outcome)?,
    };

    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .await
        .with_context(|| format!("open audit log at {audit_path}"))?;

    use tokio::io::AsyncWriteExt;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

fn redact_outcome(outcome: &ActionOutcome) -> anyhow::Result<serde_json::Value> {
    let mut v = serde_json::to_value(outcome)?;
    if let Some(obj) = v.as_object_mut() {
        if obj.contains_key("data") {
            obj.insert("data".to_string(), serde_json::Value::String("[redacted]".to_string()));
        }
    }
    Ok(v)
}
