// ABOUTME: hosts the unix socket server that receives conversion requests and returns action outcomes.
// ABOUTME: one request per connection; every reply is a single {data} or {error} json object.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use weaver_common::{parse_facade_request, ActionOutcome, ErrorCode, RequestError};

use crate::audit;
use crate::facade::Facade;

const MAX_REQUEST_BYTES: usize = 256 * 1024;
#[cfg(test)]
const READ_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(50);
#[cfg(not(test))]
const READ_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

pub async fn run(socket_path: &str, audit_path: &str, facade: Arc<Facade>) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        tokio::fs::remove_file(socket_path)
            .await
            .with_context(|| format!("remove existing socket at {socket_path}"))?;
    }

    let listener = UnixListener::bind(socket_path).with_context(|| format!("bind {socket_path}"))?;
    tracing::info!(socket_path, comparator = facade.mode().as_str(), "listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let audit_path = audit_path.to_string();
        let facade = facade.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, &audit_path, &facade).await {
                tracing::warn!(error = %err, "client handling failed");
            }
        });
    }
}

async fn handle_client(mut stream: UnixStream, audit_path: &str, facade: &Facade) -> anyhow::Result<()> {
    let peer = peer_credentials(&stream);

    let input = match read_request(&mut stream).await? {
        Ok(input) => input,
        Err(err) => return write_request_error(&mut stream, err).await,
    };

    let request = match parse_facade_request(&String::from_utf8_lossy(&input)) {
        Ok(r) => r,
        Err(err) => {
            let err = RequestError::new(ErrorCode::ParseFailed, format!("parse failed: {err}"));
            return write_request_error(&mut stream, err).await;
        }
    };

    tracing::info!(op = request.op(), text_chars = request.text().chars().count(), "request received");
    let outcome = facade.dispatch(&request).await;
    write_outcome(&mut stream, &outcome).await?;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    if let Err(err) =
        audit::append_record(audit_path, now_ms, peer, facade.mode().as_str(), &request, &outcome).await
    {
        tracing::warn!(error = %err, "audit append failed");
    }

    Ok(())
}

/// Reads until the peer closes or goes idle. Bytes past the cap are drained
/// so the peer is not cut off mid-write before it sees the reply.
async fn read_request(stream: &mut UnixStream) -> std::io::Result<Result<Vec<u8>, RequestError>> {
    let mut input = Vec::new();
    let mut buf = [0u8; 4096];
    let mut exceeded = false;
    loop {
        let n = match tokio::time::timeout(READ_IDLE_TIMEOUT, stream.read(&mut buf)).await {
            Ok(res) => res?,
            Err(_) if input.is_empty() && !exceeded => {
                return Ok(Err(RequestError::new(ErrorCode::ParseFailed, "read timed out")));
            }
            Err(_) => break,
        };
        if n == 0 {
            break;
        }
        if !exceeded && input.len() + n > MAX_REQUEST_BYTES {
            exceeded = true;
            input.clear();
        }
        if !exceeded {
            input.extend_from_slice(&buf[..n]);
        }
    }

    if exceeded {
        return Ok(Err(RequestError::new(
            ErrorCode::RequestTooLarge,
            "request exceeds max bytes",
        )));
    }
    Ok(Ok(input))
}

fn peer_credentials(stream: &UnixStream) -> Option<audit::PeerCredentials> {
    match stream.peer_cred() {
        Ok(cred) => Some(audit::PeerCredentials {
            pid: cred.pid(),
            uid: cred.uid(),
            gid: cred.gid(),
        }),
        Err(err) => {
            tracing::debug!(error = %err, "peer credentials unavailable");
            None
        }
    }
}

async fn write_request_error(stream: &mut UnixStream, err: RequestError) -> anyhow::Result<()> {
    tracing::debug!(code = err.code.as_str(), error = %err, "rejected request");
    let _ = write_outcome(stream, &ActionOutcome::Error(err.to_string())).await;
    Ok(())
}

async fn write_outcome(stream: &mut UnixStream, outcome: &ActionOutcome) -> anyhow::Result<()> {
    let response_json = serde_json::to_vec(outcome)?;
    stream.write_all(&response_json).await?;
    let _ = stream.shutdown().await;
    Ok(())
}
