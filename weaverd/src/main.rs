// ABOUTME: runs the daemon that turns free text into schema-shaped json through a language model.
// ABOUTME: exposes a local unix socket and writes an audit log for each request.

mod audit;
mod facade;
mod gateway;
mod prompt;
mod server;
mod service;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use weaver_common::ComparatorMode;

use crate::gateway::gemini::{DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::gateway::{GeminiConfig, GeminiGateway, ModelGateway};

#[derive(Debug, Parser)]
#[command(name = "weaverd")]
struct Args {
    #[arg(long, default_value = "/tmp/weaverd.sock")]
    socket_path: String,

    #[arg(long, default_value = "./weaverd-audit.jsonl")]
    audit_path: String,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "WEAVER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "WEAVER_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: u32,

    /// How the structure tool compares model output with the target.
    #[arg(long, value_enum, default_value_t = ComparatorMode::KeySet)]
    comparator: ComparatorMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weaverd=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = GeminiConfig::new(args.api_key)
        .model(args.model)
        .timeout(args.timeout_secs)
        .max_tool_rounds(args.max_tool_rounds);
    if let Some(base_url) = args.base_url {
        config = config.base_url(base_url);
    }

    let gateway = GeminiGateway::new(config).context("build model gateway")?;
    tracing::info!(gateway = gateway.name(), "model gateway ready");

    let facade = Arc::new(facade::Facade::new(Arc::new(gateway), args.comparator));
    server::run(&args.socket_path, &args.audit_path, facade).await
}
