// ABOUTME: provides a user-facing cli for sending conversion requests to the local weaverd daemon.
// ABOUTME: also runs the structure comparator and input checks locally without a daemon.

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use weaver_common::{compare_structure, input_verdict, ComparatorMode};

use weaversh::{build_request, parse_outcome, render_outcome, Op};

#[derive(Debug, Parser)]
#[command(name = "weaversh")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct InputArgs {
    #[arg(long)]
    text: Option<String>,

    #[arg(long)]
    text_file: Option<String>,

    #[arg(long)]
    schema: Option<String>,

    #[arg(long)]
    schema_file: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert text to json in one model call.
    Convert {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value = "/tmp/weaverd.sock")]
        socket_path: String,

        /// Print data exactly as returned.
        #[arg(long)]
        raw: bool,
    },
    /// Convert text and let the model self-check against the schema.
    Correct {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value = "/tmp/weaverd.sock")]
        socket_path: String,

        #[arg(long)]
        raw: bool,
    },
    Compare {
        #[arg(long)]
        candidate: Option<String>,

        #[arg(long)]
        candidate_file: Option<String>,

        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        target_file: Option<String>,

        #[arg(long, value_enum, default_value_t = ComparatorMode::KeySet)]
        mode: ComparatorMode,
    },
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Convert {
            input,
            socket_path,
            raw,
        } => run_op(Op::Convert, &input, &socket_path, raw).await,
        Command::Correct {
            input,
            socket_path,
            raw,
        } => run_op(Op::Correct, &input, &socket_path, raw).await,
        Command::Compare {
            candidate,
            candidate_file,
            target,
            target_file,
            mode,
        } => {
            let candidate = read_required("candidate", candidate.as_deref(), candidate_file.as_deref()).await?;
            let target = read_required("target", target.as_deref(), target_file.as_deref()).await?;
            println!("{}", compare_structure(&candidate, &target, mode));
            Ok(())
        }
        Command::Check { input } => {
            let (text, schema) = read_input(&input).await?;
            let verdict = input_verdict(&text, &schema);
            print!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_op(op: Op, input: &InputArgs, socket_path: &str, raw: bool) -> anyhow::Result<()> {
    let (text, schema) = read_input(input).await?;
    let request = build_request(op, &text, &schema)?;
    let canonical = serde_json::to_string(&request)?;
    let response = send(socket_path, &canonical).await?;

    let rendered = render_outcome(&parse_outcome(&response)?, raw);
    if let Some(stderr) = &rendered.stderr {
        eprintln!("{stderr}");
    }
    if !rendered.stdout.is_empty() {
        println!("{}", rendered.stdout);
    }
    if !rendered.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn read_input(input: &InputArgs) -> anyhow::Result<(String, String)> {
    let schema = read_required("schema", input.schema.as_deref(), input.schema_file.as_deref()).await?;
    let text = match read_field(input.text.as_deref(), input.text_file.as_deref()).await? {
        Some(text) => text,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };
    Ok((text, schema))
}

async fn read_field(inline: Option<&str>, file: Option<&str>) -> anyhow::Result<Option<String>> {
    if let Some(inline) = inline {
        return Ok(Some(inline.to_string()));
    }

    if let Some(file) = file {
        return Ok(Some(tokio::fs::read_to_string(file).await?));
    }

    Ok(None)
}

async fn read_required(name: &str, inline: Option<&str>, file: Option<&str>) -> anyhow::Result<String> {
    read_field(inline, file)
        .await?
        .ok_or_else(|| anyhow::anyhow!("--{name} or --{name}-file is required"))
}

async fn send(socket_path: &str, input: &str) -> anyhow::Result<String> {
    let mut stream = UnixStream::connect(socket_path).await?;
    stream.write_all(input.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}
