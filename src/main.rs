use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tonic::transport::Channel;
use tonic::Request;
use tracing_subscriber::EnvFilter;

use subtitle_service::auth::{attach_token, AuthGate};
use subtitle_service::config::{EngineConfig, ServiceConfig};
use subtitle_service::grpc::{GrpcServer, ReceiverService};
use subtitle_service::proto::subtitle_generator_client::SubtitleGeneratorClient;
use subtitle_service::proto::GenerateRequest;
use subtitle_service::service::SubtitleService;
use subtitle_service::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "subtitle-service")]
#[command(version)]
#[command(about = "Generates subtitles for media streams in sandboxed transcription containers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the subtitle service
    Server(ServerArgs),

    /// Submit a subtitle generation job
    Generate(GenerateArgs),

    /// Run a local stand-in for the downstream subtitle receiver
    Receiver(ReceiverArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Number of concurrent jobs
    #[arg(long, default_value = "3")]
    parallelism: usize,

    /// Request GPUs for the inference containers
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    hw_accel: bool,

    /// Jobs that may wait in the queue before new requests are rejected
    #[arg(long, default_value = "10")]
    queue_size: usize,

    /// Receiver to push finished subtitles to
    #[arg(long, default_value = "localhost:50053")]
    target: String,

    /// If set, required as gRPC metadata field 'auth' on incoming requests
    /// and attached to outgoing requests
    #[arg(long, env = "SUBTITLE_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    auth_token: String,

    /// Directory for temporary audio tracks and subtitle files
    #[arg(long, default_value = "/tmp/whisper")]
    scratch_dir: PathBuf,

    /// Inference image; "{language}" is replaced by the language code
    #[arg(long, default_value = "ghcr.io/jim60105/whisperx:large-v3-{language}")]
    image: String,

    /// How often to check whether an inference container has finished
    #[arg(long, default_value = "1000")]
    poll_interval_ms: u64,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    #[arg(long, env = "SUBTITLE_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    auth_token: String,

    /// Stream the subtitles belong to
    #[arg(long)]
    stream_id: i32,

    /// URI of the media playlist
    #[arg(long)]
    source: String,

    /// en/English or de/Deutsch/German
    #[arg(long, default_value = "en")]
    language: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
struct ReceiverArgs {
    #[arg(long, default_value = "50053")]
    port: u16,

    /// Write the most recent subtitles to this file
    #[arg(long)]
    save_to: Option<PathBuf>,

    #[arg(long, env = "SUBTITLE_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    auth_token: String,
}

#[derive(Serialize)]
struct GenerateOutput {
    accepted: bool,
    stream_id: i32,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;

    let config = ServiceConfig {
        listen_addr,
        parallelism: args.parallelism,
        queue_capacity: args.queue_size,
        target: args.target,
        auth_token: None,
        scratch_dir: args.scratch_dir,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        engine: EngineConfig {
            image_template: args.image,
            hw_accel: args.hw_accel,
            ..EngineConfig::default()
        },
    }
    .with_auth_token(args.auth_token);

    if config.auth_token.is_none() {
        tracing::warn!("No auth token configured, accepting unauthenticated requests");
    }

    let shutdown = install_shutdown_handler()?;
    SubtitleService::new(config)?.run(shutdown).await?;
    Ok(())
}

async fn run_receiver(args: ReceiverArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    let shutdown = install_shutdown_handler()?;

    let token = Some(args.auth_token.as_str()).filter(|t| !t.is_empty());
    GrpcServer::new(AuthGate::new(token))
        .serve_receiver(listener, ReceiverService::new(args.save_to), async move {
            shutdown.cancelled().await
        })
        .await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(args.addr.clone())?.connect().await?;
    let mut client = SubtitleGeneratorClient::new(channel);

    let mut request = Request::new(GenerateRequest {
        stream_id: args.stream_id,
        source: args.source,
        language: args.language.clone(),
    });
    if !args.auth_token.is_empty() {
        attach_token(&mut request, &args.auth_token)?;
    }

    let result = client.generate(request).await;
    let output = GenerateOutput {
        accepted: result.is_ok(),
        stream_id: args.stream_id,
        language: args.language,
        code: result.as_ref().err().map(|s| format!("{:?}", s.code())),
        error: result.as_ref().err().map(|s| s.message().to_string()),
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => match &result {
            Ok(_) => {
                println!("Job queued successfully!");
                println!("Stream ID: {}", output.stream_id);
            }
            Err(status) => {
                eprintln!("Error: Generate failed ({:?}): {}", status.code(), status.message());
            }
        },
    }

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            init_tracing();
            run_server(server_args).await?;
        }
        Commands::Generate(generate_args) => {
            handle_generate(generate_args).await?;
        }
        Commands::Receiver(receiver_args) => {
            init_tracing();
            run_receiver(receiver_args).await?;
        }
    }

    Ok(())
}
