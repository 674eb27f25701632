//! Agent Bridge - Stream a JSON-emitting agent CLI as normalized events.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_bridge::bridge::{
    probe_agent, AgentBridge, EventKind, FileAttachment, SpawnStrategyKind, StreamRequest,
};
use agent_bridge::config::{BridgeConfig, ConfigLoader};
use agent_bridge::display;
use agent_bridge::server::BridgeServer;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Auto,
    Script,
    Direct,
}

impl From<StrategyArg> for SpawnStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => SpawnStrategyKind::Auto,
            StrategyArg::Script => SpawnStrategyKind::Script,
            StrategyArg::Direct => SpawnStrategyKind::Direct,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "agent-bridge",
    about = "Stream a JSON-emitting agent CLI as normalized events",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream one prompt and print events to stdout.
    Run {
        /// The prompt to send.
        prompt: String,
        /// Model identifier.
        #[arg(short, long)]
        model: Option<String>,
        /// Agent session to resume.
        #[arg(short, long)]
        resume: Option<String>,
        /// Working directory for the agent.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Permission mode (default, plan).
        #[arg(long)]
        mode: Option<String>,
        /// Extra context prepended to the prompt.
        #[arg(long)]
        system_prompt: Option<String>,
        /// Files to attach.
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,
        /// Override the spawn strategy.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Render events for a terminal instead of SSE frames.
        #[arg(long)]
        pretty: bool,
        /// Do not truncate long values in pretty output.
        #[arg(long, requires = "pretty")]
        raw: bool,
    },
    /// Serve the bridge over HTTP.
    Serve {
        /// Host address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check whether the agent is installed.
    Status,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Attach a local file by path; images are recognized by extension.
fn attachment_for(path: &Path) -> FileAttachment {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let mime_type = match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    FileAttachment::persisted(name, mime_type, path)
}

async fn run_prompt(bridge: AgentBridge, request: StreamRequest, pretty: bool, raw: bool) -> ExitCode {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling agent");
            ctrl_c.cancel();
        }
    });

    let mut events = bridge.stream(request.with_cancellation(cancel));
    let mut saw_error = false;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        saw_error |= event.kind == EventKind::Error;
        if pretty {
            display::print_event(&event, raw);
        } else if stdout
            .write_all(event.to_sse_frame().as_bytes())
            .and_then(|()| stdout.flush())
            .is_err()
        {
            tracing::debug!("stdout closed, stopping");
            break;
        }
    }

    if saw_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config: BridgeConfig = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run {
            prompt,
            model,
            resume,
            cwd,
            mode,
            system_prompt,
            attachments,
            strategy,
            pretty,
            raw,
        } => {
            if let Some(strategy) = strategy {
                config.agent.spawn_strategy = strategy.into();
            }

            let mut request = StreamRequest::new(prompt);
            request.model = model;
            request.resume_session_id = resume;
            request.working_directory = cwd;
            request.system_prompt = system_prompt;
            request.permission_mode = mode.map(Into::into);
            request.attachments = attachments.iter().map(|p| attachment_for(p)).collect();

            let bridge = AgentBridge::new(config);
            tracing::info!(
                strategy = bridge.strategy().name(),
                work_dir = %request.resolved_work_dir().display(),
                "Starting agent stream"
            );
            run_prompt(bridge, request, pretty, raw).await
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
            });

            match BridgeServer::new(AgentBridge::new(config), cancel).run().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "Server failed");
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Status => {
            let status = probe_agent(&config.agent).await;
            display::print_agent_status(&status);
            if status.connected {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
