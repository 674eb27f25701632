//! Per-stream driver: spawn the agent and turn its output into an ordered
//! event channel.
//!
//! All reading, sanitizing, assembly and translation for one stream happens
//! on a single task, so events reach the consumer in output order. Every
//! path through the driver ends in exactly one `done`.

use std::ffi::OsStr;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::assembler::LineAssembler;
use super::attachments::{prepare_attachments, AttachmentError};
use super::cancel::{CancellationController, DEFAULT_TERMINATE_GRACE};
use super::command::{AgentCommandBuilder, StreamRequest};
use super::events::ProtocolEvent;
use super::launcher::{
    build_env, resolve_agent_binary, select_strategy, AgentProcess, LaunchSpec, SpawnStrategy,
};
use super::translator::{exit_event, spawn_failure_event, stderr_event, EventTranslator};
use crate::config::BridgeConfig;

/// Default buffer size for the event channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

const READ_BUFFER_SIZE: usize = 8192;

/// Launches agent streams with one spawn strategy chosen at construction.
#[derive(Debug, Clone)]
pub struct AgentBridge {
    config: Arc<BridgeConfig>,
    strategy: Arc<dyn SpawnStrategy>,
    grace: Duration,
}

impl AgentBridge {
    /// Create a bridge, selecting the spawn strategy from the config.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let strategy = select_strategy(config.agent.spawn_strategy);
        Self::with_strategy(config, strategy)
    }

    /// Create a bridge with an explicit spawn strategy.
    #[must_use]
    pub fn with_strategy(config: BridgeConfig, strategy: Arc<dyn SpawnStrategy>) -> Self {
        Self {
            config: Arc::new(config),
            strategy,
            grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    /// Set the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The bridge configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The selected spawn strategy.
    #[must_use]
    pub fn strategy(&self) -> &dyn SpawnStrategy {
        self.strategy.as_ref()
    }

    /// Materialize attachments and build the launch spec for `request`.
    ///
    /// # Errors
    ///
    /// Returns `AttachmentError` if an attachment cannot be written.
    pub async fn prepare(&self, request: &StreamRequest) -> Result<LaunchSpec, AttachmentError> {
        let work_dir = request.resolved_work_dir();
        let attachments =
            prepare_attachments(&request.attachments, &work_dir, &self.config.uploads.dir_name)
                .await?;
        let args = AgentCommandBuilder::from_request(request, &work_dir, &attachments).build_args();

        let env = build_env(&self.config.agent);
        let path = env.get(OsStr::new("PATH")).cloned().unwrap_or_default();
        let program = resolve_agent_binary(&self.config.agent, &path);

        Ok(LaunchSpec::new(program, args, work_dir).with_env(env))
    }

    /// Start streaming `request`. Must be called within a Tokio runtime.
    ///
    /// Dropping the returned stream cancels the agent.
    #[must_use]
    pub fn stream(&self, request: StreamRequest) -> ReceiverStream<ProtocolEvent> {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let bridge = self.clone();

        tokio::spawn(async move {
            let cancel = request
                .cancel
                .as_ref()
                .map_or_else(CancellationToken::new, CancellationToken::child_token);
            let mut sink = EventSink::new(tx);

            match bridge.prepare(&request).await {
                Ok(spec) => {
                    let controller = CancellationController::new(cancel, bridge.grace);
                    run_process(bridge.strategy.as_ref(), &spec, controller, &mut sink).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to prepare agent request");
                    sink.emit(ProtocolEvent::error(e.to_string())).await;
                }
            }

            sink.emit(ProtocolEvent::done()).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Stream a prepared launch spec directly. Must be called within a Tokio
/// runtime.
#[must_use]
pub fn stream_launch(
    strategy: Arc<dyn SpawnStrategy>,
    spec: LaunchSpec,
    cancel: CancellationToken,
    grace: Duration,
) -> ReceiverStream<ProtocolEvent> {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);

    tokio::spawn(async move {
        let mut sink = EventSink::new(tx);
        let controller = CancellationController::new(cancel.child_token(), grace);
        run_process(strategy.as_ref(), &spec, controller, &mut sink).await;
        sink.emit(ProtocolEvent::done()).await;
    });

    ReceiverStream::new(rx)
}

/// Ordered event output that notices when the consumer goes away.
struct EventSink {
    tx: mpsc::Sender<ProtocolEvent>,
    consumer_gone: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ProtocolEvent>) -> Self {
        Self {
            tx,
            consumer_gone: false,
        }
    }

    async fn emit(&mut self, event: ProtocolEvent) {
        if self.consumer_gone {
            return;
        }
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event consumer dropped");
            self.consumer_gone = true;
        }
    }
}

/// Spawn and pump one process. Emits everything except the final `done`.
async fn run_process(
    strategy: &dyn SpawnStrategy,
    spec: &LaunchSpec,
    mut controller: CancellationController,
    sink: &mut EventSink,
) {
    if controller.is_cancelled() {
        tracing::debug!("Stream cancelled before spawn");
        return;
    }

    let mut process = match AgentProcess::spawn(strategy, spec) {
        Ok(process) => process,
        Err(e) => {
            tracing::warn!(error = %e, program = %spec.program.display(), "Failed to spawn agent");
            sink.emit(spawn_failure_event(&e)).await;
            return;
        }
    };

    let mut stdout = process.take_stdout();
    let mut stderr = process.take_stderr();
    let mut assembler = LineAssembler::new();
    let mut translator = EventTranslator::new();
    let mut out_buf = vec![0u8; READ_BUFFER_SIZE];
    let mut err_buf = vec![0u8; READ_BUFFER_SIZE];

    while stdout.is_some() || stderr.is_some() {
        if sink.consumer_gone && !controller.is_cancelled() {
            controller.token().cancel();
        }
        let deadline = controller.escalation_deadline();

        tokio::select! {
            read = read_some(&mut stdout, &mut out_buf) => match read {
                Ok(0) => stdout = None,
                Ok(n) => {
                    for line in assembler.push(&out_buf[..n]) {
                        if let Some(event) = translator.translate_line(&line) {
                            sink.emit(event).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Agent stdout closed with error");
                    stdout = None;
                }
            },
            read = read_some(&mut stderr, &mut err_buf) => match read {
                Ok(0) => stderr = None,
                Ok(n) if controller.is_terminating() => {
                    tracing::trace!(bytes = n, "Dropping stderr from terminating agent");
                }
                Ok(n) => {
                    if let Some(event) = stderr_event(&err_buf[..n]) {
                        sink.emit(event).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Agent stderr closed with error");
                    stderr = None;
                }
            },
            () = controller.token().cancelled(), if !controller.is_terminating() => {
                controller.terminate(&mut process);
            }
            () = sink.tx.closed(), if !sink.consumer_gone => {
                tracing::debug!("Event consumer dropped, cancelling stream");
                sink.consumer_gone = true;
            }
            () = sleep_until(deadline), if deadline.is_some() => {
                controller.escalate(&mut process);
            }
        }
    }

    for line in assembler.finish() {
        if let Some(event) = translator.translate_line(&line) {
            sink.emit(event).await;
        }
    }

    // The pipes can close long before the process exits.
    let waited = loop {
        if sink.consumer_gone && !controller.is_cancelled() {
            controller.token().cancel();
        }
        let deadline = controller.escalation_deadline();

        tokio::select! {
            waited = process.wait() => break waited,
            () = controller.token().cancelled(), if !controller.is_terminating() => {
                controller.terminate(&mut process);
            }
            () = sink.tx.closed(), if !sink.consumer_gone => {
                tracing::debug!("Event consumer dropped, cancelling stream");
                sink.consumer_gone = true;
            }
            () = sleep_until(deadline), if deadline.is_some() => {
                controller.escalate(&mut process);
            }
        }
    };

    let code = match waited {
        Ok(status) => {
            tracing::info!(status = %status, cancelled = controller.is_cancelled(), "Agent process exited");
            status.code()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for agent process");
            None
        }
    };

    if let Some(event) = exit_event(code) {
        sink.emit(event).await;
    }
}

/// Read from an optional pipe; a closed pipe never resolves.
async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
