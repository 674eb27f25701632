//! Agent process spawning.
//!
//! The agent writes one JSON object per line, but like most line-oriented
//! programs it fully buffers stdout when stdout is a pipe. On Unix-like
//! systems the process is therefore started under `script(1)`, which gives
//! it a pseudo-terminal and line-buffered output. Elsewhere it is spawned
//! directly and output arrives in larger bursts.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::config::AgentConfig;

/// Binary name used when nothing better is found.
pub const DEFAULT_AGENT_BINARY: &str = "agent";

/// Timeout for `agent --version`.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Agent binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Everything needed to start the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Resolved agent binary.
    pub program: PathBuf,
    /// Argument vector, prompt last.
    pub args: Vec<String>,
    /// Complete child environment.
    pub env: BTreeMap<OsString, OsString>,
    /// Working directory.
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// Create a spec with the inherited environment.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            env: std::env::vars_os().collect(),
            cwd: cwd.into(),
        }
    }

    /// Replace the environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<OsString, OsString>) -> Self {
        self.env = env;
        self
    }

    /// Program and arguments as one POSIX shell command line.
    #[must_use]
    pub fn shell_command(&self) -> String {
        std::iter::once(shell_escape(&self.program.to_string_lossy()))
            .chain(self.args.iter().map(|arg| shell_escape(arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote `s` as a single POSIX shell word.
///
/// Each `'` becomes `'"'"'`: close the quote, emit a double-quoted `'`,
/// reopen.
#[must_use]
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Which spawn strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnStrategyKind {
    /// PTY wrapper where the platform has one, direct spawn otherwise.
    #[default]
    Auto,
    /// Always use the platform's `script` wrapper.
    Script,
    /// Always spawn the binary directly.
    Direct,
}

/// Turns a launch spec into a command for one platform family.
pub trait SpawnStrategy: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Program and arguments to execute. Environment, working directory and
    /// stdio are applied by the caller.
    fn command(&self, spec: &LaunchSpec) -> Command;
}

/// util-linux `script -qec "<command>" /dev/null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxScript;

impl SpawnStrategy for LinuxScript {
    fn name(&self) -> &'static str {
        "script-linux"
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new("script");
        cmd.arg("-qec").arg(spec.shell_command()).arg("/dev/null");
        cmd
    }
}

/// BSD `script -q /dev/null bash -c "<command>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsdScript;

impl SpawnStrategy for BsdScript {
    fn name(&self) -> &'static str {
        "script-bsd"
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new("script");
        cmd.args(["-q", "/dev/null", "bash", "-c"])
            .arg(spec.shell_command());
        cmd
    }
}

/// Spawn the binary directly with its argument vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSpawn;

impl SpawnStrategy for DirectSpawn {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd
    }
}

/// Pick the strategy for this platform.
#[must_use]
pub fn select_strategy(kind: SpawnStrategyKind) -> Arc<dyn SpawnStrategy> {
    let strategy: Arc<dyn SpawnStrategy> = match kind {
        SpawnStrategyKind::Direct => Arc::new(DirectSpawn),
        SpawnStrategyKind::Script => platform_script().unwrap_or_else(|| {
            tracing::warn!("No script wrapper on this platform, spawning directly");
            Arc::new(DirectSpawn)
        }),
        SpawnStrategyKind::Auto => {
            let has_script = std::env::var_os("PATH")
                .and_then(|path| find_in_path("script", &path))
                .is_some();
            match platform_script() {
                Some(script) if has_script => script,
                _ => Arc::new(DirectSpawn),
            }
        }
    };
    tracing::debug!(strategy = strategy.name(), "Selected spawn strategy");
    strategy
}

fn platform_script() -> Option<Arc<dyn SpawnStrategy>> {
    if cfg!(target_os = "linux") {
        Some(Arc::new(LinuxScript))
    } else if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    )) {
        Some(Arc::new(BsdScript))
    } else {
        None
    }
}

/// A running agent process.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn the agent described by `spec` using `strategy`.
    ///
    /// On Unix the child leads its own process group so that cancellation
    /// reaches the wrapper and everything it started.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(strategy: &dyn SpawnStrategy, spec: &LaunchSpec) -> Result<Self, SpawnError> {
        let mut cmd = strategy.command(spec);
        cmd.env_clear()
            .envs(&spec.env)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(SpawnError::from_io)?;

        tracing::info!(
            strategy = strategy.name(),
            program = %spec.program.display(),
            cwd = %spec.cwd.display(),
            pid = child.id(),
            "Spawned agent process"
        );

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Send a kill to the direct child without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

/// Extra directories appended to PATH when missing. `~` is the home dir.
const USER_PATH_DIRS: &[&str] = &[
    "~/.local/bin",
    "~/.cargo/bin",
    "~/.npm-global/bin",
    "~/bin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
];

/// Inherited PATH followed by common user-local install locations and
/// `extra`, without duplicates.
#[must_use]
pub fn expanded_path(current: Option<&OsStr>, home: Option<&Path>, extra: &[PathBuf]) -> OsString {
    let mut entries: Vec<PathBuf> = current
        .map(|path| std::env::split_paths(path).collect())
        .unwrap_or_default();

    let defaults = USER_PATH_DIRS.iter().filter_map(|dir| match dir.strip_prefix("~/") {
        Some(rest) => home.map(|home| home.join(rest)),
        None => Some(PathBuf::from(dir)),
    });

    for candidate in defaults.chain(extra.iter().cloned()) {
        if !entries.contains(&candidate) {
            entries.push(candidate);
        }
    }

    std::env::join_paths(&entries)
        .unwrap_or_else(|_| current.map(OsStr::to_os_string).unwrap_or_default())
}

/// Name of the home-directory variable on this platform.
#[must_use]
pub fn home_var() -> &'static str {
    if cfg!(windows) {
        "USERPROFILE"
    } else {
        "HOME"
    }
}

/// Child environment: inherited variables, expanded PATH, home set,
/// `TERM=dumb`.
#[must_use]
pub fn build_env(config: &AgentConfig) -> BTreeMap<OsString, OsString> {
    let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    let home = dirs::home_dir();

    let path = expanded_path(
        env.get(OsStr::new("PATH")).map(OsString::as_os_str),
        home.as_deref(),
        &config.extra_path,
    );
    env.insert("PATH".into(), path);

    if let Some(home) = home {
        env.entry(home_var().into())
            .or_insert_with(|| home.into_os_string());
    }

    env.insert("TERM".into(), "dumb".into());
    env
}

/// Find an executable named `name` in a PATH-style list.
#[must_use]
pub fn find_in_path(name: &str, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file() || path.with_extension("cmd").is_file()
}

/// Locate the agent: configured path, then configured names on `path`.
#[must_use]
pub fn find_agent_binary(config: &AgentConfig, path: &OsStr) -> Option<PathBuf> {
    if let Some(binary) = &config.binary {
        return Some(binary.clone());
    }
    config
        .binary_names
        .iter()
        .find_map(|name| find_in_path(name, path))
}

/// Like [`find_agent_binary`], falling back to the bare default name.
#[must_use]
pub fn resolve_agent_binary(config: &AgentConfig, path: &OsStr) -> PathBuf {
    find_agent_binary(config, path).unwrap_or_else(|| {
        tracing::debug!("Agent binary not found on PATH, using bare name");
        PathBuf::from(DEFAULT_AGENT_BINARY)
    })
}

/// Whether the agent is installed and answers `--version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// True when a version was reported.
    pub connected: bool,
    /// First line of `--version` output.
    pub version: Option<String>,
}

impl AgentStatus {
    fn disconnected() -> Self {
        Self {
            connected: false,
            version: None,
        }
    }
}

/// Run `<agent> --version` with the bridge's environment.
pub async fn probe_agent(config: &AgentConfig) -> AgentStatus {
    let env = build_env(config);
    let path = env.get(OsStr::new("PATH")).cloned().unwrap_or_default();
    let Some(binary) = find_agent_binary(config, &path) else {
        return AgentStatus::disconnected();
    };

    let output = Command::new(&binary)
        .arg("--version")
        .env_clear()
        .envs(&env)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string);
            AgentStatus {
                connected: version.is_some(),
                version,
            }
        }
        Ok(Ok(output)) => {
            tracing::debug!(status = %output.status, "Agent --version failed");
            AgentStatus::disconnected()
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, binary = %binary.display(), "Failed to run agent");
            AgentStatus::disconnected()
        }
        Err(_) => {
            tracing::warn!(binary = %binary.display(), "Agent --version timed out");
            AgentStatus::disconnected()
        }
    }
}
