//! Binding a cancellation token to agent termination.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::launcher::AgentProcess;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How a termination request was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited.
    AlreadyExited,
    /// The whole process group was signalled.
    Group,
    /// Only the direct child was signalled.
    Child,
    /// No signal could be delivered.
    Failed,
}

/// Terminates the agent when its stream is cancelled.
///
/// Termination is a request, not an outcome: the stream keeps draining
/// output until the process actually exits, and exit handling is the same
/// as for a natural exit.
#[derive(Debug)]
pub struct CancellationController {
    token: CancellationToken,
    grace: Duration,
    terminated_at: Option<Instant>,
    escalated: bool,
}

impl CancellationController {
    /// Create a controller for `token`.
    #[must_use]
    pub fn new(token: CancellationToken, grace: Duration) -> Self {
        Self {
            token,
            grace,
            terminated_at: None,
            escalated: false,
        }
    }

    /// The bound token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Check if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check if a termination signal has already been sent.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.terminated_at.is_some()
    }

    /// When to escalate to SIGKILL, if termination is pending.
    #[must_use]
    pub fn escalation_deadline(&self) -> Option<Instant> {
        if self.escalated {
            return None;
        }
        self.terminated_at.map(|at| at + self.grace)
    }

    /// Ask the process (group) to terminate with SIGTERM.
    pub fn terminate(&mut self, process: &mut AgentProcess) -> Termination {
        self.terminated_at = Some(Instant::now());
        let outcome = signal(process, false);
        tracing::info!(pid = process.id(), outcome = ?outcome, "Terminating agent process");
        outcome
    }

    /// Kill the process (group) after the grace period ran out.
    pub fn escalate(&mut self, process: &mut AgentProcess) -> Termination {
        self.escalated = true;
        let outcome = signal(process, true);
        tracing::warn!(pid = process.id(), outcome = ?outcome, "Agent ignored SIGTERM, killing");
        outcome
    }
}

#[cfg(unix)]
fn signal(process: &mut AgentProcess, force: bool) -> Termination {
    use nix::sys::signal::{kill, killpg, Signal};

    if matches!(process.try_wait(), Ok(Some(_))) {
        return Termination::AlreadyExited;
    }
    let Some(pid) = process.id() else {
        return Termination::AlreadyExited;
    };

    let sig = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let Some(nix_pid) = group_pid(pid) else {
        tracing::warn!(pid, "Agent pid does not fit a process id, not signalling");
        return Termination::Failed;
    };

    // The child leads its own group, so its pid is the pgid.
    match killpg(nix_pid, sig) {
        Ok(()) => Termination::Group,
        Err(e) => {
            tracing::debug!(error = %e, pid, "Process group signal failed, signalling child");
            if kill(nix_pid, sig).is_ok() || process.start_kill().is_ok() {
                Termination::Child
            } else {
                Termination::Failed
            }
        }
    }
}

#[cfg(unix)]
fn group_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|&raw| raw > 0)
        .map(nix::unistd::Pid::from_raw)
}

#[cfg(not(unix))]
fn signal(process: &mut AgentProcess, _force: bool) -> Termination {
    if matches!(process.try_wait(), Ok(Some(_))) {
        return Termination::AlreadyExited;
    }
    match process.start_kill() {
        Ok(()) => Termination::Child,
        Err(_) => Termination::Failed,
    }
}
