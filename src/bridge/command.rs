//! Stream requests and agent command-line construction.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::attachments::{FileAttachment, PreparedAttachments};

/// How the agent should treat actions that need confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermissionMode {
    /// Ask before acting.
    Default,
    /// Plan only, no edits.
    Plan,
    /// Any other mode name. Not forwarded to the agent.
    Other(String),
}

impl PermissionMode {
    /// The `--mode` value understood by the agent, if any.
    #[must_use]
    pub fn agent_mode(&self) -> Option<&'static str> {
        match self {
            Self::Default => Some("ask"),
            Self::Plan => Some("plan"),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for PermissionMode {
    fn from(value: &str) -> Self {
        match value {
            "default" => Self::Default,
            "plan" => Self::Plan,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for PermissionMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<PermissionMode> for String {
    fn from(mode: PermissionMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Plan => f.write_str("plan"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// One prompt to stream through the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// User prompt.
    pub prompt: String,
    /// Agent session to resume.
    #[serde(default, alias = "sdkSessionId")]
    pub resume_session_id: Option<String>,
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Extra context wrapped around the prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Working directory. Defaults to the home directory.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Permission mode.
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    /// Attached files, in order.
    #[serde(default, alias = "files")]
    pub attachments: Vec<FileAttachment>,
    /// Cancels the stream and terminates the agent.
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl StreamRequest {
    /// Create a request with just a prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Resume an existing agent session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }

    /// Select a model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system context.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the permission mode.
    #[must_use]
    pub fn permission_mode(mut self, mode: impl Into<PermissionMode>) -> Self {
        self.permission_mode = Some(mode.into());
        self
    }

    /// Attach a file.
    #[must_use]
    pub fn attach(mut self, attachment: FileAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Bind a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The directory the agent runs in.
    #[must_use]
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.working_directory
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Builder for the agent's argument vector.
#[derive(Debug, Clone, Default)]
pub struct AgentCommandBuilder {
    prompt: String,
    workspace: PathBuf,
    resume_session: Option<String>,
    model: Option<String>,
    permission_mode: Option<PermissionMode>,
}

impl AgentCommandBuilder {
    /// Create a builder with the final prompt text.
    #[must_use]
    pub fn new(prompt: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    /// Build from a request whose attachments have already been prepared.
    #[must_use]
    pub fn from_request(
        request: &StreamRequest,
        work_dir: impl Into<PathBuf>,
        attachments: &PreparedAttachments,
    ) -> Self {
        let prompt = compose_prompt(
            &request.prompt,
            attachments,
            non_empty(request.system_prompt.as_deref()),
        );

        let mut builder = Self::new(prompt, work_dir);
        if let Some(session_id) = non_empty(request.resume_session_id.as_deref()) {
            builder = builder.resume(session_id);
        }
        if let Some(model) = non_empty(request.model.as_deref()) {
            builder = builder.model(model);
        }
        if let Some(mode) = &request.permission_mode {
            builder = builder.permission_mode(mode.clone());
        }
        builder
    }

    /// Resume an existing session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session = Some(session_id.into());
        self
    }

    /// Select a model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the permission mode.
    #[must_use]
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    /// Get the final prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Get the workspace directory.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Build the command-line arguments. The prompt is always last.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--stream-partial-output".to_string(),
            "--trust".to_string(),
            "--workspace".to_string(),
            self.workspace.to_string_lossy().into_owned(),
        ];

        if let Some(session_id) = &self.resume_session {
            args.push("--resume".to_string());
            args.push(session_id.clone());
        }

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(mode) = self.permission_mode.as_ref().and_then(PermissionMode::agent_mode) {
            args.push("--mode".to_string());
            args.push(mode.to_string());
        }

        args.push(self.prompt.clone());
        args
    }
}

/// Compose the prompt the agent receives.
///
/// File references come first, then the image note, then the system context
/// as the outermost wrapper.
#[must_use]
pub fn compose_prompt(
    prompt: &str,
    attachments: &PreparedAttachments,
    system_prompt: Option<&str>,
) -> String {
    let mut composed = prompt.to_string();

    if !attachments.files.is_empty() {
        let references = attachments
            .files
            .iter()
            .map(|file| {
                format!(
                    "[User attached file: {} ({})]",
                    file.path.display(),
                    file.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        composed = format!(
            "{references}\n\nPlease read the attached file(s) above, then respond to the user's message:\n\n{composed}"
        );
    }

    if attachments.image_count > 0 {
        composed = format!(
            "[Note: {} image(s) were attached but cannot be displayed in CLI mode.]\n\n{composed}",
            attachments.image_count
        );
    }

    if let Some(system_prompt) = system_prompt {
        composed = format!("[System context: {system_prompt}]\n\n{composed}");
    }

    composed
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
