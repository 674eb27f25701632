//! File attachments carried by a stream request.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Default name of the per-workspace directory holding materialized uploads.
pub const DEFAULT_UPLOAD_DIR: &str = ".agent-uploads";

/// Accepts padded and unpadded input alike.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Error type for attachment materialization.
#[derive(thiserror::Error, Debug)]
pub enum AttachmentError {
    /// The inline payload was not valid base64.
    #[error("Attachment {name} is not valid base64: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    /// Writing the attachment to disk failed.
    #[error("Failed to write attachment to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Original file name as supplied by the client.
    pub name: String,
    /// Declared MIME type.
    #[serde(rename = "type", default)]
    pub mime_type: String,
    /// Inline base64 payload.
    #[serde(default)]
    pub data: String,
    /// Path of an already persisted copy, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl FileAttachment {
    /// Create an attachment from an inline base64 payload.
    #[must_use]
    pub fn inline(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
            file_path: None,
        }
    }

    /// Create an attachment that already lives on disk.
    #[must_use]
    pub fn persisted(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: String::new(),
            file_path: Some(path.into()),
        }
    }

    /// Whether the declared type is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A non-image attachment resolved to a path the agent can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Original file name.
    pub name: String,
    /// Path on disk.
    pub path: PathBuf,
}

/// Attachments split by how the agent will see them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedAttachments {
    /// Non-image attachments, in request order.
    pub files: Vec<ResolvedAttachment>,
    /// Number of image attachments, which the agent cannot read in print mode.
    pub image_count: usize,
}

/// Resolve attachments, writing inline non-image payloads under
/// `work_dir/upload_dir`.
///
/// Images are counted but never written. The upload directory is only
/// created when at least one attachment needs it.
///
/// # Errors
///
/// Returns `AttachmentError` if a payload cannot be decoded or written.
pub async fn prepare_attachments(
    attachments: &[FileAttachment],
    work_dir: &Path,
    upload_dir: &str,
) -> Result<PreparedAttachments, AttachmentError> {
    let mut prepared = PreparedAttachments::default();
    let mut created_dir: Option<PathBuf> = None;

    for attachment in attachments {
        if attachment.is_image() {
            prepared.image_count += 1;
            continue;
        }

        let path = if let Some(path) = &attachment.file_path {
            path.clone()
        } else {
            let dir = match &created_dir {
                Some(dir) => dir.clone(),
                None => {
                    let dir = work_dir.join(upload_dir);
                    tokio::fs::create_dir_all(&dir)
                        .await
                        .map_err(|source| AttachmentError::Io {
                            path: dir.clone(),
                            source,
                        })?;
                    created_dir = Some(dir.clone());
                    dir
                }
            };
            write_attachment(attachment, &dir).await?
        };

        prepared.files.push(ResolvedAttachment {
            name: attachment.name.clone(),
            path,
        });
    }

    Ok(prepared)
}

async fn write_attachment(
    attachment: &FileAttachment,
    dir: &Path,
) -> Result<PathBuf, AttachmentError> {
    let bytes = decode_payload(&attachment.data).map_err(|source| AttachmentError::Decode {
        name: attachment.name.clone(),
        source,
    })?;

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("{millis}-{}", safe_file_name(&attachment.name)));

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| AttachmentError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::debug!(name = %attachment.name, path = %path.display(), "Materialized attachment");
    Ok(path)
}

/// Decode an inline payload the way browsers and Node produce it: line
/// wrapped, URL-safe or missing its padding are all accepted.
///
/// # Errors
///
/// Returns `DecodeError` if the payload is not base64 at all.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    LENIENT_BASE64.decode(normalized)
}

/// Base name of `name` with anything outside `[A-Za-z0-9._-]` replaced by `_`.
#[must_use]
pub fn safe_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map_or_else(|| name.to_string(), |n| n.to_string_lossy().into_owned());

    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
