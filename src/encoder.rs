//! Request encoding: validate a submission and turn it into an
//! [`AnalyzeRequest`], base64-encoding any attached file.
//!
//! Validation is synchronous and happens before any network action. File
//! encoding is asynchronous (the bytes may still be on disk) and must finish
//! before the request is sent; the runtime schedules the send as its
//! continuation.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};

use crate::error::{TransportError, ValidationError};
use crate::protocol::{AnalyzeRequest, FilePayload, Pipeline};

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Already in memory.
    Bytes(Vec<u8>),
    /// Read lazily when the request is encoded.
    Path(PathBuf),
}

/// A user-selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub name: String,
    pub source: FileSource,
}

impl FileAttachment {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        FileAttachment { name: name.into(), source: FileSource::Bytes(bytes) }
    }

    /// Attach a file on disk; its display name is the path's final component.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        FileAttachment { name, source: FileSource::Path(path.to_path_buf()) }
    }

    /// An attachment counts as empty when it has neither a name nor bytes.
    pub fn is_empty(&self) -> bool {
        match &self.source {
            FileSource::Bytes(bytes) => self.name.is_empty() && bytes.is_empty(),
            FileSource::Path(path) => self.name.is_empty() && path.as_os_str().is_empty(),
        }
    }
}

/// A validated submission waiting for its connection to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub pipeline: Pipeline,
    pub text: String,
    pub file: Option<FileAttachment>,
}

impl PendingRequest {
    /// Whether the send has to wait for file encoding.
    pub fn needs_encoding(&self) -> bool {
        self.file.is_some()
    }

    /// Build the outbound request from an already-encoded file (if any).
    pub fn into_request(self, file: Option<FilePayload>) -> AnalyzeRequest {
        AnalyzeRequest { message: self.text, pipeline: self.pipeline, file }
    }
}

/// Check that at least one of text/file is non-empty.
///
/// Text is trimmed; an empty attachment is dropped.
pub fn validate_submission(
    pipeline: Pipeline,
    text: &str,
    file: Option<FileAttachment>,
) -> Result<PendingRequest, ValidationError> {
    let text = text.trim().to_string();
    let file = file.filter(|f| !f.is_empty());
    if text.is_empty() && file.is_none() {
        return Err(ValidationError::EmptySubmission);
    }
    Ok(PendingRequest { pipeline, text, file })
}

/// Base64-encode raw bytes with the standard alphabet.
pub fn encode_bytes(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Read (if needed) and encode an attachment.
pub async fn encode_file(file: &FileAttachment) -> Result<FilePayload, TransportError> {
    let content = match &file.source {
        FileSource::Bytes(bytes) => encode_bytes(bytes),
        FileSource::Path(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| TransportError::FileRead {
                name: file.name.clone(),
                detail: e.to_string(),
            })?;
            encode_bytes(&bytes)
        }
    };
    Ok(FilePayload { filename: file.name.clone(), content })
}

/// Encode a whole pending request, reading its file first when present.
pub async fn encode_request(request: PendingRequest) -> Result<AnalyzeRequest, TransportError> {
    let payload = match &request.file {
        Some(file) => Some(encode_file(file).await?),
        None => None,
    };
    Ok(request.into_request(payload))
}
