// Error taxonomy for the uploader. Every failure is handed back to the
// caller; nothing here is retried.

use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The local file is missing or is not a regular file. No network call
    /// was made.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be opened for reading.
    #[error("cannot read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credential string cannot be sent as an HTTP header value.
    #[error("invalid credential header `{0}`")]
    InvalidCredentials(&'static str),

    /// The gateway answered with something other than 200.
    #[error("pinning failed with status {status}: {body}")]
    HttpFailure { status: u16, body: String },

    /// DNS, TLS, connection, timeout or body read fault.
    #[error("transport error: {cause}")]
    Transport { cause: String },

    /// The gateway answered 200 but the body is not the expected JSON.
    #[error("unexpected pinning response: {cause}")]
    ProtocolViolation { cause: String },
}

impl UploadError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        UploadError::Transport {
            cause: describe(&err),
        }
    }

    pub(crate) fn protocol(cause: impl Into<String>) -> Self {
        UploadError::ProtocolViolation {
            cause: cause.into(),
        }
    }

    /// True for transport faults, including a malformed success body.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            UploadError::Transport { .. } | UploadError::ProtocolViolation { .. }
        )
    }

    /// HTTP status for gateway rejections.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::HttpFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Flatten an error and its sources into one line, so the root cause
/// (e.g. "connection reset by peer") is not hidden behind reqwest's summary.
fn describe(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = inner.source();
    }
    out
}
