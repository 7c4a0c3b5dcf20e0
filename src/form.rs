// Multipart body for `pinFileToIPFS`: the file as a streamed part plus the
// two JSON fields the gateway reads its options from.

use crate::error::UploadError;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde_json::json;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Value of the `pinataMetadata` part.
pub fn metadata_json(name: &str, description: &str) -> String {
    json!({
        "name": name,
        "keyvalues": { "description": description },
    })
    .to_string()
}

/// Value of the `pinataOptions` part.
pub fn options_json(cid_version: u8) -> String {
    json!({ "cidVersion": cid_version }).to_string()
}

/// Open `path` and wrap it in a streaming part named after the file.
/// `released` is bumped when the underlying handle is dropped.
pub(crate) async fn file_part(
    path: &Path,
    released: Option<Arc<AtomicUsize>>,
) -> Result<Part, UploadError> {
    let (stream, len) = FileStream::open(path, released).await?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();

    Part::stream_with_length(Body::wrap_stream(stream), len)
        .file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(UploadError::transport)
}

pub(crate) fn build(file: Part, name: &str, description: &str, cid_version: u8) -> Form {
    Form::new()
        .part("file", file)
        .text("pinataMetadata", metadata_json(name, description))
        .text("pinataOptions", options_json(cid_version))
}

/// Chunked reader over an open file. Memory use is bounded by the
/// reader's chunk size; the handle closes when this value is dropped,
/// which reqwest does once the body is sent or the request fails.
pub struct FileStream {
    inner: ReaderStream<File>,
    released: Option<Arc<AtomicUsize>>,
}

impl FileStream {
    pub async fn open(
        path: &Path,
        released: Option<Arc<AtomicUsize>>,
    ) -> Result<(Self, u64), UploadError> {
        let unreadable = |source: io::Error| UploadError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).await.map_err(unreadable)?;
        let len = file.metadata().await.map_err(unreadable)?.len();
        debug!(path = %path.display(), len, "opened file for upload");
        Ok((
            FileStream {
                inner: ReaderStream::new(file),
                released,
            },
            len,
        ))
    }
}

impl Stream for FileStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        debug!("released upload file handle");
        if let Some(counter) = &self.released {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}
