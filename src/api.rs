// API client module: one async multipart upload to the Pinata pinning
// gateway. The client holds only immutable state, so a single instance can
// serve any number of concurrent uploads.

use crate::error::UploadError;
use crate::form;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Production gateway.
pub const PINATA_API_URL: &str = "https://api.pinata.cloud";

/// Path of the file pinning endpoint, relative to the gateway URL.
pub const PIN_FILE_PATH: &str = "/pinning/pinFileToIPFS";

/// CID version requested for every upload.
pub const CID_VERSION: u8 = 1;

/// Bound on establishing the TCP/TLS connection. Applied on every client,
/// independent of the optional whole-request timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_HEADER: &str = "pinata_api_key";
const SECRET_KEY_HEADER: &str = "pinata_secret_api_key";

/// What to upload and how to label it on the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub display_name: String,
    pub description: String,
    pub cid_version: u8,
}

impl UploadRequest {
    pub fn new(
        file_path: impl Into<PathBuf>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        UploadRequest {
            file_path: file_path.into(),
            display_name: display_name.into(),
            description: description.into(),
            cid_version: CID_VERSION,
        }
    }
}

/// Static API key pair, forwarded verbatim as request headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Credentials {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, UploadError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| UploadError::InvalidCredentials(API_KEY_HEADER))?;
        let mut secret = HeaderValue::from_str(&self.api_secret)
            .map_err(|_| UploadError::InvalidCredentials(SECRET_KEY_HEADER))?;
        key.set_sensitive(true);
        secret.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);
        headers.insert(HeaderName::from_static(SECRET_KEY_HEADER), secret);
        Ok(headers)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// A successful pin. `payload` is the gateway's JSON response as returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedFile {
    pub cid: String,
    pub payload: Value,
}

impl PinnedFile {
    /// Parse a 200 response body. The body must be JSON with a string
    /// `IpfsHash` field.
    pub fn from_body(body: &str) -> Result<Self, UploadError> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| UploadError::protocol(format!("response is not JSON: {e}")))?;
        let cid = payload
            .get("IpfsHash")
            .and_then(Value::as_str)
            .ok_or_else(|| UploadError::protocol("response has no IpfsHash"))?
            .to_string();
        Ok(PinnedFile { cid, payload })
    }

    pub fn pin_size(&self) -> Option<u64> {
        self.payload.get("PinSize").and_then(Value::as_u64)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.payload.get("Timestamp").and_then(Value::as_str)
    }
}

/// Async client for the pinning gateway.
#[derive(Clone)]
pub struct PinataClient {
    client: Client,
    base_url: String,
}

impl PinataClient {
    /// Build a client for `base_url`. Connecting is always bounded by
    /// `CONNECT_TIMEOUT`. `timeout` bounds the whole round trip, body
    /// streaming included; `None` leaves it unbounded.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, UploadError> {
        let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(UploadError::transport)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(PinataClient { client, base_url })
    }

    /// Full URL of the pinning endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, PIN_FILE_PATH)
    }

    /// Upload one file. Fails with `FileNotFound` before touching the
    /// network when the path is missing or not a regular file.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        credentials: &Credentials,
    ) -> Result<PinnedFile, UploadError> {
        self.upload_tracked(request, credentials, None).await
    }

    pub(crate) async fn upload_tracked(
        &self,
        request: &UploadRequest,
        credentials: &Credentials,
        released: Option<Arc<AtomicUsize>>,
    ) -> Result<PinnedFile, UploadError> {
        ensure_regular_file(&request.file_path).await?;
        let headers = credentials.headers()?;

        let file = form::file_part(&request.file_path, released).await?;
        let body = form::build(
            file,
            &request.display_name,
            &request.description,
            request.cid_version,
        );

        let url = self.endpoint();
        info!(url = %url, file = %request.file_path.display(), "uploading file");

        let res = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "upload request failed");
                UploadError::transport(e)
            })?;

        let status = res.status();
        let text = res.text().await.map_err(UploadError::transport)?;
        debug!(status = status.as_u16(), bytes = text.len(), "response received");

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "gateway rejected upload");
            return Err(UploadError::HttpFailure {
                status: status.as_u16(),
                body: text,
            });
        }

        let pinned = PinnedFile::from_body(&text)?;
        info!(cid = %pinned.cid, "file pinned");
        Ok(pinned)
    }
}

async fn ensure_regular_file(path: &Path) -> Result<(), UploadError> {
    let not_found = || UploadError::FileNotFound {
        path: path.to_path_buf(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(not_found()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
        Err(source) => Err(UploadError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use tokio::net::TcpListener;

    fn fixture(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(contents).unwrap();
        tmp
    }

    fn creds() -> Credentials {
        Credentials::new("key-123", "secret-456")
    }

    // The body is dropped by hyper's connection task, which may run a tick
    // after the response future resolves.
    async fn settled(counter: &AtomicUsize) -> usize {
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn request_defaults_to_cid_version_one() {
        let req = UploadRequest::new("/tmp/a.jpg", "MyFile", "desc");
        assert_eq!(req.cid_version, 1);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let shown = format!("{:?}", creds());
        assert!(!shown.contains("key-123"));
        assert!(!shown.contains("secret-456"));
    }

    #[test]
    fn credentials_with_newline_are_rejected() {
        let bad = Credentials::new("key\n", "secret");
        assert!(matches!(
            bad.headers(),
            Err(UploadError::InvalidCredentials("pinata_api_key"))
        ));
    }

    #[test]
    fn endpoint_joins_base_without_double_slash() {
        let client = PinataClient::new("https://example.test/", None).unwrap();
        assert_eq!(client.endpoint(), "https://example.test/pinning/pinFileToIPFS");
    }

    #[test]
    fn pinned_file_reads_optional_fields() {
        let pinned = PinnedFile::from_body(
            r#"{"IpfsHash":"bafy1","PinSize":42,"Timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(pinned.cid, "bafy1");
        assert_eq!(pinned.pin_size(), Some(42));
        assert_eq!(pinned.timestamp(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn pinned_file_without_hash_is_protocol_violation() {
        let err = PinnedFile::from_body(r#"{"ok":true}"#).unwrap_err();
        assert!(matches!(err, UploadError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn file_handle_released_after_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PIN_FILE_PATH)
            .with_status(200)
            .with_body(r#"{"IpfsHash":"Qm123"}"#)
            .create_async()
            .await;
        let tmp = fixture(b"payload");
        let client = PinataClient::new(server.url(), None).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let pinned = client
            .upload_tracked(
                &UploadRequest::new(tmp.path(), "n", "d"),
                &creds(),
                Some(counter.clone()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(pinned.cid, "Qm123");
        assert_eq!(settled(&counter).await, 1);
    }

    #[tokio::test]
    async fn file_handle_released_after_http_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PIN_FILE_PATH)
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;
        let tmp = fixture(b"payload");
        let client = PinataClient::new(server.url(), None).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let err = client
            .upload_tracked(
                &UploadRequest::new(tmp.path(), "n", "d"),
                &creds(),
                Some(counter.clone()),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(settled(&counter).await, 1);
    }

    #[tokio::test]
    async fn connection_reset_is_transport_error_and_releases_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let tmp = fixture(&vec![7u8; 256 * 1024]);
        let client = PinataClient::new(format!("http://{addr}"), None).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let err = client
            .upload_tracked(
                &UploadRequest::new(tmp.path(), "n", "d"),
                &creds(),
                Some(counter.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport { .. }), "{err:?}");
        assert_eq!(settled(&counter).await, 1);
    }

    #[tokio::test]
    async fn silent_server_times_out_as_transport_and_releases_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Hold every connection open without ever answering.
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let tmp = fixture(b"small payload");
        let client =
            PinataClient::new(format!("http://{addr}"), Some(Duration::from_millis(300))).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let started = std::time::Instant::now();
        let err = client
            .upload_tracked(
                &UploadRequest::new(tmp.path(), "n", "d"),
                &creds(),
                Some(counter.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(settled(&counter).await, 1);
    }

    /// Head plus declared body length of a raw HTTP/1.1 request, once the
    /// head has fully arrived.
    fn request_len(raw: &[u8]) -> Option<usize> {
        let head_end = raw.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
        let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))?
            .trim()
            .parse::<usize>()
            .ok()?;
        Some(head_end + body_len)
    }

    #[tokio::test]
    async fn slow_upload_without_timeout_is_not_cut_off() {
        // The server drains the body slowly, so streaming takes well over a
        // second; with no request timeout the upload must still complete.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let payload = vec![3u8; 2 * 1024 * 1024];
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                seen.extend_from_slice(&buf[..n]);
                if let Some(total) = request_len(&seen) {
                    if seen.len() >= total {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            let body = r#"{"IpfsHash":"QmSlow"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let tmp = fixture(&payload);
        let client = PinataClient::new(format!("http://{addr}"), None).unwrap();

        let started = std::time::Instant::now();
        let pinned = client
            .upload(&UploadRequest::new(tmp.path(), "n", "d"), &creds())
            .await
            .unwrap();

        assert_eq!(pinned.cid, "QmSlow");
        assert!(started.elapsed() > Duration::from_millis(500));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_parent_is_not_reported_as_missing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("inside.bin"), b"x").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores directory permissions; nothing to check then.
        if std::fs::metadata(locked.join("inside.bin")).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let err = ensure_regular_file(&locked.join("inside.bin")).await.unwrap_err();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, UploadError::FileUnreadable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_and_directory_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        for path in [dir.path().join("absent.bin"), dir.path().to_path_buf()] {
            let err = ensure_regular_file(&path).await.unwrap_err();
            assert!(matches!(err, UploadError::FileNotFound { .. }), "{err:?}");
        }
    }

    #[tokio::test]
    async fn missing_file_never_opens_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let client = PinataClient::new("http://127.0.0.1:9", None).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let err = client
            .upload_tracked(
                &UploadRequest::new(dir.path().join("absent.jpg"), "n", "d"),
                &creds(),
                Some(counter.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::FileNotFound { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
