//! HTTP client wrapper for fetching assets.
//!
//! [`HttpClient`] issues plain GET requests with a fixed identity, rejects
//! anything but `200 OK` and sign-in redirects, and streams the body to its
//! category path, sniffing the extension on the way when none is known.
//!
//! Bodies are streamed into a uniquely named `.part` sibling and renamed into
//! place only after the final flush, so the asset path never holds a
//! truncated file, even when the download future is dropped mid-stream.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, SIGN_IN_HOSTS};
use super::error::DownloadError;
use super::layout;
use super::sniff::sniff;
use crate::fileset::ModuleFile;
use crate::user_agent::{ACCEPT_ANY, DOWNLOAD_USER_AGENT};

/// HTTP client for asset downloads.
///
/// Create once and clone freely; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    sign_in_hosts: Arc<[String]>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30s connect, 5min total).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values in seconds.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_ANY));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(DOWNLOAD_USER_AGENT)
            .default_headers(headers)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            sign_in_hosts: SIGN_IN_HOSTS.iter().map(|host| (*host).to_string()).collect(),
        }
    }

    /// Replaces the hosts whose pages count as a sign-in wall.
    #[must_use]
    pub fn with_sign_in_hosts<I, H>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.sign_in_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Sends a GET request and validates the response.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` does not parse
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    /// - [`DownloadError::HttpStatus`] for any status other than 200
    /// - [`DownloadError::AccessDenied`] when redirected to a sign-in host
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        if let Some(host) = response.url().host_str()
            && self.sign_in_hosts.iter().any(|known| known == host)
        {
            return Err(DownloadError::access_denied(url, host));
        }

        Ok(response)
    }

    /// Downloads one entry below `output_root`.
    ///
    /// When the entry has no known extension the body is sniffed first and
    /// the detected extension is recorded on the returned entry.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get`](Self::get), plus
    /// [`DownloadError::Network`] for a broken body stream and
    /// [`DownloadError::Io`] when the file cannot be written. No partial file
    /// is left behind on failure or when the returned future is dropped.
    #[instrument(skip(self, file, output_root), fields(url = %file.url()))]
    pub async fn download_file(
        &self,
        file: &ModuleFile,
        output_root: &Path,
    ) -> Result<(ModuleFile, PathBuf), DownloadError> {
        let response = self.get(file.url()).await?;
        let url = file.url();
        let mut materialized = file.clone();
        let body = Box::pin(response.bytes_stream());

        let (path, bytes) = if materialized.needs_sniffing() {
            let sniffed = sniff(body)
                .await
                .map_err(|e| DownloadError::network(url, e))?;
            debug!(extension = sniffed.extension, "sniffed content type");
            materialized.set_extension(sniffed.extension);
            let path = layout::local_path(output_root, &materialized);
            let bytes = write_body(sniffed.body, url, &path).await?;
            (path, bytes)
        } else {
            let path = layout::local_path(output_root, &materialized);
            let bytes = write_body(body, url, &path).await?;
            (path, bytes)
        };

        debug!(path = %path.display(), bytes, "wrote asset");
        Ok((materialized, path))
    }
}

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// In-progress download file, removed on drop unless committed.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    /// Picks a sibling of `target` no other writer in this process uses.
    fn next_to(target: &Path) -> Self {
        let mut name = OsString::from(target.as_os_str());
        name.push(format!(
            ".{}-{}.part",
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Self {
            path: PathBuf::from(name),
            committed: false,
        }
    }

    async fn commit(mut self, target: &Path) -> Result<(), DownloadError> {
        tokio::fs::rename(&self.path, target)
            .await
            .map_err(|e| DownloadError::io(target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            // Sync removal: drop may run while the runtime tears the task down.
            if std::fs::remove_file(&self.path).is_ok() {
                debug!(path = %self.path.display(), "removed partial file");
            }
        }
    }
}

/// Writes a body stream to `path` through a `.part` sibling.
async fn write_body<S, B>(body: S, url: &str, path: &Path) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let part = PartFile::next_to(path);
    let file = File::create(&part.path)
        .await
        .map_err(|e| DownloadError::io(&part.path, e))?;

    let bytes = stream_to_file(file, body, url, &part.path).await?;
    part.commit(path).await?;
    Ok(bytes)
}

/// Streams a body into `file`, returning the number of bytes written.
async fn stream_to_file<S, B>(
    file: File,
    mut body: S,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
        let chunk = chunk.as_ref();
        writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fileset::AssetCategory;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_sends_fixed_identity_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/asset"))
            .and(header("user-agent", DOWNLOAD_USER_AGENT))
            .and(header("accept", ACCEPT_ANY))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let response = client.get(&format!("{}/asset", server.uri())).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_get_rejects_non_200_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = HttpClient::new()
            .get(&format!("{}/empty", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_get_rejects_invalid_url() {
        let err = HttpClient::new().get("http://").await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_download_file_sniffs_and_writes_whole_body() {
        let server = MockServer::start().await;
        let mut body = b"GIF89a".to_vec();
        body.extend(std::iter::repeat_n(0x42u8, 10_000));
        Mock::given(method("GET"))
            .and(path("/img"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let entry = ModuleFile::new(AssetCategory::Image, &format!("{}/img", server.uri())).unwrap();
        let (materialized, written) = HttpClient::new()
            .download_file(&entry, dir.path())
            .await
            .unwrap();

        assert_eq!(materialized.extension(), ".gif");
        assert!(written.starts_with(dir.path().join("Images")));
        assert_eq!(std::fs::read(&written).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_file_uses_fixed_extension_without_sniffing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let entry = ModuleFile::new(AssetCategory::Pdf, &format!("{}/rules", server.uri())).unwrap();
        let (_, written) = HttpClient::new()
            .download_file(&entry, dir.path())
            .await
            .unwrap();
        assert_eq!(written.extension().unwrap(), "PDF");
    }

    #[tokio::test]
    async fn test_get_rejects_redirect_to_sign_in_host() {
        let login = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>sign in</html>"))
            .mount(&login)
            .await;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gated"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/signin", login.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new().with_sign_in_hosts(["127.0.0.1"]);
        let err = client
            .get(&format!("{}/gated", server.uri()))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, DownloadError::AccessDenied { host, .. } if host == "127.0.0.1"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_default_sign_in_hosts_allow_other_hosts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        assert_eq!(&*client.sign_in_hosts, ["accounts.google.com".to_string()]);
        assert!(client.get(&format!("{}/a", server.uri())).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_body_failure_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Models").join("broken.obj");
        let body = futures_util::stream::iter(vec![Ok::<_, reqwest::Error>(b"v 1".to_vec())]);

        // A directory in the way makes the final rename fail.
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let err = write_body(body, "http://example.com/broken", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Io { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("Models"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, [std::ffi::OsString::from("broken.obj")]);
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_dropped_write_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("partial.obj");
        let body = futures_util::stream::iter(vec![Ok::<_, reqwest::Error>(vec![0u8; 4096])])
            .chain(futures_util::stream::pending());

        let write = write_body(body, "http://example.com/partial", &target);
        let timed_out = tokio::time::timeout(Duration::from_millis(200), write).await;
        assert!(timed_out.is_err(), "stream never ends, write must still be pending");

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
