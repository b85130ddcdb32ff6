//! Read-only HTTP(S) backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use storebridge_common::{Error, Result};

use crate::backend::{Backend, BackendOptions, Mtime, ObjectInfo};
use crate::local::map_io_error;

/// Request timeout when none is configured.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("storebridge/", env!("CARGO_PKG_VERSION"));

/// Read-only HTTP(S) backend.
///
/// Supports existence checks, metadata (from `HEAD` response headers) and
/// downloads. Every write operation fails with `NotSupported`.
pub struct HttpBackend {
    scheme: &'static str,
    http: Client,
}

impl HttpBackend {
    /// Build from backend options.
    ///
    /// Recognized options are `timeout_secs` (unsigned integer) and
    /// `user_agent` (string).
    ///
    /// # Errors
    /// - Malformed option values
    /// - HTTP client construction failure
    pub fn from_options(scheme: &'static str, options: &BackendOptions) -> Result<Self> {
        let timeout_secs = match options.get("timeout_secs") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::InvalidInput("Option 'timeout_secs' must be an unsigned integer".to_string())
            })?,
        };
        let user_agent = match options.get("user_agent") {
            None => DEFAULT_USER_AGENT,
            Some(value) => value.as_str().ok_or_else(|| {
                Error::InvalidInput("Option 'user_agent' must be a string".to_string())
            })?,
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { scheme, http })
    }

    /// Turn a query into a URL, adding this backend's scheme when missing.
    fn to_url(&self, path: &str) -> String {
        if path.contains("://") {
            path.to_string()
        } else {
            format!("{}://{}", self.scheme, path.trim_start_matches('/'))
        }
    }

    async fn head(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .head(url)
            .send()
            .await
            .map_err(|e| classify_request_error(e, url))
    }

    fn read_only(&self, operation: &str, path: &str) -> Error {
        Error::NotSupported(format!(
            "{} backend is read-only, cannot {} {}",
            self.scheme, operation, path
        ))
    }
}

/// Map an HTTP status onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, url: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Error::NotFound(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::PermissionDenied(format!("{} ({})", url, status))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::Transient(format!("{} returned {}", url, status))
        }
        s if s.is_server_error() => Error::Transient(format!("{} returned {}", url, status)),
        _ => Error::InvalidInput(format!("{} returned {}", url, status)),
    }
}

/// Map a request-level failure onto the error taxonomy.
fn classify_request_error(err: reqwest::Error, url: &str) -> Error {
    if err.is_builder() {
        Error::InvalidInput(format!("Invalid request for {}: {}", url, err))
    } else {
        Error::Transient(format!("Request to {} failed: {}", url, err))
    }
}

fn parse_last_modified(headers: &header::HeaderMap) -> Option<Mtime> {
    let value = headers.get(header::LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| Mtime::DateTime(dt.with_timezone(&Utc)))
}

fn parse_content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Object metadata from `HEAD` response headers.
///
/// A response without a usable `Content-Length` has no known size and is
/// reported as `NotSupported` rather than as an empty object.
fn info_from_headers(headers: &header::HeaderMap, url: &str) -> Result<ObjectInfo> {
    let size = parse_content_length(headers).ok_or_else(|| {
        Error::NotSupported(format!("{} did not report a Content-Length", url))
    })?;
    Ok(ObjectInfo {
        size,
        mtime: parse_last_modified(headers),
        is_dir: false,
    })
}

#[async_trait]
impl Backend for HttpBackend {
    fn protocol(&self) -> &str {
        self.scheme
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let url = self.to_url(path);
        let response = self.head(&url).await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Ok(false)
        } else {
            Err(classify_status(status, &url))
        }
    }

    async fn info(&self, path: &str) -> Result<ObjectInfo> {
        let url = self.to_url(path);
        let response = self.head(&url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &url));
        }

        info_from_headers(response.headers(), &url)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let url = self.to_url(remote);
        debug!("Downloading {} to {}", url, local.display());

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_request_error(e, &url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &url));
        }

        let mut file = tokio::fs::File::create(local)
            .await
            .map_err(|e| map_io_error(e, local))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_request_error(e, &url))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn upload(&self, _local: &Path, remote: &str) -> Result<()> {
        Err(self.read_only("upload to", remote))
    }

    async fn remove(&self, path: &str, _recursive: bool) -> Result<()> {
        Err(self.read_only("remove", path))
    }

    async fn make_dirs(&self, path: &str, _exist_ok: bool) -> Result<()> {
        Err(self.read_only("create directories at", path))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        Err(Error::NotSupported(format!(
            "{} backend cannot list {}",
            self.scheme, pattern
        )))
    }

    async fn touch(&self, path: &str, _truncate: bool) -> Result<()> {
        Err(self.read_only("touch", path))
    }
}
