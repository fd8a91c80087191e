//! Client for the remote content store.
//!
//! Two endpoints are used: a metadata endpoint answering per-path JSON
//! (`sha`, `download_url`, `size`, `last_modified`) and a raw endpoint
//! serving file bytes. Every request goes through the same rate gate and
//! retry policy; metadata answers are cached for a few minutes.

pub mod cache;
pub mod rate_limit;
pub mod retry;

use crate::config::{RateLimitConfig, RemoteConfig};
use crate::discovery::FileEntry;
use crate::hash::ExpectedHash;
use crate::utils::{Result, UpdaterError};
use cache::MetadataCache;
use futures_util::StreamExt;
use rate_limit::RateLimiter;
use reqwest::header::{HeaderMap, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, Url};
use retry::{classify, Disposition, RetryPolicy};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Remote state of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFileInfo {
    pub path: String,
    /// `None` when the remote did not publish a usable hash
    pub hash: Option<ExpectedHash>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
    /// Milliseconds since the Unix epoch, 0 when unknown
    pub last_modified_millis: i64,
}

impl RemoteFileInfo {
    /// Synthesize remote state from a trusted catalog hash.
    ///
    /// No timestamp is available on this path.
    pub fn from_entry(entry: &FileEntry) -> Self {
        Self {
            path: entry.path.clone(),
            hash: entry.expected_hash.clone(),
            download_url: None,
            size: None,
            last_modified_millis: 0,
        }
    }

    pub fn has_timestamp(&self) -> bool {
        self.last_modified_millis > 0
    }

    fn from_response(path: &str, response: MetadataResponse) -> Self {
        let hash = response.sha.as_deref().and_then(|sha| match ExpectedHash::parse(sha) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Ignoring remote hash for {}: {}", path, e);
                None
            }
        });

        let last_modified_millis = response
            .last_modified
            .as_deref()
            .map(|ts| parse_timestamp_millis(path, ts))
            .unwrap_or(0);

        Self {
            path: path.to_string(),
            hash,
            download_url: response.download_url.filter(|u| !u.is_empty()),
            size: response.size,
            last_modified_millis,
        }
    }
}

/// Metadata document; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, alias = "lastModified")]
    last_modified: Option<String>,
}

/// ISO-8601 timestamp to epoch millis; 0 if it cannot be parsed.
fn parse_timestamp_millis(path: &str, text: &str) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(text.trim()) {
        Ok(ts) => ts.timestamp_millis().max(0),
        Err(e) => {
            debug!("Unparseable last_modified for {} ({:?}): {}", path, text, e);
            0
        }
    }
}

pub struct RemoteMetadataClient {
    http: reqwest::Client,
    metadata_base: Url,
    raw_base: Url,
    branch: Option<String>,
    token: Option<String>,
    user_agent: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
    cache: MetadataCache,
    requests: AtomicU64,
}

impl RemoteMetadataClient {
    pub fn new(remote: &RemoteConfig, limits: &RateLimitConfig) -> Result<Self> {
        let metadata_base = Url::parse(&remote.metadata_url)
            .map_err(|e| UpdaterError::Config(format!("metadata_url: {}", e)))?;
        let raw_base = Url::parse(&remote.raw_url)
            .map_err(|e| UpdaterError::Config(format!("raw_url: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(remote.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            metadata_base,
            raw_base,
            branch: remote.branch.clone(),
            token: remote.token.clone(),
            user_agent: remote.user_agent.clone(),
            limiter: RateLimiter::new(limits.min_interval()),
            retry: RetryPolicy::from_config(limits),
            cache: MetadataCache::new(limits.cache_ttl()),
            requests: AtomicU64::new(0),
        })
    }

    /// Number of HTTP requests issued so far, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Metadata for `path`, from cache when fresh.
    ///
    /// A 404 comes back as [`UpdaterError::RemoteNotFound`].
    pub async fn get_metadata(&self, path: &str) -> Result<RemoteFileInfo> {
        if let Some(info) = self.cache.get(path) {
            debug!("Metadata cache hit: {}", path);
            return Ok(info);
        }

        let url = self.metadata_url(path)?;
        let response = self.send(path, url).await?;
        let body = response.bytes().await?;
        let parsed: MetadataResponse = serde_json::from_slice(&body)?;

        let info = RemoteFileInfo::from_response(path, parsed);
        debug!(
            "Metadata for {}: hash={}, size={:?}, last_modified={}",
            path,
            info.hash.as_ref().map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            info.size,
            info.last_modified_millis
        );
        self.cache.insert(info.clone());
        Ok(info)
    }

    /// Stream the content of `path` into `dest`, overwriting it.
    ///
    /// Uses `download_url` when the metadata provided one. Returns the number
    /// of bytes written.
    pub async fn download(&self, path: &str, download_url: Option<&str>, dest: &Path) -> Result<u64> {
        let url = match download_url {
            Some(u) => Url::parse(u)
                .map_err(|e| UpdaterError::Config(format!("download_url for {}: {}", path, e)))?,
            None => self.raw_url(path)?,
        };

        let response = self.send(path, url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!("Downloaded {} bytes: {}", written, path);
        Ok(written)
    }

    pub fn metadata_url(&self, path: &str) -> Result<Url> {
        let mut url = join_path(&self.metadata_base, path)?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    pub fn raw_url(&self, path: &str) -> Result<Url> {
        join_path(&self.raw_base, path)
    }

    /// GET with rate gate and retry.
    async fn send(&self, path: &str, url: Url) -> Result<Response> {
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            self.limiter.acquire().await;
            self.requests.fetch_add(1, Ordering::Relaxed);

            let mut request = self
                .http
                .get(url.clone())
                .header(USER_AGENT, self.user_agent.as_str());
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("token {}", token));
            }

            let retry_reason = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    log_rate_limit(path, response.headers());
                    let disposition = classify(status, response.headers());

                    match disposition {
                        Disposition::Success => return Ok(response),
                        Disposition::NotFound => {
                            return Err(UpdaterError::RemoteNotFound(path.to_string()))
                        }
                        Disposition::Fail => {
                            return Err(UpdaterError::RemoteStatus {
                                status: status.as_u16(),
                                path: path.to_string(),
                            })
                        }
                        Disposition::Retry => format!("HTTP {}", status.as_u16()),
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => e.to_string(),
                Err(e) => return Err(UpdaterError::Http(e)),
            };

            if attempt == max_attempts {
                warn!("{}: {} (attempt {}/{}), giving up", path, retry_reason, attempt, max_attempts);
                break;
            }

            let delay = self.retry.delay(attempt - 1);
            info!(
                "{}: {} (attempt {}/{}), retrying in {}ms",
                path,
                retry_reason,
                attempt,
                max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        Err(UpdaterError::RetriesExhausted {
            path: path.to_string(),
            attempts: max_attempts,
        })
    }
}

/// Append a relative `a/b/c` path to `base`, percent-encoding each segment.
fn join_path(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| UpdaterError::Config(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

fn log_rate_limit(path: &str, headers: &HeaderMap) {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if let Some(remaining) = get("x-ratelimit-remaining") {
        debug!(
            "Rate limit for {}: {}/{} remaining, reset at {}",
            path,
            remaining,
            get("x-ratelimit-limit").unwrap_or("?"),
            get("x-ratelimit-reset").unwrap_or("?")
        );
    }
}
