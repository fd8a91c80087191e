//! In-process stand-in for the remote content store, used by tests.
//!
//! Serves `GET /meta/{path}` (JSON metadata) and `GET /raw/{path}` (bytes)
//! from an in-memory tree. Failures can be injected per request.

use crate::config::Config;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Debug, Clone, Default)]
struct MockFile {
    content: Vec<u8>,
    /// Body served by /raw instead of `content`
    served: Option<Vec<u8>>,
    last_modified: Option<String>,
}

#[derive(Default)]
struct MockState {
    base_url: String,
    files: Mutex<HashMap<String, MockFile>>,
    metadata_hits: AtomicUsize,
    raw_hits: AtomicUsize,
    metadata_times: Mutex<Vec<Instant>>,
    /// (remaining count, status, quota exhausted)
    failures: Mutex<Option<(usize, u16, bool)>>,
}

impl MockState {
    fn take_failure(&self) -> Option<Response> {
        let mut failures = self.failures.lock().unwrap();
        let (remaining, status, exhausted) = (*failures)?;
        if remaining == 0 {
            *failures = None;
            return None;
        }
        *failures = Some((remaining - 1, status, exhausted));

        let mut headers = HeaderMap::new();
        if exhausted {
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            headers.insert("x-ratelimit-limit", HeaderValue::from_static("60"));
        }
        let status = StatusCode::from_u16(status).unwrap();
        Some((status, headers, "injected failure").into_response())
    }
}

pub struct MockRemote {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockRemote {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let state = Arc::new(MockState {
            base_url: base_url.clone(),
            ..MockState::default()
        });

        let app = Router::new()
            .route("/meta/{*path}", get(metadata))
            .route("/raw/{*path}", get(raw))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    /// Config pointing at this server with fast rate limiting.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.remote.metadata_url = format!("{}/meta", self.base_url);
        config.remote.raw_url = format!("{}/raw", self.base_url);
        config.remote.timeout_secs = 5;
        config.rate_limit.min_interval_ms = 0;
        config.rate_limit.initial_backoff_ms = 10;
        config.rate_limit.max_backoff_ms = 40;
        config.rate_limit.jitter_ms = 5;
        config
    }

    pub fn put(&self, path: &str, content: &[u8]) {
        self.state.files.lock().unwrap().insert(
            path.to_string(),
            MockFile {
                content: content.to_vec(),
                ..MockFile::default()
            },
        );
    }

    /// Serve `body` from /raw while metadata still advertises the real hash.
    pub fn corrupt(&self, path: &str, body: &[u8]) {
        if let Some(file) = self.state.files.lock().unwrap().get_mut(path) {
            file.served = Some(body.to_vec());
        }
    }

    pub fn set_last_modified(&self, path: &str, rfc3339: &str) {
        if let Some(file) = self.state.files.lock().unwrap().get_mut(path) {
            file.last_modified = Some(rfc3339.to_string());
        }
    }

    pub fn fail_next_with_status(&self, count: usize, status: u16) {
        *self.state.failures.lock().unwrap() = Some((count, status, false));
    }

    pub fn fail_next_with_quota_exhausted(&self, count: usize) {
        *self.state.failures.lock().unwrap() = Some((count, 403, true));
    }

    pub fn metadata_hits(&self) -> usize {
        self.state.metadata_hits.load(Ordering::SeqCst)
    }

    pub fn raw_hits(&self) -> usize {
        self.state.raw_hits.load(Ordering::SeqCst)
    }

    pub fn metadata_times(&self) -> Vec<Instant> {
        self.state.metadata_times.lock().unwrap().clone()
    }

    pub fn reset_counters(&self) {
        self.state.metadata_hits.store(0, Ordering::SeqCst);
        self.state.raw_hits.store(0, Ordering::SeqCst);
        self.state.metadata_times.lock().unwrap().clear();
    }
}

async fn metadata(State(state): State<Arc<MockState>>, Path(path): Path<String>) -> Response {
    state.metadata_hits.fetch_add(1, Ordering::SeqCst);
    state.metadata_times.lock().unwrap().push(Instant::now());

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let file = state.files.lock().unwrap().get(&path).cloned();
    match file {
        Some(file) => {
            let last_modified = file
                .last_modified
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            let mut headers = HeaderMap::new();
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
            headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
            let body = Json(json!({
                "path": path,
                "sha": sha256_hex(&file.content),
                "size": file.content.len(),
                "last_modified": last_modified,
                "download_url": format!("{}/raw/{}", state.base_url, path),
            }));
            (StatusCode::OK, headers, body).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response(),
    }
}

async fn raw(State(state): State<Arc<MockState>>, Path(path): Path<String>) -> Response {
    state.raw_hits.fetch_add(1, Ordering::SeqCst);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let file = state.files.lock().unwrap().get(&path).cloned();
    match file {
        Some(file) => {
            let body = file.served.unwrap_or(file.content);
            (StatusCode::OK, body).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
