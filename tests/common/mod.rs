//! In-process mock of the job-processing API
#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobrelay::config::Config;
use jobrelay::context::AppContext;
use jobrelay::events::{EventReceiver, EventSender, JobEvent};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// What `GET /retrieve/{job_id}` answers
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Body with a Content-Length and an optional Content-Disposition filename
    Complete { body: Vec<u8>, filename: Option<String> },
    /// Chunked body without Content-Length
    Chunked { chunks: Vec<Vec<u8>> },
    /// Sends `first`, then never finishes. `declared_len` goes into Content-Length.
    Stalled { first: Vec<u8>, declared_len: u64 },
    Unauthorized,
}

impl Default for Artifact {
    fn default() -> Self {
        Artifact::Complete {
            body: b"PK\x03\x04 artifact bytes".to_vec(),
            filename: Some("result.zip".to_string()),
        }
    }
}

/// What `POST /jobs/create_from_file` answers
#[derive(Debug, Clone)]
pub enum UploadReply {
    Image { content_type: String, body: Vec<u8> },
    Error { status: u16, body: String },
    Unauthorized,
}

impl Default for UploadReply {
    fn default() -> Self {
        UploadReply::Image {
            content_type: "image/tiff".to_string(),
            body: b"II*\x00 processed".to_vec(),
        }
    }
}

#[derive(Default)]
pub struct MockState {
    pub logins: AtomicUsize,
    pub jobs_list_requests: AtomicUsize,
    pub details: AtomicUsize,
    pub retrievals: AtomicUsize,
    pub uploads: AtomicUsize,

    pub reject_login: AtomicBool,
    pub revoked: Mutex<HashSet<String>>,
    /// Answer this many detail requests with 401 before behaving normally
    pub unauthorized_details: AtomicUsize,
    /// Answer detail requests with HTTP 500
    pub fail_details: AtomicBool,
    /// Never answer detail requests
    pub hang_details: AtomicBool,
    /// Answer this many listings with HTTP 500
    pub list_failures: AtomicUsize,

    /// Status sequence; the last entry repeats
    pub statuses: Mutex<VecDeque<Value>>,
    pub artifact: Mutex<Artifact>,
    pub upload_reply: Mutex<UploadReply>,
    pub upload_query: Mutex<Option<HashMap<String, String>>>,
    pub upload_content_type: Mutex<Option<String>>,
    pub upload_bytes: AtomicUsize,
    pub first_chunk_sent: Notify,
}

impl MockState {
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = Value>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub fn set_artifact(&self, artifact: Artifact) {
        *self.artifact.lock().unwrap() = artifact;
    }

    pub fn set_upload_reply(&self, reply: UploadReply) {
        *self.upload_reply.lock().unwrap() = reply;
    }

    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }

    /// Every request that reached the server
    pub fn total_requests(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
            + self.jobs_list_requests.load(Ordering::SeqCst)
            + self.details.load(Ordering::SeqCst)
            + self.retrievals.load(Ordering::SeqCst)
            + self.uploads.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) => !self.revoked.lock().unwrap().contains(token),
            None => false,
        }
    }
}

pub struct MockApi {
    pub url: String,
    pub state: Arc<MockState>,
}

pub async fn start_mock_server() -> MockApi {
    let state = Arc::new(MockState::default());

    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/jobs/", get(list_jobs))
        .route("/jobs/create_from_file", post(create_from_file))
        .route("/jobs/{job_id}", get(job_detail))
        .route("/retrieve/{job_id}", get(retrieve))
        .with_state(state.clone());

    // Bind to random available port
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockApi {
        url: format!("http://{bound_addr}"),
        state,
    }
}

/// Job status payload the way the server sends it
pub fn status(status: &str, status_code: i64, result: &str, resource: bool) -> Value {
    json!({
        "status": status,
        "status_code": status_code,
        "result": result,
        "resource_url": if resource { Value::from("https://files.example.com/artifact") } else { Value::Null },
        "body": {"datatype_id": 22},
    })
}

/// Configuration pointing at the mock, with fast polling and credentials
pub fn config(url: &str, temp_root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.api.base_url = url.to_string();
    config.polling.interval_seconds = 0.01;
    config.polling.error_sleep_seconds = 0.01;
    config.polling.registry_interval_seconds = 0.02;
    config.processing.temp_root = Some(temp_root.to_path_buf());
    config.http.request_timeout_seconds = 5;
    config.credentials.username = Some("alice".to_string());
    config.credentials.password = Some("secret".to_string());
    config
}

pub fn context(config: Config) -> AppContext {
    AppContext::from_config(config).unwrap()
}

/// Close the sending side and return everything that was emitted
pub async fn collect(events: EventSender, mut rx: EventReceiver) -> Vec<JobEvent> {
    drop(events);
    let mut out = Vec::new();
    while let Some(event) = rx.recv().await {
        out.push(event);
    }
    out
}

pub fn count(events: &[JobEvent], pred: impl Fn(&JobEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

pub fn entries(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

async fn login(State(state): State<Arc<MockState>>) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    if state.reject_login.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect username or password"})),
        )
            .into_response();
    }
    Json(json!({"access_token": format!("token-{n}"), "token_type": "bearer"})).into_response()
}

async fn list_jobs(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.jobs_list_requests.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let failing = state
        .list_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "database unavailable"})),
        )
            .into_response();
    }

    Json(json!({"jobs": [
        {"id": 1, "status": "end", "name": "Burned area"},
        {"id": "2", "status": "pending"},
    ]}))
    .into_response()
}

async fn job_detail(
    State(state): State<Arc<MockState>>,
    Path(_job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.details.fetch_add(1, Ordering::SeqCst);

    if state.hang_details.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }

    let unauthorized = state
        .unauthorized_details
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if unauthorized || !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if state.fail_details.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "upstream crashed"})),
        )
            .into_response();
    }

    let mut statuses = state.statuses.lock().unwrap();
    let current = if statuses.len() > 1 {
        statuses.pop_front()
    } else {
        statuses.front().cloned()
    };
    Json(current.unwrap_or_else(|| status("pending", 200, "queued", false))).into_response()
}

async fn retrieve(
    State(state): State<Arc<MockState>>,
    Path(_job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.retrievals.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let artifact = state.artifact.lock().unwrap().clone();
    match artifact {
        Artifact::Complete { body, filename } => {
            let mut response = Response::builder().status(StatusCode::OK);
            if let Some(filename) = filename {
                response = response.header(CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""));
            }
            response.body(Body::from(body)).unwrap()
        }
        Artifact::Chunked { chunks } => {
            let stream = futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, std::io::Error>(Bytes::from(chunk))),
            );
            Response::builder()
                .status(StatusCode::OK)
                .body(Body::from_stream(stream))
                .unwrap()
        }
        Artifact::Stalled { first, declared_len } => {
            let notify = state.clone();
            let stream = futures::stream::unfold(Some(first), move |first| {
                let notify = notify.clone();
                async move {
                    match first {
                        Some(chunk) => {
                            notify.first_chunk_sent.notify_one();
                            Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), None))
                        }
                        None => {
                            std::future::pending::<()>().await;
                            None
                        }
                    }
                }
            });
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_LENGTH, declared_len)
                .header(CONTENT_DISPOSITION, "attachment; filename=\"stalled.zip\"")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        Artifact::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn create_from_file(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.uploads.fetch_add(1, Ordering::SeqCst);
    *state.upload_query.lock().unwrap() = Some(query);
    *state.upload_content_type.lock().unwrap() = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.upload_bytes.store(body.len(), Ordering::SeqCst);

    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let reply = state.upload_reply.lock().unwrap().clone();
    match reply {
        UploadReply::Image { content_type, body } => {
            ([(CONTENT_TYPE, content_type)], body).into_response()
        }
        UploadReply::Error { status, body } => (
            StatusCode::from_u16(status).unwrap(),
            [(CONTENT_TYPE, "application/json".to_string())],
            body,
        )
            .into_response(),
        UploadReply::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
    }
}
