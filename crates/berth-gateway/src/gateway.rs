//! The smart HTTP gateway pipeline: VALIDATE, SPAWN, STREAM, FINALIZE.
//!
//! Each request validates its inputs, spawns a fresh `git http-backend`
//! with an explicit minimal environment, streams the body and response
//! under size and time ceilings, and tears the subprocess down on every
//! exit path. The repository root reaches the subprocess only through
//! environment variables; nothing is ever interpolated into a shell.

use crate::cgi::{self, CgiResponse};
use crate::guard::SizeGuard;
use crate::validate::{
    parse_info_refs_query, validate_base_url, validate_query, validate_repo_id, Operation, Service,
};
use crate::{GatewayError, Result};
use axum::body::Body;
use axum::extract::{Path as AxumPath, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout_at, Instant, Sleep};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

/// Default byte ceiling for read operations (fetch/clone requests).
pub const DEFAULT_FETCH_LIMIT: u64 = 10 * 1024 * 1024;
/// Default byte ceiling for write operations (pushes).
pub const DEFAULT_PUSH_LIMIT: u64 = 500 * 1024 * 1024;
/// Default per-request time ceiling.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory holding one bare repository per project id.
    pub storage_root: PathBuf,
    /// Base API URL exported to hooks; re-validated before every spawn.
    pub base_url: String,
    /// Byte ceiling for fetch request bodies.
    pub max_fetch_bytes: u64,
    /// Byte ceiling for push request bodies.
    pub max_push_bytes: u64,
    /// Per-request time ceiling.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Creates a configuration with default ceilings.
    pub fn new(storage_root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            base_url: base_url.into(),
            max_fetch_bytes: DEFAULT_FETCH_LIMIT,
            max_push_bytes: DEFAULT_PUSH_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Builds the gateway router.
///
/// Authorization is deliberately not handled here: permission checks run
/// before these routes in the embedding server.
pub fn router(config: GatewayConfig) -> Router {
    Router::new()
        .route("/repo/{id}/info/refs", get(info_refs))
        .route("/repo/{id}/git-upload-pack", post(upload_pack))
        .route("/repo/{id}/git-receive-pack", post(receive_pack))
        .with_state(Arc::new(config))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::InvalidRepository(_)
            | GatewayError::InvalidService(_)
            | GatewayError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid request"),
            GatewayError::RepositoryNotFound(_) => {
                (StatusCode::NOT_FOUND, "repository not found")
            }
            GatewayError::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
            }
            GatewayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "request timed out"),
            // Full detail stays in the log; clients get a generic failure.
            GatewayError::Backend(_) | GatewayError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };

        match &self {
            GatewayError::Backend(_) | GatewayError::Io(_) => error!(error = %self, "gateway request failed"),
            _ => warn!(error = %self, "gateway request rejected"),
        }

        (status, [(header::CACHE_CONTROL, "no-cache")], message).into_response()
    }
}

/// Handle used to forcibly tear down the backend subprocess.
///
/// Firing it, or dropping every clone at the end of the request, makes
/// the monitor task kill the child. No subprocess outlives its request.
#[derive(Clone)]
struct KillHandle(mpsc::Sender<()>);

impl KillHandle {
    fn fire(&self) {
        let _ = self.0.try_send(());
    }
}

struct BackendProcess {
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    kill: KillHandle,
}

/// SPAWN stage: launches `git http-backend` for an already-validated
/// request with an explicit minimal environment.
fn launch(
    cfg: &GatewayConfig,
    repo_id: &str,
    op: Operation,
    query: Option<&str>,
    content_type: Option<&str>,
    content_length: Option<u64>,
) -> Result<BackendProcess> {
    validate_base_url(&cfg.base_url)?;

    let repo_dir = cfg.storage_root.join(format!("{}.git", repo_id));
    if !repo_dir.is_dir() {
        return Err(GatewayError::RepositoryNotFound(repo_id.to_string()));
    }

    let path_env =
        std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string());

    let mut cmd = Command::new("git");
    cmd.arg("http-backend")
        .env_clear()
        .env("PATH", path_env)
        .env("HOME", &cfg.storage_root)
        .env("BERTH_BASE_URL", &cfg.base_url)
        .env("BERTH_REPO_ID", repo_id)
        .env("GIT_PROJECT_ROOT", &cfg.storage_root)
        .env("GIT_HTTP_EXPORT_ALL", "1")
        .env("REQUEST_METHOD", op.method())
        .env("PATH_INFO", format!("/{}.git/{}", repo_id, op.path_suffix()))
        .env("QUERY_STRING", query.unwrap_or(""))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ct) = content_type {
        cmd.env("CONTENT_TYPE", ct);
    }
    if let Some(len) = content_length {
        cmd.env("CONTENT_LENGTH", len.to_string());
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| GatewayError::Backend(format!("spawn failed: {}", e)))?;

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GatewayError::Backend("backend stdout unavailable".to_string()))?;
    let stderr = child.stderr.take();

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(monitor(child, stderr, rx, repo_id.to_string(), op));

    Ok(BackendProcess {
        stdin,
        stdout,
        kill: KillHandle(tx),
    })
}

/// FINALIZE stage: reaps the subprocess, killing it when the request is
/// torn down first, and logs failures in full internally.
async fn monitor(
    mut child: Child,
    stderr: Option<tokio::process::ChildStderr>,
    mut rx: mpsc::Receiver<()>,
    repo_id: String,
    op: Operation,
) {
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = (&mut stderr).take(64 * 1024).read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    let status = tokio::select! {
        status = child.wait() => status,
        // A fired kill handle or the last handle dropping both land here.
        _ = rx.recv() => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let stderr_text = stderr_task.await.unwrap_or_default();
    match status {
        Ok(status) if status.success() => {
            debug!(repo = %repo_id, op = ?op, "backend completed");
        }
        Ok(status) => {
            error!(
                repo = %repo_id,
                op = ?op,
                code = ?status.code(),
                stderr = %stderr_text,
                "backend exited with failure"
            );
        }
        Err(e) => error!(repo = %repo_id, op = ?op, error = %e, "backend wait failed"),
    }
}

/// Reads the CGI header prefix from the subprocess.
///
/// Buffers only until the blank-line terminator; whatever arrived past
/// it is returned as the first payload chunk.
async fn read_cgi_prefix(stdout: &mut ChildStdout) -> Result<(CgiResponse, Bytes)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stdout.read(&mut chunk).await?;
        if n == 0 {
            return Err(GatewayError::Backend(
                "backend closed before emitting headers".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(offset) = cgi::find_terminator(&buf) {
            let parsed = cgi::parse_headers(&buf[..offset])?;
            let leftover = Bytes::copy_from_slice(&buf[offset..]);
            return Ok((parsed, leftover));
        }
        if buf.len() > cgi::MAX_HEADER_BLOCK {
            return Err(GatewayError::Backend("CGI header block too large".to_string()));
        }
    }
}

/// Response payload relay: pipes subprocess output without buffering,
/// enforcing the request deadline. Dropping the relay releases the kill
/// handle and the monitor tears the subprocess down.
struct Relay {
    leftover: Option<Bytes>,
    inner: ReaderStream<ChildStdout>,
    deadline: Pin<Box<Sleep>>,
    kill: KillHandle,
    expired: bool,
}

impl Relay {
    fn new(stdout: ChildStdout, leftover: Bytes, deadline: Instant, kill: KillHandle) -> Self {
        Self {
            leftover: (!leftover.is_empty()).then_some(leftover),
            inner: ReaderStream::new(stdout),
            deadline: Box::pin(sleep_until(deadline)),
            kill,
            expired: false,
        }
    }
}

impl Stream for Relay {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            this.expired = true;
            this.kill.fire();
            return Poll::Ready(Some(Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request time ceiling exceeded",
            ))));
        }
        if let Some(bytes) = this.leftover.take() {
            return Poll::Ready(Some(Ok(bytes)));
        }
        this.inner.poll_next_unpin(cx)
    }
}

fn build_response(parsed: CgiResponse, backend: BackendProcess, leftover: Bytes, deadline: Instant) -> Response {
    let relay = Relay::new(backend.stdout, leftover, deadline, backend.kill.clone());

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(parsed.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(header::CACHE_CONTROL, "no-cache");
    for (name, value) in parsed.headers {
        // The gateway owns caching policy.
        if name.eq_ignore_ascii_case("cache-control") {
            continue;
        }
        builder = builder.header(name, value);
    }

    builder
        .body(Body::from_stream(relay))
        .unwrap_or_else(|_| GatewayError::Backend("invalid backend headers".to_string()).into_response())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Extracts and enforces the request content type for a service POST.
///
/// Git clients send exactly `application/x-<service>-request`; anything
/// else never reaches the subprocess.
fn request_content_type<'a>(headers: &'a HeaderMap, service: Service) -> Result<&'a str> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| GatewayError::InvalidQuery("missing content type".to_string()))?
        .to_str()
        .map_err(|_| GatewayError::InvalidQuery("content type".to_string()))?;
    if value != service.request_content_type() {
        return Err(GatewayError::InvalidQuery(format!(
            "content type: {}",
            value
        )));
    }
    Ok(value)
}

/// `GET /repo/{id}/info/refs?service=...` - ref advertisement.
async fn info_refs(
    State(cfg): State<Arc<GatewayConfig>>,
    AxumPath(id): AxumPath<String>,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    validate_repo_id(&id)?;
    let service = parse_info_refs_query(query.as_deref())?;
    let deadline = Instant::now() + cfg.timeout;

    let mut backend = launch(
        &cfg,
        &id,
        Operation::InfoRefs(service),
        query.as_deref(),
        None,
        None,
    )?;
    // No request body for the advertisement.
    drop(backend.stdin.take());

    let (parsed, leftover) = match timeout_at(deadline, read_cgi_prefix(&mut backend.stdout)).await
    {
        Ok(result) => result?,
        Err(_) => {
            backend.kill.fire();
            return Err(GatewayError::Timeout);
        }
    };

    Ok(build_response(parsed, backend, leftover, deadline))
}

/// `POST /repo/{id}/git-upload-pack` - pack download.
///
/// The non-streaming variant: the body is small (wants/haves), bounded
/// by the fetch ceiling, and buffered before the subprocess starts
/// consuming it.
async fn upload_pack(
    State(cfg): State<Arc<GatewayConfig>>,
    AxumPath(id): AxumPath<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    validate_repo_id(&id)?;
    validate_query(Operation::UploadPack, query.as_deref())?;
    let content_type = request_content_type(&headers, Service::UploadPack)?;
    if let Some(declared) = content_length(&headers) {
        if declared > cfg.max_fetch_bytes {
            return Err(GatewayError::PayloadTooLarge);
        }
    }
    let deadline = Instant::now() + cfg.timeout;

    let bytes = axum::body::to_bytes(body, cfg.max_fetch_bytes as usize)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge)?;

    let mut backend = launch(
        &cfg,
        &id,
        Operation::UploadPack,
        None,
        Some(content_type),
        Some(bytes.len() as u64),
    )?;

    let mut stdin = backend
        .stdin
        .take()
        .ok_or_else(|| GatewayError::Backend("backend stdin unavailable".to_string()))?;
    tokio::spawn(async move {
        let _ = stdin.write_all(&bytes).await;
        let _ = stdin.shutdown().await;
    });

    let (parsed, leftover) = match timeout_at(deadline, read_cgi_prefix(&mut backend.stdout)).await
    {
        Ok(result) => result?,
        Err(_) => {
            backend.kill.fire();
            return Err(GatewayError::Timeout);
        }
    };

    Ok(build_response(parsed, backend, leftover, deadline))
}

/// `POST /repo/{id}/git-receive-pack` - pack upload.
///
/// The streaming variant: the inbound body is piped through the size
/// guard into the subprocess, back-pressured, chunk by chunk. The
/// subprocess emits nothing of substance until it has the full pack, so
/// the body is pumped to completion before the CGI headers are read; a
/// guard breach therefore always maps to an explicit payload-too-large
/// response, never a silently truncated one.
async fn receive_pack(
    State(cfg): State<Arc<GatewayConfig>>,
    AxumPath(id): AxumPath<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    validate_repo_id(&id)?;
    validate_query(Operation::ReceivePack, query.as_deref())?;
    let content_type = request_content_type(&headers, Service::ReceivePack)?;
    let declared = content_length(&headers);
    if matches!(declared, Some(len) if len > cfg.max_push_bytes) {
        return Err(GatewayError::PayloadTooLarge);
    }
    let deadline = Instant::now() + cfg.timeout;

    let mut backend = launch(
        &cfg,
        &id,
        Operation::ReceivePack,
        None,
        Some(content_type),
        declared,
    )?;

    let stdin = backend
        .stdin
        .take()
        .ok_or_else(|| GatewayError::Backend("backend stdin unavailable".to_string()))?;

    match timeout_at(deadline, pump_body(body, stdin, cfg.max_push_bytes)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            // Guard breach or client disconnect; the offending chunk was
            // never forwarded. Tear the subprocess down immediately.
            backend.kill.fire();
            return Err(e);
        }
        Err(_) => {
            backend.kill.fire();
            return Err(GatewayError::Timeout);
        }
    }

    let (parsed, leftover) = match timeout_at(deadline, read_cgi_prefix(&mut backend.stdout)).await
    {
        Ok(result) => result?,
        Err(_) => {
            backend.kill.fire();
            return Err(GatewayError::Timeout);
        }
    };

    Ok(build_response(parsed, backend, leftover, deadline))
}

/// Pipes the request body into the subprocess under the size guard.
async fn pump_body(body: Body, mut stdin: ChildStdin, limit: u64) -> Result<()> {
    let mut guard = SizeGuard::new(limit);
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| GatewayError::Backend(format!("client stream error: {}", e)))?;
        guard.absorb(chunk.len())?;
        stdin.write_all(&chunk).await?;
    }

    stdin.shutdown().await?;
    Ok(())
}
