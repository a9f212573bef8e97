//! End-to-end tests of the webhook receiver against a mock orchestrator

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use satis_hook_build::{
    BuildError, BuildLock, BuildOrchestrator, BuildScope, ExecutionContext, ShutdownReason,
};
use satis_hook_server::webhook::{EVENT_HEADER, REQUEST_ID_HEADER, SIGNATURE_HEADER};
use satis_hook_server::{handle_webhook, serve, sign, WebhookState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const SECRET: &str = "hook-secret";

/// Records every build it is asked for
#[derive(Default)]
struct MockOrchestrator {
    builds: Mutex<Vec<BuildScope>>,
    failure: Mutex<Option<BuildError>>,
}

impl MockOrchestrator {
    fn failing(error: BuildError) -> Self {
        Self { failure: Mutex::new(Some(error)), ..Default::default() }
    }

    fn builds(&self) -> Vec<BuildScope> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildOrchestrator for MockOrchestrator {
    async fn build(&self, scope: BuildScope) -> satis_hook_build::Result<()> {
        self.builds.lock().unwrap().push(scope);
        match self.failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn refresh_image(&self) -> satis_hook_build::Result<()> {
        Ok(())
    }
}

/// Holds the build lock for a while, like a running container
struct SlowOrchestrator {
    lock: BuildLock,
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowOrchestrator {
    fn new(delay: Duration) -> Self {
        Self {
            lock: BuildLock::new(1),
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BuildOrchestrator for SlowOrchestrator {
    async fn build(&self, _scope: BuildScope) -> satis_hook_build::Result<()> {
        let _permit = self.lock.acquire().await?;
        self.started.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_image(&self) -> satis_hook_build::Result<()> {
        Ok(())
    }
}

fn state(secret: Option<&str>, orchestrator: Arc<MockOrchestrator>) -> Arc<WebhookState> {
    Arc::new(WebhookState::new(
        secret.map(str::to_string),
        vec!["org/a".to_string(), "org/b".to_string()],
        orchestrator,
    ))
}

fn push_body(repository: &str) -> Vec<u8> {
    serde_json::json!({
        "ref": "refs/heads/main",
        "repository": {"full_name": repository},
        "sender": {"login": "octocat"}
    })
    .to_string()
    .into_bytes()
}

fn push_headers(signature: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(EVENT_HEADER, HeaderValue::from_static("push"));
    if let Some(signature) = signature {
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
    }
    headers
}

fn raw_request(addr: std::net::SocketAddr, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST / HTTP/1.1\r\nHost: {addr}\r\nX-GitHub-Event: push\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

async fn wait_for(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn call(state: Arc<WebhookState>, headers: HeaderMap, body: Vec<u8>) -> Response {
    handle_webhook(State(state), headers, Body::from(body)).await
}

fn assert_request_id(response: &Response) {
    let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert_eq!(id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_signed_push_builds_repository() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let body = push_body("org/a");
    let signature = sign(SECRET, &body).unwrap();

    let response = call(state(Some(SECRET), orchestrator.clone()), push_headers(Some(&signature)), body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_request_id(&response);
    assert_eq!(orchestrator.builds(), vec![BuildScope::repositories(["org/a"])]);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let body = push_body("org/a");
    let signature = sign(SECRET, &body).unwrap();

    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 0x01;

    let response = call(state(Some(SECRET), orchestrator.clone()), push_headers(Some(&signature)), tampered).await;

    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_request_id(&response);
    assert!(orchestrator.builds().is_empty());
}

#[tokio::test]
async fn test_unsigned_request_accepted_without_secret() {
    let orchestrator = Arc::new(MockOrchestrator::default());

    let response = call(state(None, orchestrator.clone()), push_headers(None), push_body("org/b")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(orchestrator.builds(), vec![BuildScope::repositories(["org/b"])]);
}

#[tokio::test]
async fn test_empty_secret_disables_signature_check() {
    let orchestrator = Arc::new(MockOrchestrator::default());

    let response = call(state(Some(""), orchestrator.clone()), push_headers(None), push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(orchestrator.builds().len(), 1);
}

#[tokio::test]
async fn test_missing_signature_rejected_with_secret() {
    let orchestrator = Arc::new(MockOrchestrator::default());

    let response = call(state(Some(SECRET), orchestrator.clone()), push_headers(None), push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_request_id(&response);
    assert!(orchestrator.builds().is_empty());
}

#[tokio::test]
async fn test_non_push_event_rejected() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let mut headers = HeaderMap::new();
    headers.insert(EVENT_HEADER, HeaderValue::from_static("ping"));

    let response = call(state(None, orchestrator.clone()), headers, push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(orchestrator.builds().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_rejected() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let body = b"{\"repository\":".to_vec();
    let signature = sign(SECRET, &body).unwrap();

    let response = call(state(Some(SECRET), orchestrator.clone()), push_headers(Some(&signature)), body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(orchestrator.builds().is_empty());
}

#[tokio::test]
async fn test_unmanaged_repository_is_silent_success() {
    let orchestrator = Arc::new(MockOrchestrator::default());

    let response = call(state(None, orchestrator.clone()), push_headers(None), push_body("org/other")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(orchestrator.builds().is_empty());

    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"repository not managed");
}

#[tokio::test]
async fn test_build_failure_is_server_error() {
    let orchestrator = Arc::new(MockOrchestrator::failing(BuildError::workspace(
        "/build",
        "permission denied",
    )));

    let response = call(state(None, orchestrator.clone()), push_headers(None), push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_request_id(&response);
    assert_eq!(orchestrator.builds().len(), 1);
}

#[tokio::test]
async fn test_busy_builder_is_unavailable() {
    let orchestrator = Arc::new(MockOrchestrator::failing(BuildError::BuildInProgress { queued: 1 }));

    let response = call(state(None, orchestrator), push_headers(None), push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let state = state(None, orchestrator);

    let first = call(state.clone(), push_headers(None), push_body("org/other")).await;
    let second = call(state, push_headers(None), push_body("org/other")).await;

    assert_ne!(
        first.headers().get(REQUEST_ID_HEADER),
        second.headers().get(REQUEST_ID_HEADER)
    );
}

#[tokio::test]
async fn test_listener_serves_until_cancelled() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let context = ExecutionContext::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(listener, state(Some(SECRET), orchestrator.clone()), context.clone()));

    let body = push_body("org/a");
    let signature = sign(SECRET, &body).unwrap();
    let request = format!(
        "POST /any/path HTTP/1.1\r\nHost: {addr}\r\nX-GitHub-Event: push\r\nX-Hub-Signature: {signature}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();

    let mut response = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.to_ascii_lowercase().contains("x-request-id: "));
    assert_eq!(orchestrator.builds(), vec![BuildScope::repositories(["org/a"])]);

    context.cancel(ShutdownReason::Terminate);
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let orchestrator = Arc::new(MockOrchestrator::default());
    let state = Arc::new(
        WebhookState::new(None, vec!["org/a".to_string()], orchestrator.clone()).with_body_limit(16),
    );

    let response = call(state, push_headers(None), push_body("org/a")).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_request_id(&response);
    assert!(orchestrator.builds().is_empty());
}

#[tokio::test]
async fn test_client_disconnect_keeps_build_running() {
    let orchestrator = Arc::new(SlowOrchestrator::new(Duration::from_millis(500)));
    let context = ExecutionContext::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(WebhookState::new(
        None,
        vec!["org/a".to_string(), "org/b".to_string()],
        orchestrator.clone(),
    ));
    let server = tokio::spawn(serve(listener, state, context.clone()));

    // First client hangs up while its build runs
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(&raw_request(addr, &push_body("org/a"))).await.unwrap();
    wait_for(|| orchestrator.started.load(Ordering::SeqCst) == 1).await;
    drop(first);

    // Second client hangs up while queued behind it
    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(&raw_request(addr, &push_body("org/b"))).await.unwrap();
    wait_for(|| orchestrator.lock.queued() == 1).await;
    drop(second);

    sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.lock.is_busy());
    assert_eq!(orchestrator.finished.load(Ordering::SeqCst), 0);

    // Both builds still run to completion, one after the other
    wait_for(|| orchestrator.finished.load(Ordering::SeqCst) == 2).await;
    assert_eq!(orchestrator.started.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.lock.queued(), 0);
    assert!(!orchestrator.lock.is_busy());

    context.cancel(ShutdownReason::Terminate);
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
