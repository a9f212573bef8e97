//! GitHub push webhook handler

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use satis_hook_build::{BuildOrchestrator, BuildScope};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::{Result, WebhookError};
use crate::payload::PushEvent;
use crate::signature::SignedBody;

/// Event type header
pub const EVENT_HEADER: &str = "x-github-event";

/// Signature header
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Correlation id set on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest body accepted, GitHub's payload cap
pub const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

const PUSH_EVENT: &str = "push";

/// Shared state of the webhook handler
pub struct WebhookState {
    secret: Option<String>,
    repositories: Vec<String>,
    orchestrator: Arc<dyn BuildOrchestrator>,
    body_limit: usize,
}

impl WebhookState {
    /// Create handler state. An empty secret disables signature checks.
    pub fn new(
        secret: Option<String>,
        repositories: Vec<String>,
        orchestrator: Arc<dyn BuildOrchestrator>,
    ) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { secret, repositories, orchestrator, body_limit: MAX_BODY_SIZE }
    }

    /// Reject bodies longer than `limit` bytes
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    fn is_managed(&self, repository: &str) -> bool {
        self.repositories.iter().any(|r| r == repository)
    }
}

/// How an accepted request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The repository is not in the allow-list
    NotManaged,
    /// The repository was rebuilt
    Built,
}

/// Router answering every path and method with [`handle_webhook`]
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new().fallback(handle_webhook).with_state(state)
}

/// Validate, authenticate and decode a push event, then build the pushed
/// repository if it is managed
pub async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("webhook", request_id = %request_id);

    let mut response = match process(&state, &headers, body).instrument(span.clone()).await {
        Ok(Outcome::Built) => (StatusCode::OK, "build completed").into_response(),
        Ok(Outcome::NotManaged) => (StatusCode::OK, "repository not managed").into_response(),
        Err(e) => {
            span.in_scope(|| match e.status() {
                status if status.is_server_error() => error!("Request failed: {}", e),
                _ => warn!("Request rejected: {}", e),
            });
            e.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn process(state: &WebhookState, headers: &HeaderMap, body: Body) -> Result<Outcome> {
    let secret = state.secret.as_deref();
    let signature = validate(headers, secret)?;

    let body = SignedBody::read(body, secret, state.body_limit).await?;
    let bytes = body.verify(signature)?;

    let event = PushEvent::from_slice(&bytes)?;
    info!(
        "Received push on {} from {} for {}",
        event.git_ref,
        event.sender.login,
        event.repository()
    );

    if !state.is_managed(event.repository()) {
        debug!("Repository {} is not managed, ignoring", event.repository());
        return Ok(Outcome::NotManaged);
    }

    // The build owns its task: a client hanging up must not abandon it while
    // the container still runs
    let orchestrator = Arc::clone(&state.orchestrator);
    let scope = BuildScope::repositories([event.repository()]);
    let build = tokio::spawn(
        async move { orchestrator.build(scope).await }.instrument(Span::current()),
    );

    build
        .await
        .map_err(|e| WebhookError::Internal(format!("build task failed: {e}")))??;

    Ok(Outcome::Built)
}

/// Check headers before the body is read. Returns the signature header when
/// a secret is configured.
fn validate<'a>(headers: &'a HeaderMap, secret: Option<&str>) -> Result<Option<&'a str>> {
    let event = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    if event != Some(PUSH_EVENT) {
        return Err(WebhookError::InvalidRequest("not a push event"));
    }

    if secret.is_none() {
        return Ok(None);
    }

    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(Some)
        .ok_or(WebhookError::InvalidRequest("missing signature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_validate_requires_push_event() {
        assert!(validate(&headers(&[]), None).is_err());
        assert!(validate(&headers(&[(EVENT_HEADER, "ping")]), None).is_err());
        assert_eq!(validate(&headers(&[(EVENT_HEADER, "push")]), None).unwrap(), None);
    }

    #[test]
    fn test_validate_requires_signature_with_secret() {
        let err = validate(&headers(&[(EVENT_HEADER, "push")]), Some("s")).unwrap_err();
        assert!(matches!(err, WebhookError::InvalidRequest("missing signature")));

        let signed = headers(&[(EVENT_HEADER, "push"), (SIGNATURE_HEADER, "sha1=00")]);
        assert_eq!(validate(&signed, Some("s")).unwrap(), Some("sha1=00"));
    }

    #[test]
    fn test_signature_ignored_without_secret() {
        let signed = headers(&[(EVENT_HEADER, "push"), (SIGNATURE_HEADER, "sha1=00")]);
        assert_eq!(validate(&signed, None).unwrap(), None);
    }
}
