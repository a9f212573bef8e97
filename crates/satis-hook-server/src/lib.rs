//! Webhook receiver for satis-hook
//!
//! Accepts GitHub push events over HTTP, authenticates them and triggers a
//! build scoped to the pushed repository.

pub mod error;
pub mod payload;
pub mod signature;
pub mod webhook;

use std::sync::Arc;

use satis_hook_build::ExecutionContext;
use tokio::net::TcpListener;
use tracing::info;

pub use error::{Result, WebhookError};
pub use payload::PushEvent;
pub use signature::{sign, SignedBody};
pub use webhook::{handle_webhook, router, Outcome, WebhookState};

/// Serve webhooks on `listener` until `context` is cancelled
pub async fn serve(
    listener: TcpListener,
    state: Arc<WebhookState>,
    context: ExecutionContext,
) -> std::io::Result<()> {
    info!("Listening for webhooks on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(context.cancelled())
        .await?;

    info!("Webhook listener stopped");
    Ok(())
}
