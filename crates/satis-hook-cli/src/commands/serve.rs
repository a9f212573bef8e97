//! Serve command implementation
//!
//! Runs a full build, then answers webhooks and signals until terminated.

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use satis_hook_build::{
    forward_signals, run_signal_loop, BuildOrchestrator, BuildScope, ExecutionContext,
    SatisBuilder, ShutdownReason,
};
use satis_hook_server::{serve, WebhookState};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{connect_docker, load_config};

/// Serve command implementation
pub struct ServeCommand {
    config_path: PathBuf,
}

impl ServeCommand {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub async fn execute(&self) -> Result<()> {
        let (config, user) = load_config(&self.config_path)?;
        let config = Arc::new(config);

        let docker = connect_docker(&config).await?;
        let context = ExecutionContext::new();
        let builder = Arc::new(SatisBuilder::new(config.clone(), user, docker, context.clone()));

        let actions = forward_signals(context.clone()).context("Failed to install signal handlers")?;

        info!("Running startup build");
        if let Err(e) = builder.build(BuildScope::all()).await {
            if let Some(reason) = context.reason() {
                info!("Startup build interrupted by {}", reason);
                return Ok(());
            }
            context.cancel(ShutdownReason::FatalError);
            return Err(e).context("Startup build failed");
        }

        let signal_loop = tokio::spawn(run_signal_loop(builder.clone(), context.clone(), actions));

        let listen = config.listen_addr();
        let listener = match TcpListener::bind(&listen).await {
            Ok(listener) => listener,
            Err(e) => {
                context.cancel(ShutdownReason::FatalError);
                return Err(e).with_context(|| format!("Failed to listen on {listen}"));
            }
        };

        let state = Arc::new(WebhookState::new(
            config.secret.clone(),
            config.repositories.clone(),
            builder,
        ));

        let served = serve(listener, state, context.clone()).await;
        if served.is_err() {
            context.cancel(ShutdownReason::FatalError);
        }

        if let Err(e) = signal_loop.await {
            warn!("Signal loop ended abnormally: {}", e);
        }
        served.context("Webhook listener failed")?;

        match context.reason() {
            Some(reason) => info!("Shut down after {}", reason),
            None => info!("Shut down"),
        }
        Ok(())
    }
}
