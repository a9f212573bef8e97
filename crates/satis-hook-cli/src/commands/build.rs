//! Build command implementation

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Context, Result};
use satis_hook_build::workspace::OUTPUT_DIR;
use satis_hook_build::{BuildOrchestrator, BuildScope, ExecutionContext, SatisBuilder, ShutdownReason};
use tracing::info;

use super::{connect_docker, load_config};

/// One-shot build, optionally restricted to some repositories
pub struct BuildCommand {
    config_path: PathBuf,
    repositories: Vec<String>,
}

impl BuildCommand {
    pub fn new(config_path: PathBuf, repositories: Vec<String>) -> Self {
        Self { config_path, repositories }
    }

    pub async fn execute(&self) -> Result<()> {
        let (config, user) = load_config(&self.config_path)?;

        if let Some(unknown) = self.repositories.iter().find(|r| !config.is_managed(r)) {
            return Err(eyre!("Repository {} is not listed in the configuration", unknown));
        }

        let output = config.build_dir().join(OUTPUT_DIR);
        let config = Arc::new(config);
        let docker = connect_docker(&config).await?;
        let context = ExecutionContext::new();
        let builder = SatisBuilder::new(config, user, docker, context.clone());

        let interrupt = tokio::spawn({
            let context = context.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    context.cancel(ShutdownReason::Interrupt);
                }
            }
        });

        let scope = BuildScope::repositories(self.repositories.iter().cloned());
        info!("Building {}", scope);
        let result = builder.build(scope).await;
        interrupt.abort();

        result.context("Build failed")?;

        println!("✓ Satis build completed: {}", output.display());
        Ok(())
    }
}
