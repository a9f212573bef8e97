//! CLI command implementations

pub mod build;
pub mod init;
pub mod pull;
pub mod serve;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use satis_hook_config::{BuildUser, Config};
use satis_hook_docker::{DockerConfig, DockerService};
use tracing::debug;

pub use build::BuildCommand;
pub use init::InitCommand;
pub use pull::PullCommand;
pub use serve::ServeCommand;
pub use validate::ValidateCommand;

/// Load the configuration file and resolve the build user
fn load_config(path: &Path) -> Result<(Config, BuildUser)> {
    let (config, user) = satis_hook_config::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    debug!(
        "Loaded {} repositories, building as {} ({}:{})",
        config.repositories.len(),
        user.name,
        user.uid,
        user.gid
    );
    Ok((config, user))
}

/// Connect to the Docker engine with the configured wait timeout
async fn connect_docker(config: &Config) -> Result<Arc<DockerService>> {
    let docker_config = DockerConfig { wait_timeout: config.wait_timeout(), ..Default::default() };

    let docker = DockerService::new(docker_config)
        .await
        .context("Failed to connect to Docker")?;
    Ok(Arc::new(docker))
}
