//! Pull command implementation

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use satis_hook_docker::DockerServiceTrait;

use super::{connect_docker, load_config};

/// Pull the build image again
pub struct PullCommand {
    config_path: PathBuf,
}

impl PullCommand {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub async fn execute(&self) -> Result<()> {
        let (config, _) = load_config(&self.config_path)?;
        let docker = connect_docker(&config).await?;

        let image = &config.container.name;
        docker
            .pull_image(image)
            .await
            .with_context(|| format!("Failed to pull {image}"))?;

        println!("✓ Pulled {image}");
        Ok(())
    }
}
