//! Validate command implementation

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use satis_hook_docker::DockerServiceTrait;
use tracing::{info, warn};

use super::{connect_docker, load_config};

/// Validate command implementation
pub struct ValidateCommand {
    config_path: PathBuf,
    check_docker: bool,
}

impl ValidateCommand {
    pub fn new(config_path: PathBuf, check_docker: bool) -> Self {
        Self { config_path, check_docker }
    }

    pub async fn execute(&self) -> Result<()> {
        info!("Validating configuration");

        let (config, user) = load_config(&self.config_path)?;
        println!("✓ Configuration loaded successfully");
        println!("✓ Building as {} ({}:{})", user.name, user.uid, user.gid);
        println!("✓ Listening on {}", config.listen_addr());

        if config.secret().is_none() {
            warn!("No webhook secret configured, signatures will not be checked");
        }

        println!("✓ {} managed repositories:", config.repositories.len());
        for repository in &config.repositories {
            println!("  - {repository}");
        }

        let ssh_dir = config.ssh_dir(&user);
        if ssh_dir.is_dir() {
            println!("✓ SSH directory: {}", ssh_dir.display());
        } else {
            warn!("SSH directory does not exist: {}", ssh_dir.display());
        }
        println!("✓ Build directory: {}", config.build_dir().display());

        if self.check_docker {
            info!("Checking Docker availability");
            let docker = connect_docker(&config).await?;
            println!("✓ Docker is available");

            let image = &config.container.name;
            let present = docker
                .image_exists(image)
                .await
                .context("Failed to list Docker images")?;
            if present {
                println!("✓ Image {image} is present");
            } else {
                println!("! Image {image} is not present and will be pulled on the first build");
            }
        }

        println!("\n✓ All validation checks passed!");
        Ok(())
    }
}
