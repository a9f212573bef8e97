//! Docker client wrapper

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use tracing::debug;

use crate::container::{ContainerManager, ContainerSpec};
use crate::error::{DockerError, Result};
use crate::image::ImageManager;
use crate::service::DockerServiceTrait;

/// Docker service configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Socket path (None for `DOCKER_HOST` or the platform default)
    pub socket_path: Option<String>,
    /// Upper bound on a single container run; None waits indefinitely
    pub wait_timeout: Option<Duration>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { socket_path: None, wait_timeout: Some(Duration::from_secs(3600)) }
    }
}

/// High-level Docker service wrapper
pub struct DockerService {
    client: Docker,
    config: DockerConfig,
}

impl DockerService {
    /// Connect to the engine and check that it answers
    pub async fn new(config: DockerConfig) -> Result<Self> {
        let client = match &config.socket_path {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(DockerError::Client)?;

        client.ping().await.map_err(DockerError::Client)?;
        debug!("Connected to Docker engine");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl DockerServiceTrait for DockerService {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        ImageManager::new(&self.client).exists(image).await
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        ImageManager::new(&self.client).pull(image).await
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<()> {
        ContainerManager::new(&self.client)
            .run(spec, self.config.wait_timeout)
            .await
    }
}
