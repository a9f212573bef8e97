//! Docker service trait

use async_trait::async_trait;

use crate::container::ContainerSpec;
use crate::error::Result;

/// The container runtime operations a build needs.
///
/// Errors from the runtime are propagated unchanged; nothing here retries.
#[async_trait]
pub trait DockerServiceTrait: Send + Sync {
    /// Check if an image exists locally. `foo` and `foo:latest` are the same image.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image, reporting streamed progress to the log
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create and start a container from `spec`, then block until it is no
    /// longer running
    async fn run_container(&self, spec: &ContainerSpec) -> Result<()>;
}
