//! Docker image management

use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::ImageSummary;
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::{DockerError, Result};
use crate::progress::{render, PullMessage, PullProgress};

/// Docker image manager
pub struct ImageManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ImageManager<'a> {
    /// Create a new image manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Pull an image from registry
    pub async fn pull(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions { from_image: image, ..Default::default() };

        info!("Pulling Docker image: {}", image);

        let mut stream = self.client.create_image(Some(options), None, None);
        let mut progress = PullProgress::default();

        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| DockerError::PullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;

            match render(&message) {
                PullMessage::Line(line) => debug!("{}", line),
                PullMessage::Error(reason) => {
                    return Err(DockerError::PullFailed { image: image.to_string(), reason });
                }
                PullMessage::Empty => {}
            }
            progress.update(&message);
        }

        info!("Successfully pulled image {}: {}", image, progress.summary());
        Ok(())
    }

    /// Check if image exists locally
    pub async fn exists(&self, image: &str) -> Result<bool> {
        let options = ListImagesOptions::<String> { all: false, ..Default::default() };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(DockerError::Client)?;

        Ok(has_tag(&images, image))
    }
}

/// Give an image reference an explicit tag, `latest` when it has none.
///
/// A colon before the last `/` belongs to a registry port, not a tag, and a
/// digest reference is left untouched.
pub fn normalize_image_ref(image: &str) -> String {
    if image.contains('@') {
        return image.to_string();
    }

    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    }
}

/// Whether any of the listed images carries `image` as one of its tags
pub fn has_tag(images: &[ImageSummary], image: &str) -> bool {
    let tag = normalize_image_ref(image);
    images
        .iter()
        .any(|summary| summary.repo_tags.iter().any(|t| *t == tag))
}
