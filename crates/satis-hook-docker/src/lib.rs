//! Docker integration for satis-hook
//!
//! This crate owns every interaction with the container runtime: checking
//! for and pulling the build image, and running the build container to
//! completion.

pub mod client;
pub mod container;
pub mod error;
pub mod image;
pub mod progress;
pub mod service;

pub use client::{DockerConfig, DockerService};
pub use container::{BindMount, ContainerSpec, LogConfig};
pub use error::{DockerError, Result};
pub use image::{normalize_image_ref, ImageManager};
pub use progress::{PullMessage, PullProgress};
pub use service::DockerServiceTrait;
