//! Container management

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::models::{ContainerWaitResponse, HostConfig, HostConfigLogConfig};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{DockerError, Result};

/// Container specification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Docker image to use
    pub image: String,

    /// Command arguments passed to the image entrypoint
    pub command: Vec<String>,

    /// Environment variables
    pub environment: HashMap<String, String>,

    /// Bind mounts
    pub mounts: Vec<BindMount>,

    /// User to run as, `uid:gid`
    pub user: Option<String>,

    /// Log driver configuration
    pub log_config: Option<LogConfig>,

    /// Let the runtime delete the container once it stops
    pub auto_remove: bool,
}

/// Bind mount specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path
    pub host_path: PathBuf,

    /// Container path
    pub container_path: String,

    /// Read-only mount
    pub read_only: bool,
}

impl BindMount {
    /// A read-write bind
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self { host_path: host_path.into(), container_path: container_path.into(), read_only: false }
    }

    /// A read-only bind
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self { read_only: true, ..Self::new(host_path, container_path) }
    }

    /// Render in the `host:container[:ro]` form the engine expects
    pub fn to_bind_string(&self) -> String {
        format!(
            "{}:{}{}",
            self.host_path.display(),
            self.container_path,
            if self.read_only { ":ro" } else { "" }
        )
    }
}

/// Log driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Driver name, e.g. `syslog` or `json-file`
    pub driver: String,

    /// Driver options
    pub options: HashMap<String, String>,
}

impl ContainerSpec {
    /// Create a new container specification
    pub fn new(image: String) -> Self {
        Self { image, ..Default::default() }
    }

    /// Set the command arguments
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.environment.insert(key, value);
        self
    }

    /// Add bind mount
    pub fn with_mount(mut self, mount: BindMount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Add several bind mounts
    pub fn with_mounts(mut self, mounts: impl IntoIterator<Item = BindMount>) -> Self {
        self.mounts.extend(mounts);
        self
    }

    /// Set user
    pub fn with_user(mut self, user: String) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the log driver
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = Some(log_config);
        self
    }

    /// Set auto-remove
    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    /// Convert to Bollard container config
    pub fn to_container_config(&self) -> Config<String> {
        let mut env: Vec<String> = self
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.sort();

        let log_config = self
            .log_config
            .as_ref()
            .filter(|log| !log.driver.is_empty())
            .map(|log| HostConfigLogConfig {
                typ: Some(log.driver.clone()),
                config: if log.options.is_empty() { None } else { Some(log.options.clone()) },
            });

        let host_config = HostConfig {
            binds: Some(self.mounts.iter().map(BindMount::to_bind_string).collect()),
            auto_remove: Some(self.auto_remove),
            log_config,
            ..Default::default()
        };

        Config {
            image: Some(self.image.clone()),
            cmd: if self.command.is_empty() { None } else { Some(self.command.clone()) },
            env: Some(env),
            user: self.user.clone(),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// Container manager for executing operations
pub struct ContainerManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ContainerManager<'a> {
    /// Create a new container manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Create a container without starting it
    pub async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let config = spec.to_container_config();
        let options = CreateContainerOptions::<String>::default();

        let container = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(DockerError::Client)?;

        for warning in &container.warnings {
            warn!("Container create warning: {}", warning);
        }

        Ok(container.id)
    }

    /// Start a created container
    pub async fn start(&self, container_id: &str) -> Result<()> {
        self.client
            .start_container::<String>(container_id, None)
            .await
            .map_err(DockerError::Client)
    }

    /// Block until the container is no longer running
    pub async fn wait(&self, container_id: &str) -> Result<()> {
        let options = WaitContainerOptions { condition: "not-running" };
        let mut stream = self.client.wait_container(container_id, Some(options));

        wait_outcome(container_id, stream.next().await)
    }

    /// Stop a container, giving it 10 seconds before it is killed
    pub async fn stop(&self, container_id: &str) -> Result<()> {
        self.client
            .stop_container(container_id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(DockerError::Client)
    }

    /// Create, start and wait for a container. With a timeout, a container
    /// still running when it expires is stopped.
    pub async fn run(&self, spec: &ContainerSpec, wait_timeout: Option<Duration>) -> Result<()> {
        debug!(
            "Creating container with image '{}' and args '{}'",
            spec.image,
            spec.command.join(" ")
        );
        let container_id = self.create(spec).await?;

        debug!("Starting container {}", container_id);
        self.start(&container_id).await?;

        debug!("Waiting for container {} to finish", container_id);
        bounded_wait(&container_id, self.wait(&container_id), wait_timeout, || {
            self.stop(&container_id)
        })
        .await?;

        info!("Container {} finished", container_id);
        Ok(())
    }
}

/// Await `wait`, giving up after `limit`. A container still running then is
/// stopped through `stop`.
///
/// A failed stop leaves the container running after the build lock has been
/// released; it is logged as an error and the timeout is still returned.
async fn bounded_wait<W, S, F>(
    container_id: &str,
    wait: W,
    limit: Option<Duration>,
    stop: S,
) -> Result<()>
where
    W: Future<Output = Result<()>>,
    S: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    let Some(duration) = limit else {
        return wait.await;
    };

    match tokio::time::timeout(duration, wait).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Container {} still running after {:?}, stopping it", container_id, duration);
            if let Err(e) = stop().await {
                error!(
                    "Failed to stop container {} after timeout, it may still be running: {}",
                    container_id, e
                );
            }
            Err(DockerError::Timeout { duration })
        }
    }
}

/// Interpret the first item of a wait stream.
///
/// A runtime error wins over the exit status; a non-zero exit status is a
/// failed build.
fn wait_outcome(
    container_id: &str,
    item: Option<std::result::Result<ContainerWaitResponse, bollard::errors::Error>>,
) -> Result<()> {
    match item {
        Some(Ok(response)) => {
            if let Some(message) = response.error.and_then(|e| e.message) {
                if !message.is_empty() {
                    return Err(DockerError::WaitFailed {
                        id: container_id.to_string(),
                        reason: message,
                    });
                }
            }
            if response.status_code != 0 {
                return Err(DockerError::ContainerFailed {
                    id: container_id.to_string(),
                    code: response.status_code,
                });
            }
            Ok(())
        }
        Some(Err(bollard::errors::Error::DockerContainerWaitError { error, code })) => {
            if error.is_empty() {
                Err(DockerError::ContainerFailed { id: container_id.to_string(), code })
            } else {
                Err(DockerError::WaitFailed { id: container_id.to_string(), reason: error })
            }
        }
        Some(Err(e)) => Err(DockerError::Client(e)),
        None => Err(DockerError::WaitFailed {
            id: container_id.to_string(),
            reason: "wait stream ended unexpectedly".to_string(),
        }),
    }
}
