//! Build orchestration logic

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use satis_hook_config::{BuildUser, Config};
use satis_hook_docker::{BindMount, ContainerSpec, DockerServiceTrait, LogConfig};
use tracing::{debug, info, warn};

use crate::{
    context::ExecutionContext,
    error::{BuildError, Result},
    lock::BuildLock,
    workspace::{self, CONFIG_FILE, OUTPUT_DIR},
};

/// Where the build root is mounted inside the container
pub const BUILD_MOUNT: &str = "/build";

/// Where the Composer cache is mounted inside the container
pub const COMPOSER_MOUNT: &str = "/composer";

/// Host identity files mounted read-only so the mapped uid resolves
const IDENTITY_FILES: [&str; 3] = ["group", "passwd", "shadow"];

/// Repositories a build is restricted to. Empty means all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildScope(Vec<String>);

impl BuildScope {
    /// Build every configured repository
    pub fn all() -> Self {
        Self(Vec::new())
    }

    /// Build only the given repositories
    pub fn repositories<I, S>(repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(repositories.into_iter().map(Into::into).collect())
    }

    /// Whether this is a full build
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    /// The repositories in scope; empty for a full build
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for BuildScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "all repositories")
        } else {
            write!(f, "{}", self.0.join(", "))
        }
    }
}

/// Trait for build orchestration
#[async_trait]
pub trait BuildOrchestrator: Send + Sync {
    /// Run one build, restricted to `scope`
    async fn build(&self, scope: BuildScope) -> Result<()>;

    /// Pull the build image again, whether or not it is present
    async fn refresh_image(&self) -> Result<()>;
}

/// Runs Satis in a container against the configured repositories
pub struct SatisBuilder {
    /// Loaded configuration
    config: Arc<Config>,
    /// Account the container runs as
    user: BuildUser,
    /// Container runtime
    docker: Arc<dyn DockerServiceTrait>,
    /// Shared cancellation
    context: ExecutionContext,
    /// One build at a time
    lock: BuildLock,
}

impl SatisBuilder {
    /// Create a new builder
    pub fn new(
        config: Arc<Config>,
        user: BuildUser,
        docker: Arc<dyn DockerServiceTrait>,
        context: ExecutionContext,
    ) -> Self {
        let lock = BuildLock::new(config.container.max_queued);
        Self { config, user, docker, context, lock }
    }

    /// The execution context builds run under
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The build lock
    pub fn lock(&self) -> &BuildLock {
        &self.lock
    }

    /// Pull the build image if the engine does not have it
    pub async fn ensure_image(&self) -> Result<()> {
        let image = &self.config.container.name;
        let exists = self
            .context
            .run(async { self.docker.image_exists(image).await.map_err(BuildError::from) })
            .await?;

        if exists {
            debug!("Docker image '{}' found", image);
            return Ok(());
        }

        debug!("Docker image '{}' does not exist, fetching", image);
        self.context
            .run(async { self.docker.pull_image(image).await.map_err(BuildError::from) })
            .await
    }

    /// Arguments for the Satis entrypoint. Scoped builds append each
    /// repository name.
    pub fn build_args(scope: &BuildScope) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--no-interaction".to_string(),
            format!("{BUILD_MOUNT}/{CONFIG_FILE}"),
            format!("{BUILD_MOUNT}/{OUTPUT_DIR}"),
        ];
        args.extend(scope.as_slice().iter().cloned());
        args
    }

    /// Host directories the build container sees
    pub fn bind_mounts(&self) -> Vec<BindMount> {
        let mut mounts = vec![
            BindMount::new(
                self.config.ssh_dir(&self.user),
                self.user.ssh_dir().display().to_string(),
            ),
            BindMount::new(self.config.build_dir(), BUILD_MOUNT),
        ];

        for file in IDENTITY_FILES {
            let path = format!("/etc/{file}");
            mounts.push(BindMount::read_only(&path, path.clone()));
        }

        if let Some(composer) = &self.config.directories.composer {
            mounts.push(BindMount::new(composer.clone(), COMPOSER_MOUNT));
        }

        mounts
    }

    /// The container to run for `scope`
    pub fn container_spec(&self, scope: &BuildScope) -> ContainerSpec {
        let container = &self.config.container;

        ContainerSpec::new(container.name.clone())
            .with_command(Self::build_args(scope))
            .with_user(self.user.container_user())
            .with_env("HOME".to_string(), self.user.home.display().to_string())
            .with_log_config(LogConfig {
                driver: container.log_type.clone(),
                options: container.log_args.clone(),
            })
            .with_auto_remove(container.remove)
            .with_mounts(self.bind_mounts())
    }

    async fn run_build(&self, scope: &BuildScope) -> Result<()> {
        self.ensure_image().await?;

        let (uid, gid) = (self.user.uid, self.user.gid);
        debug!("Building as {} ({}:{})", self.user.name, uid, gid);

        let build_dir = self.config.build_dir();
        debug!("Checking out directory {}", build_dir.display());
        workspace::prepare_directories(&build_dir, uid, gid)?;

        debug!("Dumping satis config");
        workspace::write_build_config(&build_dir, &self.config.satis_document(), uid, gid)?;

        let spec = self.container_spec(scope);
        self.context
            .run(async { self.docker.run_container(&spec).await.map_err(BuildError::from) })
            .await
    }
}

#[async_trait]
impl BuildOrchestrator for SatisBuilder {
    async fn build(&self, scope: BuildScope) -> Result<()> {
        let _permit = self.context.run(self.lock.acquire()).await?;
        info!("Starting build of {}", scope);

        match self.run_build(&scope).await {
            Ok(()) => {
                info!("Build of {} completed successfully", scope);
                Ok(())
            }
            Err(e) => {
                if e.is_shutdown() {
                    info!("Build of {} was cancelled", scope);
                } else {
                    warn!("Build of {} failed: {}", scope, e);
                }
                Err(e)
            }
        }
    }

    async fn refresh_image(&self) -> Result<()> {
        let image = &self.config.container.name;
        info!("Refreshing image {}", image);
        self.context
            .run(async { self.docker.pull_image(image).await.map_err(BuildError::from) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_build_args() {
        assert_eq!(
            SatisBuilder::build_args(&BuildScope::all()),
            vec!["build", "--no-interaction", "/build/satis.json", "/build/out"]
        );
    }

    #[test]
    fn test_scoped_build_args() {
        let args = SatisBuilder::build_args(&BuildScope::repositories(["org/a", "org/b"]));
        assert_eq!(
            args,
            vec!["build", "--no-interaction", "/build/satis.json", "/build/out", "org/a", "org/b"]
        );
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(BuildScope::all().to_string(), "all repositories");
        assert_eq!(BuildScope::repositories(["org/a"]).to_string(), "org/a");
        assert!(BuildScope::repositories(Vec::<String>::new()).is_all());
    }
}
