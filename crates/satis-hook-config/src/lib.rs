//! Configuration management for satis-hook
//!
//! This crate handles YAML configuration parsing, defaulting, validation,
//! environment variable substitution in paths and resolution of the user
//! the build container runs as.

pub mod error;
pub mod user;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

pub use error::{ConfigError, Result};
pub use user::BuildUser;

/// Key of the Satis document that is generated from `repositories`
pub const REPOSITORIES_KEY: &str = "repositories";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address, `host:port` or `:port`
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Shared webhook secret; signatures are not checked without one
    #[serde(default)]
    pub secret: Option<String>,

    /// Account the build runs as; the current user when absent
    #[serde(default)]
    pub user: Option<String>,

    /// Repositories allowed to trigger a build, as `owner/name`
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Static Satis configuration. Its `repositories` key is generated.
    #[serde(default)]
    pub satis_config: Option<Map<String, Value>>,

    /// Build container settings
    #[serde(default)]
    pub container: ContainerConfig,

    /// Host directories
    #[serde(default)]
    pub directories: Directories,
}

/// Build container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image to run
    #[serde(default = "default_image")]
    pub name: String,

    /// Remove the container once it stops
    #[serde(default = "default_true")]
    pub remove: bool,

    /// Log driver
    #[serde(rename = "log-type", default = "default_log_type")]
    pub log_type: String,

    /// Log driver options
    #[serde(rename = "log-args", default)]
    pub log_args: HashMap<String, String>,

    /// Seconds to wait for a build container before stopping it, 0 to wait
    /// forever
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Builds allowed to wait while another one runs
    #[serde(rename = "max-queued", default = "default_max_queued")]
    pub max_queued: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: default_image(),
            remove: true,
            log_type: default_log_type(),
            log_args: HashMap::new(),
            timeout: default_timeout(),
            max_queued: default_max_queued(),
        }
    }
}

/// Host directories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directories {
    /// SSH keys mounted into the container; defaults to `~user/.ssh`
    #[serde(default)]
    pub ssh: Option<PathBuf>,

    /// Composer cache mounted at `/composer`
    #[serde(default)]
    pub composer: Option<PathBuf>,

    /// Build root; defaults to `<cwd>/build`
    #[serde(default)]
    pub build: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let mut config = Self::parse(&content)?;

        // Expand environment variables
        config.expand_env_vars()?;

        if config.directories.build.is_none() {
            let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
            config.directories.build = Some(cwd.join("build"));
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document, generating the Satis repository
    /// list from the allow-list
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;

        if config.secret.as_deref().is_some_and(str::is_empty) {
            config.secret = None;
        }
        if config.user.as_deref().is_some_and(str::is_empty) {
            config.user = None;
        }

        config.validate()?;

        let entries = repository_entries(&config.repositories);
        if let Some(satis) = config.satis_config.as_mut() {
            satis.insert(REPOSITORIES_KEY.to_string(), entries);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.satis_config.is_none() {
            return Err(ConfigError::MissingSatisConfig);
        }

        if self.repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }

        if self.container.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "container image name cannot be empty".to_string(),
            });
        }

        if let Some(repo) = self.repositories.iter().find(|r| !is_repository_name(r)) {
            return Err(ConfigError::Invalid {
                message: format!("repository '{repo}' is not of the form owner/name"),
            });
        }

        Ok(())
    }

    /// Fill defaults that depend on the build user
    pub fn apply_user_defaults(&mut self, user: &BuildUser) {
        if self.directories.ssh.is_none() {
            self.directories.ssh = Some(user.ssh_dir());
        }
    }

    /// Expand environment variables in paths
    fn expand_env_vars(&mut self) -> Result<()> {
        for dir in [
            &mut self.directories.ssh,
            &mut self.directories.composer,
            &mut self.directories.build,
        ] {
            if let Some(path) = dir.as_mut() {
                *path = expand_path(path)?;
            }
        }

        Ok(())
    }

    /// Socket address to bind; `:8080` means every interface
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }

    /// The webhook secret, if signatures are checked
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Whether `repository` may trigger a build
    pub fn is_managed(&self, repository: &str) -> bool {
        self.repositories.iter().any(|r| r == repository)
    }

    /// The Satis document written for every build
    pub fn satis_document(&self) -> Map<String, Value> {
        self.satis_config.clone().unwrap_or_default()
    }

    /// Build root on the host
    pub fn build_dir(&self) -> PathBuf {
        self.directories
            .build
            .clone()
            .unwrap_or_else(|| PathBuf::from("build"))
    }

    /// SSH directory on the host
    pub fn ssh_dir(&self, user: &BuildUser) -> PathBuf {
        self.directories.ssh.clone().unwrap_or_else(|| user.ssh_dir())
    }

    /// How long a build container may run
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self.container.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Load the configuration file and resolve the build user, filling every
/// default that depends on either
pub fn load(path: impl AsRef<Path>) -> Result<(Config, BuildUser)> {
    let mut config = Config::from_file(path)?;
    let user = BuildUser::resolve(config.user.as_deref())?;
    config.apply_user_defaults(&user);

    Ok((config, user))
}

/// Satis `vcs` entries for the given repository names
pub fn repository_entries(repositories: &[String]) -> Value {
    Value::Array(
        repositories
            .iter()
            .map(|name| {
                json!({
                    "type": "vcs",
                    "name": name,
                    "url": format!("git@github.com:{name}.git"),
                })
            })
            .collect(),
    )
}

/// A commented configuration file to start from
pub const SAMPLE_CONFIG: &str = r#"# satis-hook configuration
listen: ":8080"

# Shared secret of the GitHub webhook. Leave empty to skip signature checks.
secret: ""

# Account the build runs as. Defaults to the user running satis-hook.
# user: satis

# Repositories allowed to trigger a build.
repositories:
  - acme/package-a
  - acme/package-b

# Satis configuration. "repositories" is generated from the list above.
satis_config:
  name: acme/packages
  homepage: https://packages.example.com
  require-all: true

container:
  name: composer/satis
  remove: true
  log-type: syslog
  log-args:
    tag: satis
  timeout: 3600
  max-queued: 1

# directories:
#   ssh: ${HOME}/.ssh
#   composer: /var/cache/composer
#   build: /srv/satis/build
"#;

fn is_repository_name(name: &str) -> bool {
    match name.split_once('/') {
        Some((owner, repo)) => !owner.is_empty() && !repo.is_empty() && !repo.contains('/'),
        None => false,
    }
}

/// Expand environment variables in a path
fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    let env_var_re =
        Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex");

    let mut result = path_str.to_string();
    for cap in env_var_re.captures_iter(&path_str) {
        let Some(name) = cap.get(1).or_else(|| cap.get(2)) else {
            continue;
        };
        let value = std::env::var(name.as_str())
            .map_err(|_| ConfigError::EnvVar { name: name.as_str().to_string() })?;

        result = result.replace(&cap[0], &value);
    }

    Ok(PathBuf::from(result))
}

fn default_listen() -> String {
    ":8080".to_string()
}

fn default_image() -> String {
    "composer/satis".to_string()
}

fn default_log_type() -> String {
    "syslog".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    3600
}

fn default_max_queued() -> usize {
    1
}
