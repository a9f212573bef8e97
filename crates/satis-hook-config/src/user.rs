//! Build user resolution

use std::path::PathBuf;

use nix::unistd::{getuid, User};

use crate::error::{ConfigError, Result};

/// The host account the build container runs as.
///
/// Every path the container touches on the host is owned by this uid/gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUser {
    /// Login name
    pub name: String,
    /// Numeric user id
    pub uid: u32,
    /// Numeric primary group id
    pub gid: u32,
    /// Home directory
    pub home: PathBuf,
}

impl BuildUser {
    /// Resolve a user by name, or the user running this process when `name`
    /// is `None`
    pub fn resolve(name: Option<&str>) -> Result<Self> {
        match name {
            Some(name) => Self::by_name(name),
            None => Self::current(),
        }
    }

    /// Look up a user by login name
    pub fn by_name(name: &str) -> Result<Self> {
        let user = User::from_name(name)
            .map_err(|e| ConfigError::User { name: name.to_string(), reason: e.to_string() })?
            .ok_or_else(|| ConfigError::User {
                name: name.to_string(),
                reason: "unknown user".to_string(),
            })?;

        Ok(user.into())
    }

    /// The user running this process
    pub fn current() -> Result<Self> {
        let uid = getuid();
        let user = User::from_uid(uid)
            .map_err(|e| ConfigError::User { name: uid.to_string(), reason: e.to_string() })?
            .ok_or_else(|| ConfigError::User {
                name: uid.to_string(),
                reason: "no passwd entry for current uid".to_string(),
            })?;

        Ok(user.into())
    }

    /// `uid:gid`, the form the container runtime takes for its user option
    pub fn container_user(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }

    /// Default location of the user's SSH keys
    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }
}

impl From<User> for BuildUser {
    fn from(user: User) -> Self {
        Self { name: user.name, uid: user.uid.as_raw(), gid: user.gid.as_raw(), home: user.dir }
    }
}
