//! Push event payload

use serde::Deserialize;

/// The parts of a GitHub push event the receiver looks at.
///
/// Every field is optional on the wire; absent ones decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    /// Pushed ref, e.g. `refs/heads/main`
    #[serde(rename = "ref", default)]
    pub git_ref: String,

    #[serde(default)]
    pub repository: Repository,

    #[serde(default)]
    pub sender: Sender,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Repository {
    /// `owner/name`
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub login: String,
}

impl PushEvent {
    /// Decode a raw request body
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Repository the push went to
    pub fn repository(&self) -> &str {
        &self.repository.full_name
    }
}
