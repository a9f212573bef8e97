//! Image pull progress rendering
//!
//! The engine streams one structured message per pull event. Each message is
//! rendered to a single log line; an embedded error ends the pull.

use std::collections::BTreeSet;

use bollard::models::CreateImageInfo;

/// One rendered pull message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullMessage {
    /// A line for the log sink
    Line(String),
    /// The engine reported a failure
    Error(String),
    /// Nothing worth logging
    Empty,
}

/// Render a pull message as `"<id>: <status>"`, the id being omitted when
/// the message is not about a specific layer.
pub fn render(info: &CreateImageInfo) -> PullMessage {
    if let Some(error) = error_message(info) {
        return PullMessage::Error(error);
    }

    let status = info.status.as_deref().unwrap_or_default().trim_end();
    if status.is_empty() {
        return PullMessage::Empty;
    }

    match info.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => PullMessage::Line(format!("{id}: {status}")),
        None => PullMessage::Line(status.to_string()),
    }
}

fn error_message(info: &CreateImageInfo) -> Option<String> {
    info.error
        .clone()
        .filter(|e| !e.is_empty())
        .or_else(|| info.error_detail.as_ref().and_then(|d| d.message.clone()))
        .filter(|e| !e.is_empty())
}

/// Layer bookkeeping for a single pull
#[derive(Debug, Clone, Default)]
pub struct PullProgress {
    /// Layers seen in the stream
    pub layers: BTreeSet<String>,
    /// Layers downloaded and extracted by this pull
    pub pulled: BTreeSet<String>,
    /// Layers that were already present locally
    pub cached: BTreeSet<String>,
    /// Rendered lines so far
    pub messages: usize,
}

impl PullProgress {
    /// Update progress with a message
    pub fn update(&mut self, info: &CreateImageInfo) {
        self.messages += 1;

        // Messages without an id are about the image as a whole
        let Some(id) = info.id.as_deref().filter(|id| !id.is_empty()) else {
            return;
        };
        let status = info.status.as_deref().unwrap_or_default();

        // The first message of a pull carries the tag as id
        if status.starts_with("Pulling from") {
            return;
        }

        self.layers.insert(id.to_string());
        match status {
            "Pull complete" => {
                self.pulled.insert(id.to_string());
            }
            "Already exists" => {
                self.cached.insert(id.to_string());
            }
            _ => {}
        }
    }

    /// One-line summary for the end of a pull
    pub fn summary(&self) -> String {
        format!(
            "{} layers ({} pulled, {} already present)",
            self.layers.len(),
            self.pulled.len(),
            self.cached.len()
        )
    }
}
