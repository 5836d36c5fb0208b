//! Collects interactions and writes them as a YAML cassette.

use std::path::PathBuf;

use chrono::Utc;

use super::format::{Cassette, Interaction};
use crate::error::TatttyError;

/// Accumulates interactions for one session across all ports.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    commit: String,
    interactions: Vec<Interaction>,
}

impl CassetteRecorder {
    /// Create a recorder that will write to `path` on [`finish`](Self::finish).
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            commit: commit.into(),
            interactions: Vec::new(),
        }
    }

    /// Append an interaction; `seq` follows insertion order.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let seq = self.interactions.len() as u64;
        self.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.into(),
            input,
            output,
        });
    }

    /// Write the cassette and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be produced or written.
    pub fn finish(self) -> Result<PathBuf, TatttyError> {
        let cassette = Cassette {
            name: self.name,
            recorded_at: Utc::now(),
            commit: self.commit,
            interactions: self.interactions,
        };
        let yaml = serde_yaml::to_string(&cassette)
            .map_err(|e| TatttyError::Config(format!("Failed to encode cassette: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, yaml)?;
        Ok(self.path)
    }
}
