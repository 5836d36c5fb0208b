//! On-disk cassette layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded session: every port call in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    /// Session name, usually `<timestamp>-<command>`.
    pub name: String,
    /// When the session was written.
    pub recorded_at: DateTime<Utc>,
    /// Git commit the recording was made from.
    pub commit: String,
    /// Recorded calls.
    pub interactions: Vec<Interaction>,
}

/// One port call with its input and `{"Ok": ..}` / `{"Err": ..}` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Global sequence number within the cassette.
    pub seq: u64,
    /// Port name, e.g. `chat_completer`.
    pub port: String,
    /// Method name on the port.
    pub method: String,
    /// Serialized request.
    pub input: serde_json::Value,
    /// Serialized result.
    pub output: serde_json::Value,
}
