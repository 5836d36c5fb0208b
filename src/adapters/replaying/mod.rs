//! Replaying adapters that serve recorded interactions from cassettes.

pub mod chat_completer;
pub mod image_generator;
pub mod search_index;

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::cassette::replayer::CassetteReplayer;
use crate::error::TatttyError;

/// Replayer shared by every replaying adapter of one session.
pub type SharedReplayer = Arc<Mutex<CassetteReplayer>>;

/// Retrieve the next recorded output for a given port and method.
pub(crate) fn next_output(
    replayer: &SharedReplayer,
    port: &str,
    method: &str,
) -> Result<Value, TatttyError> {
    let mut guard = replayer.lock().unwrap_or_else(PoisonError::into_inner);
    guard.next_interaction(port, method).map(|i| i.output.clone())
}

/// Turn a replayed output back into the `Result` it was recorded from.
pub(crate) fn replay_result<T: serde::de::DeserializeOwned>(
    output: Result<Value, TatttyError>,
) -> Result<T, TatttyError> {
    let output = output?;
    if let Some(err) = output.get("Err").or_else(|| output.get("err")) {
        return Err(replayed_error(err));
    }
    let ok = output.get("Ok").or_else(|| output.get("ok")).cloned().unwrap_or(output);
    serde_json::from_value(ok).map_err(TatttyError::from)
}

fn replayed_error(err: &Value) -> TatttyError {
    if let Some(text) = err.as_str() {
        return TatttyError::Replayed(text.to_string());
    }
    let message =
        err.get("message").and_then(Value::as_str).unwrap_or("replayed error").to_string();
    match err.get("status").and_then(Value::as_u64).and_then(|s| u16::try_from(s).ok()) {
        Some(status) => TatttyError::Api { status, message },
        None => TatttyError::Replayed(message),
    }
}
