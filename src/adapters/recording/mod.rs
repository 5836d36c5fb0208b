//! Recording adapters that capture interactions to cassettes.

pub mod chat_completer;
pub mod image_generator;
pub mod search_index;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::{json, Value};

use crate::cassette::recorder::CassetteRecorder;
use crate::error::TatttyError;

/// Recorder shared by every recording adapter of one session.
pub type SharedRecorder = Arc<Mutex<CassetteRecorder>>;

/// Record a `Result` using the `{"Ok": ..}` / `{"Err": ..}` convention.
/// HTTP errors keep their status so replayed failures classify the same way.
pub(crate) fn record_result<T, I>(
    recorder: &SharedRecorder,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, TatttyError>,
) where
    T: Serialize,
    I: Serialize,
{
    let input_json = to_value_or_null(input, port, method);
    let output_json = match result {
        Ok(v) => json!({ "Ok": to_value_or_null(v, port, method) }),
        Err(e) => json!({ "Err": error_json(e) }),
    };

    let mut guard = recorder.lock().unwrap_or_else(PoisonError::into_inner);
    guard.record(port, method, input_json, output_json);
}

fn to_value_or_null<T: Serialize>(value: &T, port: &str, method: &str) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(port, method, error = %e, "could not serialize interaction for cassette");
        Value::Null
    })
}

fn error_json(err: &TatttyError) -> Value {
    match err {
        TatttyError::Api { status, message } => json!({ "status": status, "message": message }),
        TatttyError::Network(e) => match e.status() {
            Some(status) => json!({ "status": status.as_u16(), "message": e.to_string() }),
            None => json!({ "message": e.to_string() }),
        },
        other => json!({ "message": other.to_string() }),
    }
}
