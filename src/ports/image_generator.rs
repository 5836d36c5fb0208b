//! Image generator port for Replicate-style prediction APIs.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TatttyError;
use crate::model::ModelRef;

/// A request to run one prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    /// Model to run.
    pub model: ModelRef,
    /// Model input; only parameters that are set are present.
    pub input: Map<String, Value>,
    /// Provider token; never written to cassettes.
    #[serde(skip_serializing)]
    pub api_token: String,
    /// Drain each output file and return its bytes instead of its URL.
    pub inline_output: bool,
}

/// One output descriptor, in whichever shape the provider returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputItem {
    /// A bare URL string.
    Url(String),
    /// A file object exposing a URL.
    File {
        /// File URL.
        url: String,
    },
    /// File bytes drained from a stream.
    Inline {
        /// Raw bytes.
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        /// MIME type from the response, if any.
        mime_type: Option<String>,
    },
}

/// Prediction output before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawOutput {
    /// A single output.
    Single(OutputItem),
    /// A list of outputs.
    Many(Vec<OutputItem>),
    /// The prediction succeeded with no output.
    Empty,
}

/// Boxed future type returned by [`ImageGenerator::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<RawOutput, TatttyError>> + Send + 'a>>;

/// Runs a prediction to completion.
pub trait ImageGenerator: Send + Sync {
    /// Run the prediction and wait for a terminal state.
    fn run(&self, request: &PredictionRequest) -> RunFuture<'_>;
}

/// Serde helper for serializing `Vec<u8>` as base64 strings in cassettes.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as base64 string.
    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        serializer.serialize_str(&encoded)
    }

    /// Deserialize base64 string to bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_not_serialized() {
        let request = PredictionRequest {
            model: ModelRef::parse("owner/name:abc").unwrap(),
            input: Map::new(),
            api_token: "r8_secret".into(),
            inline_output: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("r8_secret"));
        assert!(json.contains("owner"));
    }

    #[test]
    fn inline_bytes_encode_as_base64() {
        let output = RawOutput::Single(OutputItem::Inline {
            data: vec![0x52, 0x49, 0x46, 0x46],
            mime_type: Some("image/webp".into()),
        });
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("UklGRg=="));
        let back: RawOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }
}
