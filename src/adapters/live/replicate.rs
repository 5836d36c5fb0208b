//! Live adapter for the Replicate predictions API.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ReplicateConfig;
use crate::error::TatttyError;
use crate::output::raw_output_from_json;
use crate::ports::image_generator::{
    ImageGenerator, OutputItem, PredictionRequest, RawOutput, RunFuture,
};

const REPLICATE_API_BASE: &str = "https://api.replicate.com";

/// Slack on top of the run deadline for the per-request client timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(5);

/// Limits for waiting on an asynchronous prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between status checks.
    pub interval: Duration,
    /// Maximum number of status checks.
    pub max_polls: u32,
    /// Overall time budget for a run, create call included.
    pub deadline: Duration,
}

impl PollPolicy {
    /// Build the policy from the `[replicate]` config section.
    #[must_use]
    pub fn from_config(config: &ReplicateConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_polls: config.max_polls,
            deadline: config.deadline(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&ReplicateConfig::default())
    }
}

/// Live Replicate generator: create with `Prefer: wait`, then poll.
pub struct ReplicateGenerator {
    client: Client,
    base_url: String,
    policy: PollPolicy,
}

impl ReplicateGenerator {
    /// Create a generator against the public Replicate API.
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_base_url(REPLICATE_API_BASE, policy)
    }

    /// Create a generator against another host.
    ///
    /// Create and status calls share the policy deadline; every request,
    /// output downloads included, is also capped by the client timeout.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, policy: PollPolicy) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(policy.deadline.saturating_add(REQUEST_GRACE))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, base_url, policy }
    }

    /// Await `call` within what is left of the run's deadline.
    async fn within_deadline<T>(
        &self,
        started: Instant,
        attempts: u32,
        call: impl Future<Output = Result<T, TatttyError>>,
    ) -> Result<T, TatttyError> {
        let remaining = self.policy.deadline.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, call).await {
            Ok(result) => result,
            Err(_) => Err(TatttyError::Timeout {
                attempts,
                elapsed_secs: started.elapsed().as_secs(),
            }),
        }
    }

    async fn create(&self, request: &PredictionRequest) -> Result<Prediction, TatttyError> {
        let (url, body) = match &request.model.version {
            Some(version) => (
                format!("{}/v1/predictions", self.base_url),
                json!({ "version": version, "input": request.input }),
            ),
            None => (
                format!(
                    "{}/v1/models/{}/{}/predictions",
                    self.base_url, request.model.owner, request.model.name
                ),
                json!({ "input": request.input }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        read_prediction(response).await
    }

    async fn get(&self, url: &str, token: &str) -> Result<Prediction, TatttyError> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        read_prediction(response).await
    }

    async fn wait_for_terminal(
        &self,
        mut prediction: Prediction,
        token: &str,
        started: Instant,
    ) -> Result<Prediction, TatttyError> {
        let poll_url = prediction
            .urls
            .as_ref()
            .and_then(|u| u.get.clone())
            .unwrap_or_else(|| format!("{}/v1/predictions/{}", self.base_url, prediction.id));

        let mut attempts = 0;
        while !prediction.is_terminal() {
            let remaining = self.policy.deadline.saturating_sub(started.elapsed());
            if attempts >= self.policy.max_polls || remaining.is_zero() {
                return Err(TatttyError::Timeout {
                    attempts,
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.policy.interval.min(remaining)).await;
            prediction = self.within_deadline(started, attempts, self.get(&poll_url, token)).await?;
            attempts += 1;
            tracing::debug!(
                id = %prediction.id,
                status = %prediction.status,
                attempts,
                "polled prediction"
            );
        }
        Ok(prediction)
    }

    async fn drain(&self, item: OutputItem) -> Result<OutputItem, TatttyError> {
        let url = match item {
            OutputItem::Url(url) | OutputItem::File { url } => url,
            inline @ OutputItem::Inline { .. } => return Ok(inline),
        };

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TatttyError::Api {
                status: status.as_u16(),
                message: format!("Failed to download output {url}"),
            });
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(OutputItem::Inline { data, mime_type })
    }
}

impl ImageGenerator for ReplicateGenerator {
    fn run(&self, request: &PredictionRequest) -> RunFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let started = Instant::now();
            let created = self.within_deadline(started, 0, self.create(&request)).await?;
            tracing::debug!(id = %created.id, status = %created.status, "prediction created");
            let prediction = self.wait_for_terminal(created, &request.api_token, started).await?;

            match prediction.status.as_str() {
                "succeeded" => {}
                status => {
                    return Err(TatttyError::PredictionFailed {
                        status: status.to_string(),
                        message: prediction.error_text(),
                    });
                }
            }

            let output = raw_output_from_json(&prediction.output)?;
            if !request.inline_output {
                return Ok(output);
            }
            Ok(match output {
                RawOutput::Single(item) => RawOutput::Single(self.drain(item).await?),
                RawOutput::Many(items) => {
                    let mut drained = Vec::with_capacity(items.len());
                    for item in items {
                        drained.push(self.drain(item).await?);
                    }
                    RawOutput::Many(drained)
                }
                RawOutput::Empty => RawOutput::Empty,
            })
        })
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, TatttyError> {
    let status = response.status();
    let response_text = response.text().await?;
    if !status.is_success() {
        return Err(TatttyError::Api { status: status.as_u16(), message: response_text });
    }
    serde_json::from_str(&response_text).map_err(|e| TatttyError::Api {
        status: status.as_u16(),
        message: format!("Failed to parse prediction: {e}"),
    })
}

// --- Replicate API response types ---

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn error_text(&self) -> String {
        match &self.error {
            Value::Null => "no error details".to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::Map;

    use super::*;
    use crate::model::ModelRef;

    fn fast_policy(max_polls: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(5),
            max_polls,
            deadline: Duration::from_secs(10),
        }
    }

    fn request(model: &str, inline_output: bool) -> PredictionRequest {
        let mut input = Map::new();
        input.insert("prompt".into(), json!("koi, white background"));
        PredictionRequest {
            model: ModelRef::parse(model).unwrap(),
            input,
            api_token: "r8_test".into(),
            inline_output,
        }
    }

    #[tokio::test]
    async fn synchronous_success_with_version() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/predictions")
                .header("prefer", "wait")
                .header("authorization", "Bearer r8_test");
            then.status(201).json_body(json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["https://replicate.delivery/a.webp"]
            }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let output = generator.run(&request("owner/model:abc", false)).await.unwrap();

        assert_eq!(
            output,
            RawOutput::Many(vec![OutputItem::Url("https://replicate.delivery/a.webp".into())])
        );
        create.assert();
    }

    #[tokio::test]
    async fn polls_until_succeeded() {
        let server = MockServer::start();
        let poll_url = server.url("/v1/predictions/p2");
        let create = server.mock(|when, then| {
            when.method(POST).path("/v1/models/owner/model/predictions");
            then.status(201).json_body(json!({
                "id": "p2",
                "status": "starting",
                "urls": { "get": poll_url }
            }));
        });
        let poll = server.mock(|when, then| {
            when.method(GET).path("/v1/predictions/p2");
            then.status(200).json_body(json!({
                "id": "p2",
                "status": "succeeded",
                "output": { "url": "https://replicate.delivery/b.png" }
            }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let output = generator.run(&request("owner/model", false)).await.unwrap();

        assert_eq!(
            output,
            RawOutput::Single(OutputItem::File { url: "https://replicate.delivery/b.png".into() })
        );
        create.assert();
        poll.assert_hits(1);
    }

    #[tokio::test]
    async fn polling_is_bounded() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201).json_body(json!({ "id": "p3", "status": "starting" }));
        });
        let poll = server.mock(|when, then| {
            when.method(GET).path("/v1/predictions/p3");
            then.status(200).json_body(json!({ "id": "p3", "status": "processing" }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let err = generator.run(&request("owner/model:abc", false)).await.unwrap_err();

        assert!(matches!(err, TatttyError::Timeout { attempts: 3, .. }), "got {err:?}");
        poll.assert_hits(3);
    }

    fn short_deadline() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(10),
            max_polls: 1000,
            deadline: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn hung_status_check_respects_deadline() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201).json_body(json!({ "id": "p6", "status": "starting" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/predictions/p6");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "id": "p6", "status": "succeeded", "output": [] }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), short_deadline());
        let started = Instant::now();
        let err = generator.run(&request("owner/model:abc", false)).await.unwrap_err();

        assert!(matches!(err, TatttyError::Timeout { attempts: 0, .. }), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn hung_create_respects_deadline() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "id": "p7", "status": "succeeded", "output": [] }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), short_deadline());
        let started = Instant::now();
        let err = generator.run(&request("owner/model:abc", false)).await.unwrap_err();

        assert!(matches!(err, TatttyError::Timeout { .. }), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn failed_prediction_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201).json_body(json!({
                "id": "p4",
                "status": "failed",
                "error": "CUDA out of memory"
            }));
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let err = generator.run(&request("owner/model:abc", false)).await.unwrap_err();

        match err {
            TatttyError::PredictionFailed { status, message } => {
                assert_eq!(status, "failed");
                assert_eq!(message, "CUDA out of memory");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_keeps_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(429).body(r#"{"detail":"Request was throttled."}"#);
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let err = generator.run(&request("owner/model:abc", false)).await.unwrap_err();

        assert!(matches!(err, TatttyError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn inline_output_drains_files() {
        let server = MockServer::start();
        let file_url = server.url("/files/out.webp");
        server.mock(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201).json_body(json!({
                "id": "p5",
                "status": "succeeded",
                "output": file_url
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/files/out.webp");
            then.status(200).header("content-type", "image/webp").body([1_u8, 2, 3]);
        });

        let generator = ReplicateGenerator::with_base_url(server.base_url(), fast_policy(3));
        let output = generator.run(&request("owner/model:abc", true)).await.unwrap();

        assert_eq!(
            output,
            RawOutput::Single(OutputItem::Inline {
                data: vec![1, 2, 3],
                mime_type: Some("image/webp".into()),
            })
        );
    }
}
