//! Service context that bundles all port trait objects.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapters::live::chat::HttpChatCompleter;
use crate::adapters::live::replicate::{PollPolicy, ReplicateGenerator};
use crate::adapters::live::upstash::UpstashSearch;
use crate::adapters::live::vercel_blob::VercelBlobStore;
use crate::adapters::recording::chat_completer::RecordingChatCompleter;
use crate::adapters::recording::image_generator::RecordingImageGenerator;
use crate::adapters::recording::search_index::RecordingSearchIndex;
use crate::adapters::recording::SharedRecorder;
use crate::adapters::replaying::chat_completer::ReplayingChatCompleter;
use crate::adapters::replaying::image_generator::ReplayingImageGenerator;
use crate::adapters::replaying::search_index::ReplayingSearchIndex;
use crate::cassette::config::load_cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::config::Config;
use crate::error::TatttyError;
use crate::ports::{BlobStore, ChatCompleter, ImageGenerator, SearchIndex};

/// Bundles all port trait objects into a single context.
///
/// Provider keys are resolved per request from the settings file, so only
/// the search index and blob store need credentials up front.
pub struct ServiceContext {
    /// Chat-completion port.
    pub chat: Box<dyn ChatCompleter>,
    /// Image generator port.
    pub images: Box<dyn ImageGenerator>,
    /// Search index port; `None` when no index is configured.
    pub search: Option<Box<dyn SearchIndex>>,
    /// Blob store port; `None` when no token is configured or when replaying.
    pub blobs: Option<Box<dyn BlobStore>>,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: SharedRecorder,
}

impl RecordingSession {
    /// Write the cassette. The context that was recording must be dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if adapters are still alive or the file cannot be written.
    pub fn finish(self) -> Result<PathBuf, TatttyError> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| TatttyError::Config("Recording adapter still has references".into()))?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        recorder.finish()
    }
}

impl ServiceContext {
    /// Create a live context.
    #[must_use]
    pub fn live(config: &Config) -> Self {
        let search: Option<Box<dyn SearchIndex>> =
            match (config.search_url(), config.search_token()) {
                (Some(url), Some(token)) => Some(Box::new(UpstashSearch::new(url, token))),
                _ => None,
            };
        let blobs: Option<Box<dyn BlobStore>> = config
            .blob_token()
            .map(|token| Box::new(VercelBlobStore::new(token)) as Box<dyn BlobStore>);

        Self {
            chat: Box::new(HttpChatCompleter::new()),
            images: Box::new(ReplicateGenerator::new(PollPolicy::from_config(&config.replicate))),
            search,
            blobs,
        }
    }

    /// Create a recording context that wraps the live adapters with a recorder.
    #[must_use]
    pub fn recording(config: &Config, label: &str) -> (Self, RecordingSession) {
        let live = Self::live(config);

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = PathBuf::from(".tattty/cassettes")
            .join(&timestamp)
            .join(format!("{label}.cassette.yaml"));
        let recorder: SharedRecorder = Arc::new(Mutex::new(CassetteRecorder::new(
            path,
            format!("{timestamp}-{label}"),
            get_commit_hash(),
        )));

        let ctx = Self {
            chat: Box::new(RecordingChatCompleter::new(live.chat, Arc::clone(&recorder))),
            images: Box::new(RecordingImageGenerator::new(live.images, Arc::clone(&recorder))),
            search: live.search.map(|inner| {
                Box::new(RecordingSearchIndex::new(inner, Arc::clone(&recorder)))
                    as Box<dyn SearchIndex>
            }),
            blobs: live.blobs,
        };
        (ctx, RecordingSession { recorder })
    }

    /// Create a replaying context from a cassette file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be loaded.
    pub fn replaying(path: &Path) -> Result<Self, TatttyError> {
        let replayer = Arc::new(Mutex::new(load_cassette(path)?));
        Ok(Self {
            chat: Box::new(ReplayingChatCompleter::new(Arc::clone(&replayer))),
            images: Box::new(ReplayingImageGenerator::new(Arc::clone(&replayer))),
            search: Some(Box::new(ReplayingSearchIndex::new(replayer))),
            blobs: None,
        })
    }

    /// Pick the mode from `TATTTY_REPLAY` / `TATTTY_REC`, falling back to live.
    ///
    /// # Errors
    ///
    /// Returns an error if a replay cassette cannot be loaded.
    pub fn from_env(
        config: &Config,
        label: &str,
    ) -> Result<(Self, Option<RecordingSession>), TatttyError> {
        if let Ok(cassette_path) = std::env::var("TATTTY_REPLAY") {
            tracing::info!(cassette = %cassette_path, "replaying provider calls");
            return Ok((Self::replaying(Path::new(&cassette_path))?, None));
        }
        let is_recording = std::env::var("TATTTY_REC").is_ok_and(|v| v == "true" || v == "1");
        if is_recording {
            tracing::info!("recording provider calls");
            let (ctx, session) = Self::recording(config, label);
            return Ok((ctx, Some(session)));
        }
        Ok((Self::live(config), None))
    }
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}
