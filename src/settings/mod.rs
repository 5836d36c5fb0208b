//! Operator settings persisted as a JSON file.
//!
//! The file is always deep-merged onto [`Settings::default`], so a partially
//! written or older file never yields missing fields. Reads never fail: a
//! missing or malformed file degrades to the defaults.

mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::TatttyError;

pub use defaults::{DEFAULT_GENERATION_MODEL, DEFAULT_SYSTEM_PROMPT};

/// Current settings schema version.
pub const SETTINGS_VERSION: u32 = 1;

/// The whole settings aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version of the file.
    pub version: u32,
    /// Generation pipeline settings.
    pub tattty: TatttySection,
    /// Selectable catalogs.
    pub lists: Lists,
    /// Provider credentials.
    pub providers: Providers,
}

/// Generation pipeline settings: LLM choice, Replicate parameters, questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TatttySection {
    /// System prompt sent with every prompt-synthesis call.
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    /// Replicate model reference, `owner/name` or `owner/name:version`.
    #[serde(rename = "generationModel")]
    pub generation_model: String,

    /// Base model variant (`dev` or `schnell`).
    pub model: String,
    /// Faster, lower-precision inference.
    pub go_fast: bool,
    /// `"1"` or `"0.25"`.
    pub megapixels: String,
    /// Images per run; zero leaves it to the model.
    pub num_outputs: u32,
    /// Default ratio when a request does not pick one.
    pub aspect_ratio: String,
    /// `webp`, `jpg` or `png`.
    pub output_format: String,
    /// Lossy encoder quality, 0 to 100.
    pub output_quality: u32,
    /// Denoising steps.
    pub num_inference_steps: u32,
    /// Classifier-free guidance strength.
    pub guidance_scale: f64,
    pub disable_safety_checker: bool,

    /// Additional LoRA weights, `owner/name` or a URL.
    pub extra_lora: String,
    /// Strength of the model's own LoRA.
    pub lora_scale: f64,
    /// Strength of `extra_lora`.
    pub extra_lora_scale: f64,
    /// How far img2img may drift from `image`.
    pub prompt_strength: f64,
    /// Fixed seed for reproducible output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Only sent when the aspect ratio is `custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Only sent when the aspect ratio is `custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Inpainting mask URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    /// Reference image URL for img2img.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Download outputs and return them as data URLs instead of provider URLs.
    #[serde(rename = "inlineOutput", default)]
    pub inline_output: bool,

    /// `openai` or `ollama`.
    #[serde(rename = "llmProvider", default)]
    pub llm_provider: Option<String>,
    /// Chat model name.
    #[serde(rename = "llmModel", default)]
    pub llm_model: Option<String>,
    /// Overrides the provider's default endpoint.
    #[serde(rename = "llmBaseUrl", default)]
    pub llm_base_url: Option<String>,

    /// Narrative questions, in display order.
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// A narrative question shown on the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// `q1` or `q2`.
    pub id: String,
    /// Question text.
    pub question: String,
    /// Input hint shown while the answer is empty.
    pub placeholder: String,
}

/// Selectable catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lists {
    /// Tattoo styles; index 1 is the default.
    pub styles: Vec<StyleOption>,
    /// Body placements.
    pub placements: Vec<PlacementOption>,
    /// Mood labels.
    pub moods: Vec<String>,
    /// Ratio choices; index 1 is the default.
    #[serde(rename = "aspectRatios")]
    pub aspect_ratios: Vec<AspectRatioOption>,
    /// Palette labels; index 1 is the default.
    pub colors: Vec<String>,
}

/// One tattoo style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOption {
    /// Stable id.
    pub id: String,
    /// Display name, also sent to the LLM.
    pub label: String,
    /// Short explanation for the picker.
    pub description: String,
}

/// One body placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOption {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub label: String,
    /// Illustration path.
    pub image: String,
}

/// One aspect ratio choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatioOption {
    /// Stable id.
    pub id: String,
    /// Display name, e.g. `Portrait`.
    pub label: String,
    /// Ratio sent to the model, e.g. `3:4`.
    pub value: String,
}

/// Provider credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Providers {
    /// Image generation token.
    pub replicate: ProviderKey,
    /// Chat completion key.
    pub openai: ProviderKey,
    /// Stored with the rest of the settings; no adapter reads it.
    pub fal: ProviderKey,
    /// Gallery search index.
    pub upstash: UpstashProvider,
}

/// An API key that can be switched off without deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderKey {
    /// Secret value; may be blank.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Whether the key may be used.
    pub enabled: bool,
}

impl ProviderKey {
    /// The key, if the provider is enabled and the key is non-blank.
    #[must_use]
    pub fn usable_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (self.enabled && !key.is_empty()).then_some(key)
    }
}

/// Upstash Search REST credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstashProvider {
    /// REST endpoint.
    pub url: String,
    /// REST token.
    pub token: String,
    /// Whether the credentials may be used.
    pub enabled: bool,
}

impl Settings {
    /// Merge raw JSON text onto the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, or the merged document does
    /// not fit the schema (e.g. a string where a number belongs).
    pub fn from_json_overrides(raw: &str) -> Result<Self, TatttyError> {
        let overrides: Value = serde_json::from_str(raw)?;
        let mut merged = serde_json::to_value(Self::default())?;
        deep_merge(&mut merged, overrides);
        let mut settings: Self = serde_json::from_value(merged)?;
        settings.version = SETTINGS_VERSION;
        Ok(settings)
    }

    /// System prompt, falling back to the built-in one when blank.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        if self.tattty.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.tattty.system_prompt
        }
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other value in the overlay replaces the base value.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// File-backed settings store.
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Create a store for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Path of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings merged onto the defaults. Never fails.
    pub async fn load(&self) -> Settings {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read settings");
                return Settings::default();
            }
        };
        match Settings::from_json_overrides(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "invalid settings file, using defaults"
                );
                Settings::default()
            }
        }
    }

    /// Persist settings wholesale: write a sibling temp file, then rename it
    /// over the target. Concurrent saves in this process are serialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, settings: &Settings) -> Result<(), TatttyError> {
        let _guard = self.write_lock.lock().await;

        let mut settings = settings.clone();
        settings.version = SETTINGS_VERSION;
        let body = serde_json::to_string_pretty(&settings)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_sibling(&self.path);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
