//! Generation orchestration: prompt synthesis, then image synthesis.
//!
//! The [`Orchestrator`] owns the observable state machine
//! `Idle → SynthesizingPrompt → SynthesizingImage → Done`. A failure in
//! either stage records its message and drops back to `Idle`. One
//! orchestrator runs at most one generation at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use crate::config::FallbackKeys;
use crate::error::TatttyError;
use crate::image_synthesis::synthesize_image;
use crate::prompt_synthesis::{synthesize_prompt, TattooBrief};
use crate::ports::{ChatCompleter, ImageGenerator};
use crate::request_log::{new_request_id, RequestLog};
use crate::selection::{index_of, SelectionState};
use crate::settings::Settings;

/// Message shown when a narrative answer is blank.
pub const ANSWER_REQUIRED: &str = "Your soul is required for the ink.";

/// Observable generation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GenerationState {
    /// Nothing running; carries the last failure, if any.
    Idle {
        /// User-facing message of the last failure.
        error: Option<String>,
    },
    /// Waiting on the LLM.
    SynthesizingPrompt,
    /// Waiting on Replicate.
    SynthesizingImage,
    /// Finished successfully.
    Done {
        /// Synthesized prompt.
        prompt: String,
        /// Output URLs.
        urls: Vec<String>,
    },
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    /// Correlation id used in the request log.
    pub request_id: String,
    /// Prompt produced by the LLM stage.
    pub prompt: String,
    /// Displayable image URLs, data URLs included.
    pub urls: Vec<String>,
}

/// Borrowed collaborators for one run.
pub struct Pipeline<'a> {
    /// Prompt stage backend.
    pub chat: &'a dyn ChatCompleter,
    /// Image stage backend.
    pub images: &'a dyn ImageGenerator,
    /// Settings snapshot for this run.
    pub settings: &'a Settings,
    /// Keys taken from the environment.
    pub fallback: &'a FallbackKeys,
    /// Log shared by both stages.
    pub log: &'a RequestLog,
}

impl Pipeline<'_> {
    /// Run both stages. The image stage only starts on a non-empty prompt.
    ///
    /// # Errors
    ///
    /// Returns the first stage's error.
    pub async fn run(
        &self,
        brief: &TattooBrief,
        request_id: &str,
        on_stage: impl Fn(GenerationState),
    ) -> Result<(String, Vec<String>), TatttyError> {
        on_stage(GenerationState::SynthesizingPrompt);
        let prompt =
            synthesize_prompt(self.chat, self.settings, self.fallback, self.log, brief, request_id)
                .await?;

        on_stage(GenerationState::SynthesizingImage);
        let urls = synthesize_image(
            self.images,
            self.settings,
            self.fallback,
            self.log,
            &prompt,
            &brief.aspect_ratio,
            request_id,
        )
        .await?;
        Ok((prompt, urls))
    }
}

/// Form contents at submit time.
#[derive(Debug, Clone, Default)]
pub struct GenerationForm {
    /// Chosen badge ids per namespace.
    pub selections: SelectionState,
    /// Answer to the first question.
    pub q1_answer: String,
    /// Answer to the second question.
    pub q2_answer: String,
}

impl GenerationForm {
    /// Reject blank answers.
    ///
    /// # Errors
    ///
    /// Returns [`TatttyError::Validation`] if either answer is blank.
    pub fn validate(&self) -> Result<(), TatttyError> {
        if self.q1_answer.trim().is_empty() || self.q2_answer.trim().is_empty() {
            return Err(TatttyError::Validation(ANSWER_REQUIRED.into()));
        }
        Ok(())
    }
}

/// Resolve selected catalog ids into the text the prompt needs.
#[must_use]
pub fn brief_from_selection(
    selections: &SelectionState,
    settings: &Settings,
    q1_answer: &str,
    q2_answer: &str,
) -> TattooBrief {
    let lists = &settings.lists;
    let pick = |ns: &str| selections.selected_for(ns).and_then(index_of);

    TattooBrief {
        style: pick("styles")
            .and_then(|i| lists.styles.get(i))
            .map(|s| s.label.clone())
            .unwrap_or_default(),
        placement: pick("placements")
            .and_then(|i| lists.placements.get(i))
            .map(|p| p.label.clone())
            .unwrap_or_default(),
        color: pick("colors").and_then(|i| lists.colors.get(i)).cloned().unwrap_or_default(),
        mood: pick("moods").and_then(|i| lists.moods.get(i)).cloned().unwrap_or_default(),
        aspect_ratio: pick("aspect")
            .and_then(|i| lists.aspect_ratios.get(i))
            .map_or_else(|| settings.tattty.aspect_ratio.clone(), |a| a.value.clone()),
        q1_answer: q1_answer.trim().to_string(),
        q2_answer: q2_answer.trim().to_string(),
        q1_question: settings.tattty.questions.first().map(|q| q.question.clone()),
        q2_question: settings.tattty.questions.get(1).map(|q| q.question.clone()),
    }
}

/// Runs generations for one form and publishes their progress.
pub struct Orchestrator {
    state: watch::Sender<GenerationState>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    /// A fresh orchestrator in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(GenerationState::Idle { error: None });
        Self { state, in_flight: AtomicBool::new(false) }
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    /// Validate, fill default selections, and run the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TatttyError::Busy`] if a run is in progress, a validation
    /// error for blank answers, or the failing stage's error.
    pub async fn generate(
        &self,
        pipeline: &Pipeline<'_>,
        mut form: GenerationForm,
    ) -> Result<GenerationOutcome, TatttyError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TatttyError::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        if let Err(e) = form.validate() {
            self.state.send_replace(GenerationState::Idle { error: Some(e.to_string()) });
            return Err(e);
        }

        let filled = form.selections.fill_required_defaults();
        if !filled.is_empty() {
            tracing::debug!(?filled, "filled missing selections with defaults");
        }

        let brief = brief_from_selection(
            &form.selections,
            pipeline.settings,
            &form.q1_answer,
            &form.q2_answer,
        );
        let request_id = new_request_id();

        match pipeline.run(&brief, &request_id, |s| { self.state.send_replace(s); }).await {
            Ok((prompt, urls)) => {
                self.state.send_replace(GenerationState::Done {
                    prompt: prompt.clone(),
                    urls: urls.clone(),
                });
                Ok(GenerationOutcome { request_id, prompt, urls })
            }
            Err(e) => {
                self.state.send_replace(GenerationState::Idle { error: Some(e.to_string()) });
                Err(e)
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_synthesis::tests::{replicate_settings, FakeImages};
    use crate::ports::image_generator::{OutputItem, RawOutput};
    use crate::prompt_synthesis::tests::FakeChat;

    fn settings() -> Settings {
        let mut settings = replicate_settings();
        settings.providers.openai.api_key = "sk-test".into();
        settings.providers.openai.enabled = true;
        settings
    }

    fn form() -> GenerationForm {
        GenerationForm {
            selections: SelectionState::new(),
            q1_answer: "We played chess under the bridge".into(),
            q2_answer: "A blood moon".into(),
        }
    }

    fn one_image() -> FakeImages {
        FakeImages::returning(RawOutput::Single(OutputItem::Url(
            "https://replicate.delivery/out.webp".into(),
        )))
    }

    #[tokio::test]
    async fn full_run_reaches_done_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("logs.json"));
        let chat = FakeChat::replying("a chess knight under a blood moon");
        let images = one_image();
        let settings = settings();
        let fallback = FallbackKeys::default();
        let pipeline = Pipeline {
            chat: &chat,
            images: &images,
            settings: &settings,
            fallback: &fallback,
            log: &log,
        };

        let orchestrator = Orchestrator::new();
        let outcome = orchestrator.generate(&pipeline, form()).await.unwrap();

        assert_eq!(outcome.prompt, "a chess knight under a blood moon");
        assert_eq!(outcome.urls, vec!["https://replicate.delivery/out.webp"]);
        assert!(matches!(orchestrator.state(), GenerationState::Done { .. }));

        // styles-1 / colors-1 / aspect-1 were injected.
        let sent = chat.last.lock().unwrap().clone().unwrap();
        let user = &sent.messages[1].content;
        assert!(user.contains(&format!("Style: {}.", settings.lists.styles[1].label)));
        assert!(user.contains(&format!("Palette: {}.", settings.lists.colors[1])));
        let prediction = images.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            prediction.input["aspect_ratio"],
            settings.lists.aspect_ratios[1].value.as_str()
        );
    }

    #[tokio::test]
    async fn blank_answer_is_rejected_without_calls() {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("logs.json"));
        let chat = FakeChat::replying("unused");
        let images = one_image();
        let settings = settings();
        let fallback = FallbackKeys::default();
        let pipeline = Pipeline {
            chat: &chat,
            images: &images,
            settings: &settings,
            fallback: &fallback,
            log: &log,
        };

        let mut form = form();
        form.q2_answer = "   ".into();
        let orchestrator = Orchestrator::new();
        let err = orchestrator.generate(&pipeline, form).await.unwrap_err();

        assert_eq!(err.to_string(), ANSWER_REQUIRED);
        assert_eq!(chat.calls(), 0);
        assert_eq!(
            orchestrator.state(),
            GenerationState::Idle { error: Some(ANSWER_REQUIRED.into()) }
        );
    }

    #[tokio::test]
    async fn prompt_failure_skips_image_stage() {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("logs.json"));
        let chat = FakeChat::failing(429, "slow down");
        let images = one_image();
        let settings = settings();
        let fallback = FallbackKeys::default();
        let pipeline = Pipeline {
            chat: &chat,
            images: &images,
            settings: &settings,
            fallback: &fallback,
            log: &log,
        };

        let orchestrator = Orchestrator::new();
        let mut states = orchestrator.subscribe();
        let err = orchestrator.generate(&pipeline, form()).await.unwrap_err();

        assert_eq!(err.to_string(), "🚨 RATE LIMIT EXCEEDED! Try again later.");
        assert_eq!(images.calls(), 0);
        assert!(states.has_changed().unwrap());
        assert_eq!(
            *states.borrow_and_update(),
            GenerationState::Idle { error: Some("🚨 RATE LIMIT EXCEEDED! Try again later.".into()) }
        );
    }

    #[tokio::test]
    async fn second_submit_while_running_is_busy() {
        let orchestrator = Orchestrator::new();
        orchestrator.in_flight.store(true, Ordering::SeqCst);

        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("logs.json"));
        let chat = FakeChat::replying("unused");
        let images = one_image();
        let settings = settings();
        let fallback = FallbackKeys::default();
        let pipeline = Pipeline {
            chat: &chat,
            images: &images,
            settings: &settings,
            fallback: &fallback,
            log: &log,
        };

        let err = orchestrator.generate(&pipeline, form()).await.unwrap_err();
        assert!(matches!(err, TatttyError::Busy));
        assert_eq!(chat.calls(), 0);
    }
}
