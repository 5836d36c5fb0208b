//! tattty - tattoo design service.

mod adapters;
mod answers;
mod cassette;
mod cli;
mod config;
mod context;
mod error;
mod fonts;
mod gallery;
mod image_synthesis;
mod model;
mod orchestrator;
mod output;
mod params;
mod ports;
mod prompt_synthesis;
mod request_log;
mod selection;
mod server;
mod settings;
mod upload;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::answers::{AnswerStore, QuestionKey};
use crate::cli::{Cli, Command, FormArgs};
use crate::config::{Config, FallbackKeys};
use crate::context::{RecordingSession, ServiceContext};
use crate::error::TatttyError;
use crate::gallery::{display_text, search_gallery, GalleryPager, LocalSearch, PAGE_SIZE};
use crate::orchestrator::{
    brief_from_selection, GenerationForm, GenerationState, Orchestrator, Pipeline,
};
use crate::output::save_outputs;
use crate::ports::blob_store::UploadFile;
use crate::ports::{BlobStore, SearchIndex};
use crate::prompt_synthesis::synthesize_prompt;
use crate::request_log::{new_request_id, RequestLog};
use crate::selection::{BadgeLabels, SelectionState};
use crate::server::AppState;
use crate::settings::{Settings, SettingsStore};
use crate::upload::{optimistic_previews, upload_all, validate_batch};

/// Badges shown before the `+N` overflow badge.
const VISIBLE_BADGES: usize = 5;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tattty=debug" } else { "tattty=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Stores opened from the config file.
struct Stores {
    settings: SettingsStore,
    log: RequestLog,
    answers: AnswerStore,
}

async fn run(cli: Cli) -> Result<(), TatttyError> {
    let config_path = config::discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path).map_err(TatttyError::Config)?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    let stores = Stores {
        settings: SettingsStore::new(config.paths.settings.clone()),
        log: RequestLog::new(config.paths.logs.clone()),
        answers: AnswerStore::new(config.paths.answers.clone()),
    };

    // Commands that never reach a provider.
    match &cli.command {
        Command::Logs { clear, request } => {
            return logs(&stores.log, *clear, request.as_deref()).await;
        }
        Command::Settings { init } => return show_settings(&stores.settings, *init).await,
        Command::Answer { question, text } => {
            return answer(&stores.answers, *question, text).await;
        }
        _ => {}
    }

    let label = command_label(&cli.command);
    let (ctx, session) = ServiceContext::from_env(&config, label)?;
    let fallback = FallbackKeys::from_config(&config);

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());
            let state = Arc::new(AppState {
                ctx,
                settings: stores.settings,
                log: stores.log,
                fallback,
                demo_mode: config.server.demo_mode,
                shutdown,
            });
            server::serve(state, &bind).await?;
        }
        command => {
            dispatch(command, &ctx, &stores, &fallback, config.server.demo_mode).await?;
            drop(ctx);
        }
    }

    finish_recording(session);
    Ok(())
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Serve { .. } => "serve",
        Command::Generate { .. } => "generate",
        Command::Prompt { .. } => "prompt",
        Command::Upload { .. } => "upload",
        Command::Search { .. } => "search",
        Command::Gallery { .. } => "gallery",
        Command::Logs { .. } => "logs",
        Command::Settings { .. } => "settings",
        Command::Answer { .. } => "answer",
    }
}

fn finish_recording(session: Option<RecordingSession>) {
    if let Some(session) = session {
        match session.finish() {
            Ok(path) => eprintln!("Cassette saved: {}", path.display()),
            Err(e) => eprintln!("Warning: failed to save cassette: {e}"),
        }
    }
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            token.cancel();
        }
    });
}

async fn dispatch(
    command: Command,
    ctx: &ServiceContext,
    stores: &Stores,
    fallback: &FallbackKeys,
    demo_mode: bool,
) -> Result<(), TatttyError> {
    match command {
        Command::Generate { form, output_dir } => {
            generate(ctx, stores, fallback, form, output_dir).await
        }
        Command::Prompt { form } => prompt(ctx, stores, fallback, form).await,
        Command::Upload { files } => upload(ctx, files, demo_mode).await,
        Command::Search { query, local } => search(ctx, &query, local).await,
        Command::Gallery { pages } => gallery(ctx, pages).await,
        Command::Serve { .. }
        | Command::Logs { .. }
        | Command::Settings { .. }
        | Command::Answer { .. } => Ok(()),
    }
}

/// Build the form from flags, falling back to saved answers.
async fn form_from_args(args: FormArgs, answers: &AnswerStore) -> GenerationForm {
    let mut selections = SelectionState::with_defaults();
    for id in &args.selections {
        selections.select(id);
    }
    let q1_answer = match args.q1 {
        Some(text) => text,
        None => answers.get(QuestionKey::Q1).await.unwrap_or_default(),
    };
    let q2_answer = match args.q2 {
        Some(text) => text,
        None => answers.get(QuestionKey::Q2).await.unwrap_or_default(),
    };
    GenerationForm { selections, q1_answer, q2_answer }
}

fn print_badges(form: &GenerationForm) {
    let mut ids = form.selections.selected_ids();
    ids.extend(["q1", "q2"]);
    let answer = |ns: &str| match ns {
        "q1" => Some(form.q1_answer.clone()),
        "q2" => Some(form.q2_answer.clone()),
        _ => None,
    };
    let badges = BadgeLabels::new(&ids, VISIBLE_BADGES, answer);
    let line = badges.visible.join(" | ");
    if badges.overflow_count > 0 {
        eprintln!("Selections: {line} | +{}", badges.overflow_count);
    } else {
        eprintln!("Selections: {line}");
    }
}

async fn generate(
    ctx: &ServiceContext,
    stores: &Stores,
    fallback: &FallbackKeys,
    args: FormArgs,
    output_dir: Option<PathBuf>,
) -> Result<(), TatttyError> {
    let settings = stores.settings.load().await;
    let form = form_from_args(args, &stores.answers).await;
    print_badges(&form);

    let orchestrator = Orchestrator::new();
    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            match &*states.borrow_and_update() {
                GenerationState::SynthesizingPrompt => eprintln!("Synthesizing prompt..."),
                GenerationState::SynthesizingImage => eprintln!("Generating tattoo..."),
                GenerationState::Idle { .. } | GenerationState::Done { .. } => {}
            }
        }
    });

    let pipeline = Pipeline {
        chat: ctx.chat.as_ref(),
        images: ctx.images.as_ref(),
        settings: &settings,
        fallback,
        log: &stores.log,
    };
    let result = orchestrator.generate(&pipeline, form).await;
    drop(orchestrator);
    let _ = progress.await;
    let outcome = result?;

    eprintln!("Request: {}", outcome.request_id);
    eprintln!("Prompt: {}", outcome.prompt);
    for url in &outcome.urls {
        println!("{url}");
    }

    if let Some(dir) = output_dir {
        let client = reqwest::Client::new();
        let format = &settings.tattty.output_format;
        let saved = save_outputs(&client, &outcome.urls, &outcome.prompt, format, &dir).await?;
        for path in saved {
            eprintln!("Saved: {}", path.display());
        }
    }
    Ok(())
}

async fn prompt(
    ctx: &ServiceContext,
    stores: &Stores,
    fallback: &FallbackKeys,
    args: FormArgs,
) -> Result<(), TatttyError> {
    let settings = stores.settings.load().await;
    let mut form = form_from_args(args, &stores.answers).await;
    form.validate()?;
    form.selections.fill_required_defaults();

    let brief = brief_from_selection(&form.selections, &settings, &form.q1_answer, &form.q2_answer);
    let prompt = synthesize_prompt(
        ctx.chat.as_ref(),
        &settings,
        fallback,
        &stores.log,
        &brief,
        &new_request_id(),
    )
    .await?;
    println!("{prompt}");
    Ok(())
}

fn require_blobs(ctx: &ServiceContext) -> Result<&dyn BlobStore, TatttyError> {
    ctx.blobs.as_deref().ok_or_else(|| {
        TatttyError::Config("Blob storage is not configured (set BLOB_READ_WRITE_TOKEN)".into())
    })
}

const SEARCH_UNCONFIGURED: &str =
    "Search index is not configured (set UPSTASH_SEARCH_REST_URL and UPSTASH_SEARCH_REST_TOKEN)";

fn require_search(ctx: &ServiceContext) -> Result<&dyn SearchIndex, TatttyError> {
    ctx.search.as_deref().ok_or_else(|| TatttyError::Config(SEARCH_UNCONFIGURED.into()))
}

async fn upload(
    ctx: &ServiceContext,
    paths: Vec<PathBuf>,
    demo_mode: bool,
) -> Result<(), TatttyError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let data = tokio::fs::read(path).await?;
        let content_type = image::ImageFormat::from_path(path)
            .map_or("application/octet-stream", |f| f.to_mime_type())
            .to_string();
        let name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        files.push(UploadFile { name, content_type, data });
    }

    validate_batch(&files, demo_mode)?;
    let blobs = require_blobs(ctx)?;

    for preview in optimistic_previews(&files) {
        eprintln!("Queued: {} ({})", preview.name, preview.size_label);
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let report = upload_all(blobs, &files, &cancel, |p| {
        eprintln!("Uploaded {}/{}", p.completed, p.total);
    })
    .await;

    for blob in &report.uploaded {
        println!("{}", blob.preferred_url());
    }
    for failure in &report.failed {
        eprintln!("Failed: {}: {}", failure.name, failure.error);
    }
    eprintln!("{}", report.summary());
    if report.cancelled {
        return Err(TatttyError::Cancelled);
    }
    Ok(())
}

async fn search(ctx: &ServiceContext, query: &str, local: bool) -> Result<(), TatttyError> {
    let index = require_search(ctx)?;

    if local {
        let listing = LocalSearch::load(index).await?;
        for doc in listing.filter(query).await.unwrap_or_default() {
            println!("{}\t{}", doc.id, display_text(doc));
        }
    } else {
        for item in search_gallery(index, query).await {
            println!("{}\t{}", item.name, item.url);
        }
    }
    Ok(())
}

async fn gallery(ctx: &ServiceContext, pages: u32) -> Result<(), TatttyError> {
    let blobs = require_blobs(ctx)?;

    let pager = GalleryPager::new(PAGE_SIZE);
    for _ in 0..pages {
        let Some(items) = pager.load_more(blobs).await else {
            break;
        };
        for item in items {
            println!("{}\t{}\t{}", item.name, item.size_label, item.url);
        }
    }
    if pager.has_more() {
        eprintln!("More images available; pass --pages to fetch further.");
    }
    Ok(())
}

async fn logs(log: &RequestLog, clear: bool, request: Option<&str>) -> Result<(), TatttyError> {
    if clear {
        log.clear().await?;
        eprintln!("Log cleared");
        return Ok(());
    }
    let entries = match request {
        Some(id) => log.entries_for(id).await,
        None => log.entries().await,
    };
    for entry in entries {
        println!(
            "{} {:<7} {:<9} [{}] {}",
            entry.timestamp,
            format!("{:?}", entry.kind).to_lowercase(),
            format!("{:?}", entry.source).to_lowercase(),
            entry.request_id,
            entry.message
        );
    }
    Ok(())
}

async fn show_settings(store: &SettingsStore, init: bool) -> Result<(), TatttyError> {
    if init {
        if store.path().exists() {
            eprintln!("Settings already exist: {}", store.path().display());
        } else {
            store.save(&Settings::default()).await?;
            eprintln!("Settings written: {}", store.path().display());
        }
    }
    let settings = store.load().await;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

async fn answer(store: &AnswerStore, question: QuestionKey, text: &str) -> Result<(), TatttyError> {
    if text.trim().is_empty() {
        return Err(TatttyError::Validation(orchestrator::ANSWER_REQUIRED.into()));
    }
    store.save(question, text.trim()).await?;
    eprintln!("Saved answer for {}", question.namespace());
    Ok(())
}
