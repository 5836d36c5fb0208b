//! CLI argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::answers::QuestionKey;

/// Tattoo design service: story-driven prompts and Replicate images.
#[derive(Parser, Debug)]
#[command(name = "tattty", version, about)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        /// Address to bind, overriding the config file.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Synthesize a prompt, then generate the tattoo.
    Generate {
        #[command(flatten)]
        form: FormArgs,

        /// Download the outputs into this directory.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Synthesize the prompt only.
    Prompt {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show or clear the request log.
    Logs {
        /// Empty the log.
        #[arg(long)]
        clear: bool,

        /// Only entries for this request id.
        #[arg(long)]
        request: Option<String>,
    },
    /// Print the effective settings.
    Settings {
        /// Write the defaults to the settings file if it does not exist.
        #[arg(long)]
        init: bool,
    },
    /// Save an answer to one of the two questions.
    Answer {
        /// Which question.
        #[arg(value_enum)]
        question: QuestionKey,

        /// Answer text.
        text: String,
    },
    /// Upload images to the gallery.
    Upload {
        /// Image files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the gallery.
    Search {
        /// Search text.
        query: String,

        /// Filter the catalog listing locally instead of querying the index.
        #[arg(long)]
        local: bool,
    },
    /// List gallery images.
    Gallery {
        /// Pages to fetch.
        #[arg(long, default_value = "1")]
        pages: u32,
    },
}

/// Form inputs shared by `generate` and `prompt`.
#[derive(Args, Debug, Clone, Default)]
pub struct FormArgs {
    /// Catalog selection such as `styles-2` or `colors-0` (repeatable).
    #[arg(short, long = "select")]
    pub selections: Vec<String>,

    /// Answer to the first question; defaults to the saved answer.
    #[arg(long)]
    pub q1: Option<String>,

    /// Answer to the second question; defaults to the saved answer.
    #[arg(long)]
    pub q2: Option<String>,
}
