use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::pipeline::ArtifactKind;

#[derive(Parser)]
#[command(
    name = "vidsum",
    about = "Video Summarizer - AI summaries, linked timestamps and transcripts for YouTube videos",
    version,
    long_about = "Turns a YouTube link into an AI-written summary, a timestamped outline with links back into the video, or the raw caption transcript. Uses yt-dlp for video lookup and an OpenAI-compatible API for the AI artifacts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an AI summary of a video
    Summary(GenerateArgs),

    /// Generate timestamps linking into the video
    Outline(GenerateArgs),

    /// Fetch the raw caption transcript
    Transcript {
        #[command(flatten)]
        args: GenerateArgs,

        /// Save to "Transcript - <title>.txt" in the current directory
        #[arg(long, conflicts_with = "output")]
        save: bool,
    },

    /// Show or change configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default config file
        #[arg(long)]
        init: bool,

        /// Store an API key for later runs
        #[arg(long, value_name = "KEY")]
        set_key: Option<String>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// YouTube link (watch, youtu.be, embed or shorts) or video id
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output file path (prints to console if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (defaults to the configured one)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// OpenAI API key (overrides the stored key)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl Commands {
    /// Artifact kind and arguments for generating commands
    pub fn generate(&self) -> Option<(ArtifactKind, &GenerateArgs)> {
        match self {
            Commands::Summary(args) => Some((ArtifactKind::Summary, args)),
            Commands::Outline(args) => Some((ArtifactKind::Outline, args)),
            Commands::Transcript { args, .. } => Some((ArtifactKind::RawTranscript, args)),
            Commands::Config { .. } => None,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Markdown (outline entries link into the video)
    Markdown,
    /// Plain text (outline as `[offset] label` lines)
    Text,
    /// JSON with metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| anyhow::anyhow!("Unknown output format: {}", s))
    }
}
