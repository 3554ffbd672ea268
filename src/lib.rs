//! Video Summarizer - turn a YouTube video into an AI-derived artifact
//!
//! This library resolves a video reference into its caption transcript, picks a prompt
//! for the requested artifact, runs it through an OpenAI-compatible language model and
//! normalizes the model output (timestamped outlines in particular).

use std::time::Duration;

pub mod cli;
pub mod config;
pub mod engine;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod timestamps;
pub mod utils;
pub mod video;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::{Config, CredentialStore, FileCredentialStore};
pub use engine::{Credential, RetryPolicy, SummarizationEngine};
pub use pipeline::{Artifact, ArtifactKind, ArtifactReport, ArtifactRequest, Pipeline, RequestContext};
pub use prompt::{PromptId, PromptTemplate};
pub use timestamps::{Outline, TimestampEntry};
pub use video::{resolve_id, Transcript, VideoReference, VideoResolver};

/// Result type used by the application plumbing (config, CLI, output)
pub type Result<T> = anyhow::Result<T>;

/// Result type used by the video-to-artifact pipeline
pub type PipelineResult<T> = std::result::Result<T, SummarizerError>;

/// Why a video could not be looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoIssue {
    Private,
    Removed,
    RegionLocked,
    AgeRestricted,
    Other(String),
}

impl std::fmt::Display for VideoIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoIssue::Private => write!(f, "the video is private"),
            VideoIssue::Removed => write!(f, "the video has been removed or does not exist"),
            VideoIssue::RegionLocked => write!(f, "the video is not available in this region"),
            VideoIssue::AgeRestricted => write!(f, "the video is age-restricted"),
            VideoIssue::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Why a transcript could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptIssue {
    /// The video has no caption tracks at all
    CaptionsDisabled,

    /// Captions exist, but none in the requested languages
    NoTrackForLanguage {
        requested: Vec<String>,
        available: Vec<String>,
    },

    /// A caption track was found but it holds no text
    Empty,
}

impl std::fmt::Display for TranscriptIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptIssue::CaptionsDisabled => write!(f, "captions are disabled for this video"),
            TranscriptIssue::NoTrackForLanguage { requested, available } => write!(
                f,
                "no captions in [{}] (available: [{}])",
                requested.join(", "),
                available.join(", ")
            ),
            TranscriptIssue::Empty => write!(f, "the transcript is empty"),
        }
    }
}

/// Error types produced by the video-to-artifact pipeline
#[derive(thiserror::Error, Debug)]
pub enum SummarizerError {
    #[error("Invalid video reference: {0}")]
    InvalidReference(String),

    #[error("Video {video_id} is unavailable: {issue}")]
    VideoUnavailable { video_id: String, issue: VideoIssue },

    #[error("Transcript unavailable: {issue}")]
    TranscriptUnavailable { video_id: String, issue: TranscriptIssue },

    #[error("No API key configured")]
    MissingCredential,

    #[error("API key rejected by the language model service: {0}")]
    AuthError(String),

    #[error("Rate limited by the language model service after {attempts} attempt(s)")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Model output contained no timestamp entries")]
    MalformedCompletion(String),

    #[error("Failed to run {tool}: {source}")]
    ExternalTool {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl SummarizerError {
    /// Only rate limiting is retried automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, SummarizerError::RateLimited { .. })
    }

    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SummarizerError::InvalidReference(_) => {
                "That does not look like a YouTube video link.".to_string()
            }
            SummarizerError::VideoUnavailable { issue, .. } => {
                format!("The video could not be loaded: {}.", issue)
            }
            SummarizerError::TranscriptUnavailable { issue, .. } => {
                format!("No transcript is available: {}.", issue)
            }
            SummarizerError::MissingCredential => {
                "Please configure your OpenAI API key first.".to_string()
            }
            SummarizerError::AuthError(_) => {
                "The OpenAI API key was rejected. Check that it is valid.".to_string()
            }
            SummarizerError::RateLimited { .. } => {
                "The language model service is rate limiting requests. Try again later.".to_string()
            }
            SummarizerError::UpstreamUnavailable(reason) => {
                format!("A remote service could not be reached ({}).", reason)
            }
            SummarizerError::MalformedCompletion(_) => {
                "The model returned an outline in an unexpected shape.".to_string()
            }
            SummarizerError::ExternalTool { tool, .. } => {
                format!("{} could not be started. Is it installed?", tool)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_is_retryable() {
        let limited = SummarizerError::RateLimited { attempts: 1, retry_after: None };
        assert!(limited.is_retryable());
        assert!(!SummarizerError::UpstreamUnavailable("timeout".into()).is_retryable());
        assert!(!SummarizerError::AuthError("401".into()).is_retryable());
        assert!(!SummarizerError::MissingCredential.is_retryable());
    }

    #[test]
    fn test_user_messages_are_specific() {
        let private = SummarizerError::VideoUnavailable {
            video_id: "abc".into(),
            issue: VideoIssue::Private,
        };
        let disabled = SummarizerError::TranscriptUnavailable {
            video_id: "abc".into(),
            issue: TranscriptIssue::CaptionsDisabled,
        };
        assert!(private.user_message().contains("private"));
        assert!(disabled.user_message().contains("disabled"));
        assert_ne!(private.user_message(), disabled.user_message());
    }
}
