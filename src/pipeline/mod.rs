use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{Credential, OpenAiBackend, SummarizationEngine};
use crate::prompt::{self, PromptId};
use crate::timestamps::Outline;
use crate::video::youtube::YtDlpSource;
use crate::video::{require_text, watch_url, VideoReference, VideoResolver};
use crate::{PipelineResult, SummarizerError};

/// The artifacts a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Summary,
    Outline,
    RawTranscript,
}

impl ArtifactKind {
    /// Prompt used for this artifact; the raw transcript needs no model
    pub fn prompt_id(&self) -> Option<PromptId> {
        match self {
            ArtifactKind::Summary => Some(PromptId::Default),
            ArtifactKind::Outline => Some(PromptId::Timestamp),
            ArtifactKind::RawTranscript => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Summary => "summary",
            ArtifactKind::Outline => "timestamps",
            ArtifactKind::RawTranscript => "transcript",
        }
    }
}

/// One user submission
#[derive(Debug, Clone)]
pub struct ArtifactRequest {
    pub kind: ArtifactKind,
    pub reference: VideoReference,
}

impl ArtifactRequest {
    pub fn new(kind: ArtifactKind, url: &str) -> Self {
        Self {
            kind,
            reference: VideoReference::new(url),
        }
    }
}

/// State owned by a single user interaction
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    credential: Option<Credential>,
}

impl RequestContext {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            credential,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

/// The produced artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Summary { text: String },
    Outline(Outline),
    Transcript { text: String },
}

/// An artifact together with what it was made from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub request_id: Uuid,
    pub reference: VideoReference,
    pub artifact: Artifact,
    pub generated_at: DateTime<Utc>,
}

/// Resolve → prompt → complete → format, for one request at a time
pub struct Pipeline {
    resolver: VideoResolver,
    engine: SummarizationEngine,
}

impl Pipeline {
    pub fn new(resolver: VideoResolver, engine: SummarizationEngine) -> Self {
        Self { resolver, engine }
    }

    /// Wire up yt-dlp and the OpenAI-compatible backend from configuration
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let source = YtDlpSource::new(
            config.video.yt_dlp_path.clone(),
            Duration::from_secs(config.video.fetch_timeout_secs),
            Duration::from_secs(config.video.lookup_timeout_secs),
        )?;
        let backend = OpenAiBackend::new(
            config.llm.api_url.clone(),
            config.llm.model.clone(),
            config.llm.temperature,
            Duration::from_secs(config.llm.request_timeout_secs),
        )?;

        Ok(Self::new(
            VideoResolver::new(Box::new(source), config.video.languages.clone()),
            SummarizationEngine::new(Arc::new(backend), config.engine_settings()),
        ))
    }

    /// Produce the requested artifact
    pub async fn run(&self, ctx: &RequestContext, request: &ArtifactRequest) -> PipelineResult<ArtifactReport> {
        let span = tracing::info_span!(
            "artifact",
            request_id = %ctx.request_id,
            kind = request.kind.label()
        );

        self.run_inner(ctx, request).instrument(span).await
    }

    async fn run_inner(&self, ctx: &RequestContext, request: &ArtifactRequest) -> PipelineResult<ArtifactReport> {
        let video_id = request.reference.require_id()?.to_string();

        if request.kind.prompt_id().is_some() && ctx.credential().is_none() {
            return Err(SummarizerError::MissingCredential);
        }

        let (reference, transcript) = self.resolver.load(&request.reference.url).await?;

        let artifact = match request.kind {
            ArtifactKind::RawTranscript => {
                let text = transcript.plain_text();
                require_text(&video_id, &text)?;
                Artifact::Transcript { text }
            }
            ArtifactKind::Summary => {
                let text = transcript.plain_text();
                require_text(&video_id, &text)?;

                let prompt = prompt::build(PromptId::Default, None);
                let summary = self.engine.complete(ctx.credential(), &text, &prompt, None).await?;
                if summary.trim().is_empty() {
                    return Err(SummarizerError::UpstreamUnavailable(
                        "the model returned an empty summary".to_string(),
                    ));
                }

                Artifact::Summary {
                    text: summary.trim().to_string(),
                }
            }
            ArtifactKind::Outline => {
                let text = transcript.timestamped_text();
                require_text(&video_id, &text)?;

                let watch = watch_url(&video_id);
                let prompt = prompt::build(PromptId::Timestamp, Some(&watch));
                let raw = self
                    .engine
                    .complete(ctx.credential(), &text, &prompt, Some(&watch))
                    .await?;

                match Outline::from_completion(&raw, &watch) {
                    Ok(outline) => {
                        tracing::info!("Parsed {} outline entries", outline.entries.len());
                        Artifact::Outline(outline)
                    }
                    Err(SummarizerError::MalformedCompletion(raw)) => {
                        tracing::warn!("No timestamp lines in model output; showing it unformatted");
                        Artifact::Outline(Outline::passthrough(&raw))
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        Ok(ArtifactReport {
            request_id: ctx.request_id,
            reference,
            artifact,
            generated_at: Utc::now(),
        })
    }
}
