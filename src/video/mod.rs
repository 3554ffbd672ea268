use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub mod captions;
pub mod youtube;

use crate::utils::format_offset;
use crate::{PipelineResult, SummarizerError, TranscriptIssue};

pub use captions::{select_track, CaptionTrack};

/// Length of a YouTube video identifier
const VIDEO_ID_LEN: usize = 11;

/// A user-supplied video reference, created once per submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoReference {
    /// URL (or bare id) exactly as the user entered it
    pub url: String,

    /// Canonical video id, `None` when the URL could not be parsed
    pub id: Option<String>,

    /// Display title, filled in once the video has been looked up
    pub title: Option<String>,
}

impl VideoReference {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            id: resolve_id(url),
            title: None,
        }
    }

    /// Video id, or `InvalidReference` when the URL was not recognized
    pub fn require_id(&self) -> PipelineResult<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| SummarizerError::InvalidReference(self.url.clone()))
    }

    /// Canonical watch URL, used for deep links into the video
    pub fn watch_url(&self) -> Option<String> {
        self.id.as_deref().map(watch_url)
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.id
            .as_deref()
            .map(|id| format!("https://img.youtube.com/vi/{}/0.jpg", id))
    }
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={}", video_id)
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the video id from any accepted URL shape.
///
/// Accepts watch links, `youtu.be` short links, embed/shorts/live links and bare ids.
/// Returns `None` for anything else; never panics.
pub fn resolve_id(url: &str) -> Option<String> {
    let input = url.trim();

    if is_video_id(input) {
        return Some(input.to_string());
    }

    // Allow scheme-less input such as "youtu.be/abc" or "www.youtube.com/watch?v=abc"
    let parsed = Url::parse(input)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .or_else(|| Url::parse(&format!("https://{}", input)).ok())?;

    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .or_else(|| host.strip_prefix("music."))
        .unwrap_or(&host);

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" => match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed" | "shorts" | "live" | "v" | "e") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }?;

    is_video_id(&candidate).then_some(candidate)
}

/// One caption segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: Duration,
    pub duration: Duration,
}

/// An ordered caption transcript
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    /// Build a transcript, ordering segments by start offset
    pub fn new(mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| s.start);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last segment
    pub fn total_duration(&self) -> Duration {
        self.segments
            .iter()
            .map(|s| s.start + s.duration)
            .max()
            .unwrap_or_default()
    }

    /// Segment texts joined with spaces, timing stripped
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One `[offset] text` line per segment.
    ///
    /// Offsets use `H:MM:SS` when the video runs past one hour and `MM:SS` otherwise.
    pub fn timestamped_text(&self) -> String {
        let with_hours = self.total_duration() >= Duration::from_secs(3600);

        self.segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| {
                let offset = format_offset(s.start, with_hours);
                let offset = if with_hours { offset } else { format!("{:0>5}", offset) };
                format!("[{}] {}", offset, s.text.trim())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What the video host tells us about a video before captions are fetched
#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub id: String,
    pub title: Option<String>,
    pub duration: Option<Duration>,
    pub tracks: Vec<CaptionTrack>,
}

/// Access to a video-hosting service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Look up title, duration and caption tracks for a video id
    async fn metadata(&self, video_id: &str) -> PipelineResult<VideoMetadata>;

    /// Download and decode one caption track
    async fn fetch_captions(&self, track: &CaptionTrack) -> PipelineResult<Vec<Segment>>;
}

/// Resolves video references into titles and transcripts
pub struct VideoResolver {
    source: Box<dyn VideoSource>,
    languages: Vec<String>,
}

impl VideoResolver {
    pub fn new(source: Box<dyn VideoSource>, languages: Vec<String>) -> Self {
        Self { source, languages }
    }

    /// See [`resolve_id`]
    pub fn resolve_id(&self, url: &str) -> Option<String> {
        resolve_id(url)
    }

    /// Fetch the display title of a video
    pub async fn fetch_title(&self, url: &str) -> PipelineResult<String> {
        let reference = VideoReference::new(url);
        let video_id = reference.require_id()?;
        let metadata = self.source.metadata(video_id).await?;

        Ok(metadata.title.unwrap_or_else(|| video_id.to_string()))
    }

    /// Transcript as plain text, for summarization
    pub async fn fetch_transcript(&self, url: &str) -> PipelineResult<String> {
        let (_, transcript) = self.load(url).await?;
        Ok(transcript.plain_text())
    }

    /// Transcript with one `[offset] text` line per segment, for outlines
    pub async fn fetch_transcript_with_time(&self, url: &str) -> PipelineResult<String> {
        let (_, transcript) = self.load(url).await?;
        Ok(transcript.timestamped_text())
    }

    /// Resolve a URL and fetch its title and transcript with a single metadata lookup
    pub async fn load(&self, url: &str) -> PipelineResult<(VideoReference, Transcript)> {
        let mut reference = VideoReference::new(url);
        let video_id = reference.require_id()?.to_string();

        tracing::info!("Looking up video {}", video_id);
        let metadata = self.source.metadata(&video_id).await?;

        let track = select_track(&metadata.tracks, &self.languages).map_err(|issue| {
            SummarizerError::TranscriptUnavailable {
                video_id: video_id.clone(),
                issue,
            }
        })?;
        tracing::debug!(
            "Using {} caption track '{}'",
            if track.automatic { "automatic" } else { "manual" },
            track.language
        );

        let segments = self.source.fetch_captions(track).await?;
        let transcript = Transcript::new(segments);
        tracing::info!(
            "Fetched {} caption segments ({})",
            transcript.segments().len(),
            crate::utils::format_duration(transcript.total_duration())
        );

        reference.title = metadata.title;
        Ok((reference, transcript))
    }
}

/// Reject transcripts with no text before they reach a model
pub fn require_text(video_id: &str, text: &str) -> PipelineResult<()> {
    if text.trim().is_empty() {
        return Err(SummarizerError::TranscriptUnavailable {
            video_id: video_id.to_string(),
            issue: TranscriptIssue::Empty,
        });
    }
    Ok(())
}
