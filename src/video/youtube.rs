use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::captions::{parse_json3, CaptionTrack};
use super::{watch_url, Segment, VideoMetadata, VideoSource};
use crate::{PipelineResult, SummarizerError, VideoIssue};

/// YouTube metadata and captions via yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
    client: reqwest::Client,
    lookup_timeout: Duration,
}

impl YtDlpSource {
    /// `fetch_timeout` bounds caption downloads, `lookup_timeout` the yt-dlp run
    pub fn new(
        yt_dlp_path: impl Into<String>,
        fetch_timeout: Duration,
        lookup_timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| SummarizerError::UpstreamUnavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            yt_dlp_path: yt_dlp_path.into(),
            client,
            lookup_timeout,
        })
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, video_id: &str) -> PipelineResult<Value> {
        let url = watch_url(video_id);
        tracing::debug!("Extracting video info for: {}", url);

        let mut command = Command::new(&self.yt_dlp_path);
        command
            .args(["--dump-json", "--no-playlist", "--skip-download", &url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.lookup_timeout, command.output())
            .await
            .map_err(|_| {
                SummarizerError::UpstreamUnavailable(format!(
                    "yt-dlp lookup timed out after {}s",
                    self.lookup_timeout.as_secs_f64()
                ))
            })?
            .map_err(|source| SummarizerError::ExternalTool {
                tool: self.yt_dlp_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(video_id, &error));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            SummarizerError::UpstreamUnavailable(format!("yt-dlp returned unreadable metadata: {}", e))
        })
    }
}

/// Map yt-dlp's error output to a specific failure
pub fn classify_failure(video_id: &str, stderr: &str) -> SummarizerError {
    let lower = stderr.to_lowercase();
    let unavailable = |issue| SummarizerError::VideoUnavailable {
        video_id: video_id.to_string(),
        issue,
    };

    if lower.contains("private video") {
        unavailable(VideoIssue::Private)
    } else if lower.contains("available in your country")
        || lower.contains("blocked it in your country")
        || lower.contains("geo restrict")
    {
        unavailable(VideoIssue::RegionLocked)
    } else if lower.contains("confirm your age") || lower.contains("age-restricted") {
        unavailable(VideoIssue::AgeRestricted)
    } else if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("does not exist")
    {
        unavailable(VideoIssue::Removed)
    } else if lower.contains("unable to download")
        || lower.contains("timed out")
        || lower.contains("name resolution")
        || lower.contains("connection")
    {
        SummarizerError::UpstreamUnavailable(last_line(stderr))
    } else {
        unavailable(VideoIssue::Other(last_line(stderr)))
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("unknown yt-dlp error")
        .to_string()
}

/// Collect json3 caption tracks from a yt-dlp `subtitles` / `automatic_captions` map
fn collect_tracks(map: &Value, automatic: bool) -> Vec<CaptionTrack> {
    let Some(languages) = map.as_object() else {
        return Vec::new();
    };

    languages
        .iter()
        // "live_chat" is a pseudo-track holding chat replay, not captions
        .filter(|(language, _)| language.as_str() != "live_chat")
        .filter_map(|(language, formats)| {
            let format = formats
                .as_array()?
                .iter()
                .find(|f| f["ext"].as_str() == Some("json3"))?;

            Some(CaptionTrack {
                language: language.clone(),
                name: format["name"].as_str().map(|s| s.to_string()),
                url: format["url"].as_str()?.to_string(),
                automatic,
            })
        })
        .collect()
}

/// Turn `yt-dlp --dump-json` output into metadata
pub fn metadata_from_info(video_id: &str, info: &Value) -> VideoMetadata {
    let mut tracks = collect_tracks(&info["subtitles"], false);
    tracks.extend(collect_tracks(&info["automatic_captions"], true));

    VideoMetadata {
        id: video_id.to_string(),
        title: info["title"].as_str().map(|s| s.to_string()),
        duration: info["duration"]
            .as_f64()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64),
        tracks,
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    async fn metadata(&self, video_id: &str) -> PipelineResult<VideoMetadata> {
        let info = self.get_video_info(video_id).await?;
        Ok(metadata_from_info(video_id, &info))
    }

    async fn fetch_captions(&self, track: &CaptionTrack) -> PipelineResult<Vec<Segment>> {
        tracing::debug!("Downloading '{}' captions", track.language);

        let response = self
            .client
            .get(&track.url)
            .send()
            .await
            .map_err(|e| SummarizerError::UpstreamUnavailable(format!("caption download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SummarizerError::UpstreamUnavailable(format!(
                "caption download failed: HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SummarizerError::UpstreamUnavailable(format!("caption download failed: {}", e)))?;

        parse_json3(&body)
            .map_err(|e| SummarizerError::UpstreamUnavailable(format!("unreadable caption data: {}", e)))
    }
}
