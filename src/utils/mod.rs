use anyhow::Result;
use std::time::Duration;
use url::Url;

/// Validate that a URL is absolute and uses HTTP(S)
pub fn validate_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed)
}

/// Format a video offset as `H:MM:SS` when `with_hours` is set, `M:SS` otherwise.
///
/// Sub-second precision is dropped.
pub fn format_offset(offset: Duration, with_hours: bool) -> String {
    let total_seconds = offset.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if with_hours {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        // Minutes keep counting past the hour when there is no hour field
        format!("{}:{:02}", total_seconds / 60, secs)
    }
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// File name used when saving a raw transcript
pub fn transcript_filename(title: Option<&str>, video_id: &str) -> String {
    let base = title
        .map(sanitize_filename)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| video_id.to_string());

    format!("Transcript - {}.txt", base)
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!("{} - required to look up videos and captions", yt_dlp_path));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
