use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::{Artifact, ArtifactReport};

/// Render an artifact report in the requested format
pub fn render(report: &ArtifactReport, format: OutputFormat) -> Result<String> {
    let content = match format {
        OutputFormat::Markdown => format_as_markdown(report),
        OutputFormat::Text => format_as_text(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    };

    Ok(content)
}

fn format_as_markdown(report: &ArtifactReport) -> String {
    let mut output = String::new();

    if let Some(title) = &report.reference.title {
        output.push_str(&format!("# {}\n\n", title));
    }
    if let Some(thumbnail) = report.reference.thumbnail_url() {
        output.push_str(&format!("![Thumbnail]({})\n\n", thumbnail));
    }

    match &report.artifact {
        Artifact::Summary { text } => {
            output.push_str("## Summary\n\n");
            output.push_str(text);
        }
        Artifact::Outline(outline) => {
            output.push_str("## Timestamps\n\n");
            output.push_str(&outline.display);
        }
        Artifact::Transcript { text } => {
            output.push_str("## Transcript\n\n");
            output.push_str(text);
        }
    }

    output.push('\n');
    output
}

/// Bare artifact text with no markup, for pasting elsewhere
fn format_as_text(report: &ArtifactReport) -> String {
    let body = match &report.artifact {
        Artifact::Summary { text } | Artifact::Transcript { text } => text,
        Artifact::Outline(outline) => &outline.plaintext,
    };

    format!("{}\n", body)
}

/// Save an artifact report to file
pub async fn save_to_file(report: &ArtifactReport, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(report, format)?;

    fs_err::write(path, content)?;
    Ok(())
}

/// Print an artifact report to console
pub fn print_to_console(report: &ArtifactReport, format: OutputFormat) -> Result<()> {
    let content = render(report, format)?;

    print!("{}", content);
    Ok(())
}
