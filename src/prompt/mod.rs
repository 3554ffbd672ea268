//! Instruction templates sent to the language model.
//!
//! Template text is fixed at compile time so the same `(id, extra_context)` always
//! yields the same prompt.

use serde::{Deserialize, Serialize};

/// Which instruction template to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptId {
    /// Prose summary of a whole transcript
    Default,

    /// One `[offset] description` line per topic change
    Timestamp,

    /// Prose summary of one slice of a longer transcript
    Chunk,

    /// Combine ordered partial summaries into one summary
    Merge,
}

/// A parameterized instruction for the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: PromptId,
    pub body: String,
    pub extra_context: Option<String>,
}

const SUMMARY_PROMPT: &str = "You are an assistant that summarizes YouTube videos from their transcripts.

Write a clear, coherent summary of the video in prose:
- Open with one or two sentences stating what the video is about.
- Follow with the main points in the order they are presented, as short paragraphs or a bulleted list.
- Close with the key takeaway or conclusion.

Do not include timestamps or time references. Do not invent content that is not in the transcript. \
Write in the language of the transcript.";

const TIMESTAMP_PROMPT: &str = "You are an assistant that creates chapter timestamps for YouTube videos.

The transcript below has one caption per line, each prefixed with its time offset in square brackets.

Produce an outline of the video with one entry per line in exactly this shape:
[MM:SS] Short description of the section
Use [H:MM:SS] instead when the offset is one hour or more.

Rules:
- Start a new entry wherever the topic changes; aim for one entry every few minutes.
- Offsets must be copied from the transcript, in ascending order, and the first entry should start at the beginning of the video.
- Keep each description under 12 words.
- Output only the entry lines: no headings, no numbering, no links, no commentary.";

const CHUNK_PROMPT: &str = "You are an assistant that summarizes YouTube videos from their transcripts.

The text below is one consecutive part of a longer transcript. Summarize this part in prose, \
keeping every distinct point, name, and figure it mentions, so the parts can later be combined \
into a summary of the whole video. Do not include timestamps. Do not add an introduction or a \
conclusion for the whole video.";

const MERGE_PROMPT: &str = "You are an assistant that summarizes YouTube videos.

Below are summaries of consecutive parts of one video, in order. Combine them into a single \
clear, coherent summary of the entire video:
- Open with one or two sentences stating what the video is about.
- Cover the main points from every part, beginning to end, in their original order.
- Close with the key takeaway or conclusion.

Do not mention that the input was split into parts. Do not include timestamps.";

/// Build the template for a prompt id.
///
/// `extra_context` is appended to the instructions; for timestamp outlines it is the
/// canonical watch URL of the video.
pub fn build(id: PromptId, extra_context: Option<&str>) -> PromptTemplate {
    let mut body = match id {
        PromptId::Default => SUMMARY_PROMPT,
        PromptId::Timestamp => TIMESTAMP_PROMPT,
        PromptId::Chunk => CHUNK_PROMPT,
        PromptId::Merge => MERGE_PROMPT,
    }
    .to_string();

    if let Some(extra) = extra_context {
        match id {
            PromptId::Timestamp => body.push_str(&format!(
                "\n\nThe video is {}. Links into the video are built from your offsets, so every offset must be exact.",
                extra
            )),
            _ => body.push_str(&format!("\n\nVideo: {}", extra)),
        }
    }

    PromptTemplate {
        id,
        body,
        extra_context: extra_context.map(|s| s.to_string()),
    }
}
