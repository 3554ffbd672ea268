//! Parsing and rendering of timestamped outlines produced by the model.
//!
//! A line is an entry when it matches [`ENTRY_PATTERN`]; every other line is dropped.
//! Parsing never fails, an outline with no entries is reported by [`Outline::from_completion`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::utils::format_offset;
use crate::{PipelineResult, SummarizerError};

/// Grammar of one outline line.
///
/// Optional list marker, optional bold, `[offset]`, optional bold, optional markdown
/// link target, any run of separators, then a non-empty label that does not itself
/// start with a separator.
pub const ENTRY_PATTERN: &str = r"(?x)
    ^\s*
    (?: (?: [-*+•] | \d+[.)] ) \s+ )?
    (?: \*\* | __ )?
    \[ (?P<offset> \d{1,3} (?: : \d{2} ){1,2} ) \]
    (?: \*\* | __ )?
    (?: \( https?:// [^)\s]* \) )?
    \s*
    (?: [-–—:] \s* )*
    (?P<label> [^-–—:\s] .*? )
    \s*$
";

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ENTRY_PATTERN).expect("entry pattern is a valid regex"));

/// Characters that would be read back as a separator at the start of a label
const SEPARATORS: [char; 4] = ['-', '–', '—', ':'];

/// One outline entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampEntry {
    #[serde(rename = "offset_seconds", with = "offset_secs")]
    pub offset: Duration,
    pub label: String,
}

impl TimestampEntry {
    /// Create an entry, dropping sub-second precision and surrounding whitespace
    pub fn new(offset: Duration, label: impl Into<String>) -> Self {
        Self {
            offset: Duration::from_secs(offset.as_secs()),
            label: label.into().trim().to_string(),
        }
    }

    /// Entries in this shape survive `parse(render_plaintext(..))` unchanged
    pub fn is_well_formed(&self) -> bool {
        self.offset.subsec_nanos() == 0
            && !self.label.is_empty()
            && self.label == self.label.trim()
            && !self.label.contains('\n')
            && !self.label.starts_with(SEPARATORS)
    }
}

mod offset_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(offset: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(offset.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Parse `M:SS`, `MM:SS` or `H:MM:SS`
pub fn parse_offset(text: &str) -> Option<Duration> {
    let parts = text
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let seconds = match parts.as_slice() {
        [m, s] if *s < 60 => m * 60 + s,
        [h, m, s] if *m < 60 && *s < 60 => h * 3600 + m * 60 + s,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}

/// Parse one line, `None` when it is not an entry
pub fn parse_line(line: &str) -> Option<TimestampEntry> {
    let captures = ENTRY_RE.captures(line)?;
    let offset = parse_offset(&captures["offset"])?;

    Some(TimestampEntry::new(offset, &captures["label"]))
}

/// Parse a model completion into entries, in the order they appear
pub fn parse(raw_completion: &str) -> Vec<TimestampEntry> {
    raw_completion.lines().filter_map(parse_line).collect()
}

/// Video URL with a `t=<seconds>s` start parameter
pub fn deep_link(video_url: &str, offset: Duration) -> String {
    let time = format!("{}s", offset.as_secs());

    match Url::parse(video_url) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "t")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut().clear().extend_pairs(kept).append_pair("t", &time);
            url.to_string()
        }
        Err(_) => {
            let joiner = if video_url.contains('?') { '&' } else { '?' };
            format!("{}{}t={}", video_url, joiner, time)
        }
    }
}

fn uses_hours(entries: &[TimestampEntry]) -> bool {
    entries.iter().any(|e| e.offset >= Duration::from_secs(3600))
}

fn escape_markdown_label(label: &str) -> String {
    label.replace('[', "\\[").replace(']', "\\]")
}

/// Markdown list with every label linked to its offset in the video
pub fn render_display(entries: &[TimestampEntry], video_url: &str) -> String {
    let with_hours = uses_hours(entries);

    entries
        .iter()
        .map(|entry| {
            format!(
                "- `{}` [{}]({})",
                format_offset(entry.offset, with_hours),
                escape_markdown_label(&entry.label),
                deep_link(video_url, entry.offset)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One `[offset] label` line per entry, without markup
pub fn render_plaintext(entries: &[TimestampEntry]) -> String {
    let with_hours = uses_hours(entries);

    entries
        .iter()
        .map(|entry| format!("[{}] {}", format_offset(entry.offset, with_hours), entry.label))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A parsed outline with both of its rendered views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub entries: Vec<TimestampEntry>,
    pub display: String,
    pub plaintext: String,
}

impl Outline {
    /// Parse a completion and render it against `video_url`.
    ///
    /// Fails with `MalformedCompletion` (carrying the raw text) when no line is an entry.
    pub fn from_completion(raw_completion: &str, video_url: &str) -> PipelineResult<Self> {
        let entries = parse(raw_completion);
        if entries.is_empty() {
            return Err(SummarizerError::MalformedCompletion(raw_completion.to_string()));
        }

        Ok(Self {
            display: render_display(&entries, video_url),
            plaintext: render_plaintext(&entries),
            entries,
        })
    }

    /// Raw model output shown as-is in both views
    pub fn passthrough(raw_completion: &str) -> Self {
        Self {
            entries: Vec::new(),
            display: raw_completion.trim().to_string(),
            plaintext: raw_completion.trim().to_string(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(secs: u64, label: &str) -> TimestampEntry {
        TimestampEntry::new(Duration::from_secs(secs), label)
    }

    #[test]
    fn test_parse_skips_non_matching_lines() {
        let raw = "[0:05] Intro\n[1:30] Deep dive\nnot a timestamp line\n";
        assert_eq!(parse(raw), vec![entry(5, "Intro"), entry(90, "Deep dive")]);
    }

    #[test]
    fn test_parse_offset_shapes() {
        assert_eq!(parse_offset("0:05"), Some(Duration::from_secs(5)));
        assert_eq!(parse_offset("12:34"), Some(Duration::from_secs(754)));
        assert_eq!(parse_offset("75:00"), Some(Duration::from_secs(4500)));
        assert_eq!(parse_offset("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_offset("1:60"), None);
        assert_eq!(parse_offset("1:60:00"), None);
        assert_eq!(parse_offset("abc"), None);
        assert_eq!(parse_offset("5"), None);
    }

    #[test]
    fn test_parse_tolerates_common_model_decorations() {
        let raw = "\
Here are the timestamps:
- [00:00] Welcome
* **[02:15]** Setting up the project
3. [1:05:09] - Wrap up
[0:42](https://youtube.com/watch?v=X&t=42s) Linked entry
• [10:00]: Questions
[5:00]
[7:61] Bad seconds
";
        assert_eq!(
            parse(raw),
            vec![
                entry(0, "Welcome"),
                entry(135, "Setting up the project"),
                entry(3909, "Wrap up"),
                entry(42, "Linked entry"),
                entry(600, "Questions"),
            ]
        );
    }

    #[test]
    fn test_label_in_parentheses_is_not_a_link() {
        assert_eq!(parse_line("[1:00] (Bonus) outtakes"), Some(entry(60, "(Bonus) outtakes")));
    }

    #[test]
    fn test_render_display_links_offsets() {
        let display = render_display(&[entry(90, "Deep dive")], "https://youtube.com/watch?v=X");
        assert_eq!(display, "- `1:30` [Deep dive](https://youtube.com/watch?v=X&t=90s)");
        assert!(display.contains("v=X"));
    }

    #[test]
    fn test_deep_link_replaces_existing_time() {
        assert_eq!(
            deep_link("https://youtube.com/watch?v=X&t=10s", Duration::from_secs(90)),
            "https://youtube.com/watch?v=X&t=90s"
        );
        assert_eq!(deep_link("https://youtu.be/X", Duration::from_secs(5)), "https://youtu.be/X?t=5s");
    }

    #[test]
    fn test_render_display_escapes_brackets() {
        let display = render_display(&[entry(0, "Arrays [part 1]")], "https://youtube.com/watch?v=X");
        assert!(display.contains("[Arrays \\[part 1\\]]"));
    }

    #[test]
    fn test_render_plaintext() {
        assert_eq!(
            render_plaintext(&[entry(5, "Intro"), entry(90, "Deep dive")]),
            "[0:05] Intro\n[1:30] Deep dive"
        );
        assert_eq!(
            render_plaintext(&[entry(5, "Intro"), entry(3700, "Late")]),
            "[0:00:05] Intro\n[1:01:40] Late"
        );
    }

    #[test]
    fn test_plaintext_round_trip() {
        let samples = vec![
            vec![entry(0, "Start"), entry(59, "Almost a minute"), entry(61, "Past it")],
            vec![entry(5, "Intro"), entry(3599, "Edge"), entry(3600, "Hour"), entry(7322, "Two hours")],
            vec![entry(30, "[Bracketed] label"), entry(30, "Same offset twice"), entry(10, "Out of order")],
            vec![entry(4500, "Long: with colon inside"), entry(120, "Ünïcödé label — dash inside")],
        ];

        for entries in samples {
            assert!(entries.iter().all(TimestampEntry::is_well_formed));
            assert_eq!(parse(&render_plaintext(&entries)), entries);
        }
    }

    #[test]
    fn test_parse_is_idempotent_through_plaintext() {
        let raw = "Intro text\n- **[0:00]** Hello\n[1:00:00] - Hour mark\n[3:00] Back\ngarbage";
        let once = parse(raw);
        assert_eq!(parse(&render_plaintext(&once)), once);
    }

    #[test]
    fn test_repeated_separators_are_consumed() {
        assert_eq!(parse_line("[1:00] -- Intro"), Some(entry(60, "Intro")));
        assert_eq!(parse_line("[2:00] : - Setup"), Some(entry(120, "Setup")));
        assert_eq!(parse_line("[3:00] —— Wrap"), Some(entry(180, "Wrap")));
        assert_eq!(parse_line("[4:00] --"), None);
    }

    #[test]
    fn test_parsed_entries_survive_plaintext() {
        let raw = "\
Chapters:
- [0:00] -- Intro
* **[1:15]** :: Setup
2) [2:30](https://youtube.com/watch?v=X&t=150s) - — Main part
[3:45] - - Trailing dashes --
[4:00] **Bold label**
[5:00] (Bonus) [clip] outtakes
[1:00:00]: Hour mark
[1:00:30] --
plain text line
";
        let once = parse(raw);
        assert_eq!(once.len(), 7);
        assert!(once.iter().all(TimestampEntry::is_well_formed), "{:?}", once);
        assert_eq!(parse(&render_plaintext(&once)), once);
    }

    #[test]
    fn test_outline_without_entries_is_malformed() {
        let err = Outline::from_completion("Sorry, I cannot help with that.", "https://youtube.com/watch?v=X")
            .unwrap_err();
        assert!(matches!(err, SummarizerError::MalformedCompletion(raw) if raw.starts_with("Sorry")));

        let fallback = Outline::passthrough("Sorry, I cannot help with that.\n");
        assert!(fallback.is_passthrough());
        assert_eq!(fallback.plaintext, "Sorry, I cannot help with that.");
    }

    #[test]
    fn test_entry_serializes_seconds() {
        let json = serde_json::to_value(entry(90, "Deep dive")).unwrap();
        assert_eq!(json, serde_json::json!({"offset_seconds": 90, "label": "Deep dive"}));
    }
}
