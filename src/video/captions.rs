use serde::Deserialize;
use std::time::Duration;

use super::Segment;
use crate::TranscriptIssue;

/// A downloadable caption track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    /// Language code as reported by the host (e.g. `en`, `en-US`, `en-orig`)
    pub language: String,

    /// Human readable track name
    pub name: Option<String>,

    /// URL of the track in json3 format
    pub url: String,

    /// Auto-generated (speech recognition) rather than uploaded captions
    pub automatic: bool,
}

impl CaptionTrack {
    fn matches_language(&self, wanted: &str) -> bool {
        let code = self.language.to_ascii_lowercase();
        let wanted = wanted.to_ascii_lowercase();
        code == wanted || code.starts_with(&format!("{}-", wanted))
    }
}

/// Pick the caption track to transcribe.
///
/// Uploaded captions win over automatic ones; within each kind the earliest
/// language in `languages` wins. An empty `languages` list takes the first track.
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Result<&'a CaptionTrack, TranscriptIssue> {
    if tracks.is_empty() {
        return Err(TranscriptIssue::CaptionsDisabled);
    }

    let manual = tracks.iter().filter(|t| !t.automatic);
    let automatic = tracks.iter().filter(|t| t.automatic);

    if languages.is_empty() {
        return manual
            .chain(automatic)
            .next()
            .ok_or(TranscriptIssue::CaptionsDisabled);
    }

    for automatic_pass in [false, true] {
        for wanted in languages {
            // Prefer an exact code, then a regional or "-orig" variant
            let candidates = tracks.iter().filter(|t| t.automatic == automatic_pass);
            let exact = candidates
                .clone()
                .find(|t| t.language.eq_ignore_ascii_case(wanted));
            if let Some(track) = exact.or_else(|| candidates.clone().find(|t| t.matches_language(wanted))) {
                return Ok(track);
            }
        }
    }

    let mut available: Vec<String> = tracks.iter().map(|t| t.language.clone()).collect();
    available.sort();
    available.dedup();

    Err(TranscriptIssue::NoTrackForLanguage {
        requested: languages.to_vec(),
        available,
    })
}

#[derive(Debug, Deserialize)]
struct Json3Captions {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,

    #[serde(rename = "dDurationMs", default)]
    duration_ms: u64,

    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Decode a json3 caption document into segments.
///
/// Events without text (window setup, line breaks) are skipped.
pub fn parse_json3(body: &str) -> serde_json::Result<Vec<Segment>> {
    let captions: Json3Captions = serde_json::from_str(body)?;

    let segments = captions
        .events
        .into_iter()
        .filter_map(|event| {
            let raw: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

            (!text.is_empty()).then(|| Segment {
                text,
                start: Duration::from_millis(event.start_ms),
                duration: Duration::from_millis(event.duration_ms),
            })
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(language: &str, automatic: bool) -> CaptionTrack {
        CaptionTrack {
            language: language.to_string(),
            name: None,
            url: format!("https://captions.example/{}", language),
            automatic,
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_no_tracks_means_captions_disabled() {
        assert_eq!(select_track(&[], &langs(&["en"])), Err(TranscriptIssue::CaptionsDisabled));
    }

    #[test]
    fn test_manual_track_preferred_over_automatic() {
        let tracks = vec![track("en", true), track("en", false)];
        let selected = select_track(&tracks, &langs(&["en"])).unwrap();
        assert!(!selected.automatic);
    }

    #[test]
    fn test_language_preference_order() {
        let tracks = vec![track("fr", false), track("de", false)];
        let selected = select_track(&tracks, &langs(&["de", "fr"])).unwrap();
        assert_eq!(selected.language, "de");
    }

    #[test]
    fn test_regional_variant_matches() {
        let tracks = vec![track("en-GB", false), track("en-orig", true)];
        assert_eq!(select_track(&tracks, &langs(&["en"])).unwrap().language, "en-GB");

        let auto_only = vec![track("en-orig", true)];
        assert_eq!(select_track(&auto_only, &langs(&["en"])).unwrap().language, "en-orig");
    }

    #[test]
    fn test_missing_language_lists_available() {
        let tracks = vec![track("ja", false), track("ko", true)];
        let err = select_track(&tracks, &langs(&["en"])).unwrap_err();
        assert_eq!(
            err,
            TranscriptIssue::NoTrackForLanguage {
                requested: langs(&["en"]),
                available: langs(&["ja", "ko"]),
            }
        );
    }

    #[test]
    fn test_parse_json3() {
        let body = r#"{
            "wireMagic": "pb3",
            "events": [
                {"tStartMs": 0, "dDurationMs": 5000, "id": 1, "wpWinPosId": 1},
                {"tStartMs": 120, "dDurationMs": 2000, "segs": [{"utf8": "hello "}, {"utf8": "world", "tOffsetMs": 400}]},
                {"tStartMs": 2100, "dDurationMs": 10, "aAppend": 1, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 2200, "dDurationMs": 1800, "segs": [{"utf8": "second\nline"}]}
            ]
        }"#;

        let segments = parse_json3(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world");
        assert_eq!(segments[0].start, Duration::from_millis(120));
        assert_eq!(segments[1].text, "second line");
        assert_eq!(segments[1].duration, Duration::from_millis(1800));
    }

    #[test]
    fn test_parse_json3_rejects_garbage() {
        assert!(parse_json3("<html>").is_err());
    }
}
