// src/parser.rs
// Fallback transcript parsing for chunks the backend did not stream.

use crate::segment::TranscriptionSegment;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Start/end both within this window of an existing cue means the cue is a
/// re-delivery (typically SSE leakage parsed twice) and is dropped.
const CUE_DEDUP_TOLERANCE_SECS: f64 = 0.1;

/// What a non-streamed backend response turned out to be.
#[derive(Debug)]
pub enum BackendPayload {
    /// JSON object with a `segments` array.
    Segments(Vec<TranscriptionSegment>),
    /// JSON object with only a `text` field, no timing.
    Text(String),
    /// Anything else: treat as cue-formatted text.
    Cues(String),
}

/// Single point of format detection for the backend's dynamic response
/// shapes, so the merge path never probes structure itself.
pub fn detect_payload(raw: &str) -> BackendPayload {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(segments) = value.get("segments").and_then(Value::as_array) {
            let parsed = segments
                .iter()
                .filter_map(|s| serde_json::from_value(s.clone()).ok())
                .collect();
            return BackendPayload::Segments(parsed);
        }
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return BackendPayload::Text(text.to_string());
        }
    }

    BackendPayload::Cues(raw.to_string())
}

/// Parse a non-streamed response into chunk-local segments. `chunk_duration`
/// is the chunk's nominal time window, used to synthesize timing for
/// text-only responses.
pub fn parse_fallback(raw: &str, chunk_duration: f64) -> Vec<TranscriptionSegment> {
    match detect_payload(raw) {
        BackendPayload::Segments(segments) => segments,
        BackendPayload::Text(text) => {
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![TranscriptionSegment {
                    start: 0.0,
                    end: chunk_duration,
                    text,
                    ..Default::default()
                }]
            }
        }
        BackendPayload::Cues(body) => parse_cue_text(&body),
    }
}

fn cue_regex() -> &'static Regex {
    static CUE_RE: OnceLock<Regex> = OnceLock::new();
    CUE_RE.get_or_init(|| {
        Regex::new(r"^([\d:.]+)\s*-->\s*([\d:.]+)").expect("valid cue timestamp regex")
    })
}

/// Parse `HH:MM:SS.mmm --> HH:MM:SS.mmm` cue blocks. A cue's text is every
/// following non-blank line until the next timestamp line, blank line or
/// end of input. Malformed timestamp lines discard the cue being built.
pub fn parse_cue_text(raw: &str) -> Vec<TranscriptionSegment> {
    let mut segments: Vec<TranscriptionSegment> = Vec::new();
    let mut current: Option<(f64, f64, Vec<String>)> = None;

    for line in raw.lines() {
        // SSE leakage: strip an optional event prefix before parsing.
        let line = line.strip_prefix("data: ").unwrap_or(line);
        let trimmed = line.trim();

        if let Some(caps) = cue_regex().captures(trimmed) {
            flush_cue(&mut segments, current.take());

            let start = parse_timestamp(&caps[1]);
            let end = parse_timestamp(&caps[2]);
            current = match (start, end) {
                (Some(start), Some(end)) if end > start => Some((start, end, Vec::new())),
                _ => {
                    tracing::debug!("Discarding cue with invalid timestamps: {}", trimmed);
                    None
                }
            };
        } else if trimmed.is_empty() {
            flush_cue(&mut segments, current.take());
        } else if let Some((_, _, text_lines)) = current.as_mut() {
            text_lines.push(trimmed.to_string());
        }
    }

    flush_cue(&mut segments, current.take());
    segments
}

fn flush_cue(segments: &mut Vec<TranscriptionSegment>, cue: Option<(f64, f64, Vec<String>)>) {
    let Some((start, end, text_lines)) = cue else {
        return;
    };
    if text_lines.is_empty() {
        return;
    }

    let duplicate = segments.iter().any(|existing| {
        (existing.start - start).abs() < CUE_DEDUP_TOLERANCE_SECS
            && (existing.end - end).abs() < CUE_DEDUP_TOLERANCE_SECS
    });
    if duplicate {
        return;
    }

    segments.push(TranscriptionSegment {
        id: segments.len() as u32,
        start,
        end,
        text: text_lines.join("\n"),
        ..Default::default()
    });
}

/// Accepts `HH:MM:SS.mmm`, `MM:SS.mmm` or bare seconds. Rejects components
/// out of range.
fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(':').collect();

    match parts.len() {
        1 => {
            let seconds: f64 = parts[0].parse().ok()?;
            (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
        }
        2 => {
            let minutes: u32 = parts[0].parse().ok()?;
            let seconds: f64 = parts[1].parse().ok()?;
            (minutes < 60 && (0.0..60.0).contains(&seconds))
                .then(|| minutes as f64 * 60.0 + seconds)
        }
        3 => {
            let hours: u32 = parts[0].parse().ok()?;
            let minutes: u32 = parts[1].parse().ok()?;
            let seconds: f64 = parts[2].parse().ok()?;
            (hours < 100 && minutes < 60 && (0.0..60.0).contains(&seconds))
                .then(|| hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
        }
        _ => None,
    }
}
