//! Streaming segment merge and deduplication.
//!
//! The merger owns the whole-run transcript. Each new batch, whether a
//! streamed partial or a fallback parse, arrives in chunk-local time and is
//! anchored onto the global timeline at `last_end_time`, the end of the
//! chronologically last segment already merged. Anchoring to the confirmed
//! tail rather than `chunk_index * nominal_length` keeps chunk boundaries
//! seamless when the backend trims silence differently per chunk.

use crate::segment::{sort_and_renumber, TranscriptionSegment};

/// Streamed partials re-deliver grown batches, so a loose time match plus
/// identical trimmed text marks a repeat.
const STREAM_DEDUP_TOLERANCE_SECS: f64 = 0.5;

/// Fallback batches arrive once; only near-exact time collisions are
/// suppressed, text is not compared.
const FALLBACK_DEDUP_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Default)]
pub struct SegmentMerger {
    merged: Vec<TranscriptionSegment>,
    last_end_time: f64,
}

impl SegmentMerger {
    pub fn new() -> Self {
        Self {
            merged: Vec::new(),
            last_end_time: 0.0,
        }
    }

    /// Always sorted ascending by start, ids renumbered to position.
    pub fn segments(&self) -> &[TranscriptionSegment] {
        &self.merged
    }

    /// Time offset for the next unit of work.
    pub fn last_end_time(&self) -> f64 {
        self.last_end_time
    }

    /// Merge a streamed partial batch. `chunk_offset` is `last_end_time` as
    /// it stood when streaming for this chunk began; it must not be re-read
    /// per call, since every partial batch is chunk-local.
    pub fn merge_streaming(
        &mut self,
        batch: &[TranscriptionSegment],
        chunk_offset: f64,
    ) -> &[TranscriptionSegment] {
        for raw in batch {
            let candidate = raw.clone().with_offset(chunk_offset);
            if candidate.text.trim().is_empty() {
                continue;
            }

            let duplicate = self.merged.iter().any(|existing| {
                (existing.start - candidate.start).abs() < STREAM_DEDUP_TOLERANCE_SECS
                    && (existing.end - candidate.end).abs() < STREAM_DEDUP_TOLERANCE_SECS
                    && existing.text.trim() == candidate.text.trim()
            });
            if !duplicate {
                self.merged.push(candidate);
            }
        }

        self.resettle()
    }

    /// Merge a fallback batch for a chunk that never streamed. The offset is
    /// read once here, matching the streamed path's per-chunk anchor.
    pub fn merge_fallback(&mut self, batch: &[TranscriptionSegment]) -> &[TranscriptionSegment] {
        let chunk_offset = self.last_end_time;

        for raw in batch {
            let candidate = raw.clone().with_offset(chunk_offset);

            let duplicate = self.merged.iter().any(|existing| {
                (existing.start - candidate.start).abs() < FALLBACK_DEDUP_TOLERANCE_SECS
                    && (existing.end - candidate.end).abs() < FALLBACK_DEDUP_TOLERANCE_SECS
            });
            if !duplicate {
                self.merged.push(candidate);
            }
        }

        self.resettle()
    }

    pub fn reset(&mut self) {
        self.merged.clear();
        self.last_end_time = 0.0;
    }

    fn resettle(&mut self) -> &[TranscriptionSegment] {
        sort_and_renumber(&mut self.merged);
        if let Some(tail) = self.merged.last() {
            self.last_end_time = tail.end;
        }
        &self.merged
    }
}
