use serde::{Deserialize, Serialize};

/// One timestamped unit of transcribed text from the backend, with the
/// usual Whisper-style metadata. In the merged transcript `id` always
/// equals the segment's position after sorting by `start`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptionSegment {
    #[serde(default)]
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub tokens: Option<Vec<i64>>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub avg_logprob: Option<f64>,
    #[serde(default)]
    pub compression_ratio: Option<f64>,
    #[serde(default)]
    pub no_speech_prob: Option<f64>,
    #[serde(default)]
    pub words: Option<Vec<WordTimestamp>>,
}

/// Per-word timing, present only when the backend was asked for
/// word-level granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptionSegment {
    /// Shift the segment (and its word timings) onto the global timeline.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.start += offset;
        self.end += offset;
        if let Some(words) = self.words.as_mut() {
            for word in words.iter_mut() {
                word.start += offset;
                word.end += offset;
            }
        }
        self
    }
}

/// Sort ascending by start time and renumber ids to match the sort order.
pub fn sort_and_renumber(segments: &mut [TranscriptionSegment]) {
    segments.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (idx, segment) in segments.iter_mut().enumerate() {
        segment.id = idx as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptionSegment {
        TranscriptionSegment {
            id: 99,
            start,
            end,
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_and_renumber() {
        let mut segments = vec![seg(5.0, 8.0, "b"), seg(0.0, 4.0, "a"), seg(9.0, 12.0, "c")];
        sort_and_renumber(&mut segments);

        assert_eq!(segments[0].text, "a");
        assert_eq!(segments[1].text, "b");
        assert_eq!(segments[2].text, "c");
        assert_eq!(segments[0].id, 0);
        assert_eq!(segments[1].id, 1);
        assert_eq!(segments[2].id, 2);
    }

    #[test]
    fn test_with_offset_shifts_words_too() {
        let mut segment = seg(1.0, 2.0, "hello");
        segment.words = Some(vec![WordTimestamp {
            word: "hello".to_string(),
            start: 1.0,
            end: 2.0,
        }]);

        let shifted = segment.with_offset(10.0);
        assert_eq!(shifted.start, 11.0);
        assert_eq!(shifted.end, 12.0);
        let words = shifted.words.unwrap();
        assert_eq!(words[0].start, 11.0);
        assert_eq!(words[0].end, 12.0);
    }

    #[test]
    fn test_deserialize_backend_segment_without_metadata() {
        let raw = r#"{"start": 0.5, "end": 2.0, "text": "hi"}"#;
        let segment: TranscriptionSegment = serde_json::from_str(raw).unwrap();
        assert_eq!(segment.start, 0.5);
        assert_eq!(segment.text, "hi");
        assert!(segment.tokens.is_none());
        assert!(segment.words.is_none());
    }
}
