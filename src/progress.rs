//! Overall progress weighting.
//!
//! Preparation (validation, engine init, conversion, splitting) owns 0-40%
//! of the bar, with 30 points reserved for conversion alone; transcription
//! owns 40-100%, divided evenly between chunks.

const CONVERSION_POINTS: f32 = 30.0;
const PREP_STAGE_POINTS: f32 = 10.0 / 3.0;
const TRANSCRIPTION_FLOOR: f32 = 40.0;
const TRANSCRIPTION_SPAN: f32 = 60.0;

/// Monotonic holder for the overall percentage. While a run is live the
/// published value never decreases; `reset` is the only way back to 0.
#[derive(Debug, Default)]
pub struct OverallProgress {
    value: f32,
}

impl OverallProgress {
    pub fn new() -> Self {
        Self { value: 0.0 }
    }

    /// Fold in a raw computation, keeping the max of old and new.
    pub fn advance(&mut self, raw: f32) -> f32 {
        let clamped = raw.clamp(0.0, 100.0);
        if clamped > self.value {
            self.value = clamped;
        }
        self.value
    }

    /// Force back to 0, bypassing the monotonic guard. Used on explicit
    /// reset and when a new file starts.
    pub fn reset(&mut self) -> f32 {
        self.value = 0.0;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Raw overall percentage for the preparation stages. `conversion_fraction`
/// is the conversion stage's own 0..=1 progress.
pub fn preparation_progress(
    validation_done: bool,
    init_done: bool,
    splitting_done: bool,
    conversion_fraction: f32,
) -> f32 {
    let mut value = 0.0;
    if validation_done {
        value += PREP_STAGE_POINTS;
    }
    if init_done {
        value += PREP_STAGE_POINTS;
    }
    if splitting_done {
        value += PREP_STAGE_POINTS;
    }
    value + CONVERSION_POINTS * conversion_fraction.clamp(0.0, 1.0)
}

/// Raw overall percentage while transcribing chunk `index` of `count`.
///
/// Chunk i owns the sub-range [40 + 60*i/n, 40 + 60*(i+1)/n]; position
/// inside it is how far `merged_end_time` has advanced through the chunk's
/// nominal time window (total_duration / n).
pub fn chunk_progress(
    index: usize,
    count: usize,
    merged_end_time: f64,
    total_duration: f64,
) -> f32 {
    if count == 0 || total_duration <= 0.0 {
        return TRANSCRIPTION_FLOOR;
    }

    let window = total_duration / count as f64;
    let processed = (merged_end_time - index as f64 * window).clamp(0.0, window);
    let fraction = if window > 0.0 { processed / window } else { 0.0 };

    TRANSCRIPTION_FLOOR
        + TRANSCRIPTION_SPAN * ((index as f64 + fraction) / count as f64) as f32
}

/// A chunk's local 0..=100 progress from the same duration ratio, for the
/// per-chunk step display.
pub fn chunk_local_progress(
    index: usize,
    count: usize,
    merged_end_time: f64,
    total_duration: f64,
) -> f32 {
    if count == 0 || total_duration <= 0.0 {
        return 0.0;
    }
    let window = total_duration / count as f64;
    let processed = (merged_end_time - index as f64 * window).clamp(0.0, window);
    if window > 0.0 {
        (100.0 * processed / window) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut progress = OverallProgress::new();
        assert_eq!(progress.advance(10.0), 10.0);
        assert_eq!(progress.advance(35.0), 35.0);
        // A smaller raw value must not move the bar backwards.
        assert_eq!(progress.advance(20.0), 35.0);
        assert_eq!(progress.value(), 35.0);
    }

    #[test]
    fn test_reset_bypasses_guard() {
        let mut progress = OverallProgress::new();
        progress.advance(80.0);
        assert_eq!(progress.reset(), 0.0);
        assert_eq!(progress.advance(5.0), 5.0);
    }

    #[test]
    fn test_advance_clamps_range() {
        let mut progress = OverallProgress::new();
        assert_eq!(progress.advance(250.0), 100.0);
        progress.reset();
        assert_eq!(progress.advance(-10.0), 0.0);
    }

    #[test]
    fn test_preparation_caps_at_forty() {
        let full = preparation_progress(true, true, true, 1.0);
        assert!((full - 40.0).abs() < 0.01, "full prep should be 40, got {}", full);
        let conversion_only = preparation_progress(false, false, false, 0.5);
        assert!((conversion_only - 15.0).abs() < 0.01);
    }

    #[test]
    fn test_chunk_progress_owns_its_subrange() {
        // Chunk 1 of 3: sub-range [60, 80].
        let at_start = chunk_progress(1, 3, 100.0, 300.0);
        assert!((at_start - 60.0).abs() < 0.01, "got {}", at_start);
        let halfway = chunk_progress(1, 3, 150.0, 300.0);
        assert!((halfway - 70.0).abs() < 0.01, "got {}", halfway);
        let done = chunk_progress(1, 3, 200.0, 300.0);
        assert!((done - 80.0).abs() < 0.01, "got {}", done);
        // Runaway end times stay inside the sub-range.
        let overshoot = chunk_progress(1, 3, 500.0, 300.0);
        assert!((overshoot - 80.0).abs() < 0.01, "got {}", overshoot);
    }

    #[test]
    fn test_chunk_local_progress() {
        let local = chunk_local_progress(0, 2, 30.0, 120.0);
        assert!((local - 50.0).abs() < 0.01, "got {}", local);
    }
}
