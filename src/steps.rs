use serde::{Deserialize, Serialize};

pub const STEP_FFMPEG_INIT: &str = "ffmpegInit";
pub const STEP_FILE_VALIDATION: &str = "fileValidation";
pub const STEP_AUDIO_CONVERSION: &str = "audioConversion";
pub const STEP_AUDIO_SPLITTING: &str = "audioSplitting";
pub const STEP_FINALIZING: &str = "finalizing";

const CHUNK_ID_PREFIX: &str = "chunk_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Skipped,
}

impl StepStatus {
    /// Completed, Error and Skipped are terminal within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Error | StepStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Normal,
    Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    pub id: String,
    pub status: StepStatus,
    pub progress: f32,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub kind: StepKind,
}

impl ProcessingStep {
    fn pending(id: &str, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Pending,
            progress: 0.0,
            error: None,
            skip_reason: None,
            kind,
        }
    }
}

/// The fixed pipeline stages plus one step per audio chunk. `chunks` stays
/// empty until splitting has produced the chunk count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSteps {
    pub ffmpeg_init: ProcessingStep,
    pub file_validation: ProcessingStep,
    pub audio_conversion: ProcessingStep,
    pub audio_splitting: ProcessingStep,
    pub finalizing: ProcessingStep,
    pub chunks: Vec<ProcessingStep>,
}

pub fn chunk_step_id(index: usize) -> String {
    format!("{}{}", CHUNK_ID_PREFIX, index)
}

fn parse_chunk_index(step_id: &str) -> Option<usize> {
    step_id.strip_prefix(CHUNK_ID_PREFIX)?.parse().ok()
}

impl ProcessingSteps {
    pub fn new() -> Self {
        Self {
            ffmpeg_init: ProcessingStep::pending(STEP_FFMPEG_INIT, StepKind::Normal),
            file_validation: ProcessingStep::pending(STEP_FILE_VALIDATION, StepKind::Normal),
            audio_conversion: ProcessingStep::pending(STEP_AUDIO_CONVERSION, StepKind::Normal),
            audio_splitting: ProcessingStep::pending(STEP_AUDIO_SPLITTING, StepKind::Normal),
            finalizing: ProcessingStep::pending(STEP_FINALIZING, StepKind::Normal),
            chunks: Vec::new(),
        }
    }

    /// Returns a new tree with one pending chunk step per audio chunk.
    pub fn with_chunks(&self, count: usize) -> Self {
        let mut next = self.clone();
        next.chunks = (0..count)
            .map(|i| ProcessingStep::pending(&chunk_step_id(i), StepKind::Chunk))
            .collect();
        next
    }

    /// Pure status transform: returns a new tree. Unknown step ids and
    /// transitions out of a terminal state are no-ops.
    pub fn apply_status(
        &self,
        step_id: &str,
        status: StepStatus,
        error: Option<String>,
        skip_reason: Option<String>,
    ) -> Self {
        let mut next = self.clone();
        if let Some(step) = next.step_mut(step_id) {
            if step.status.is_terminal() {
                return self.clone();
            }
            step.status = status;
            step.error = error;
            step.skip_reason = skip_reason;
            if status == StepStatus::Completed {
                step.progress = 100.0;
            }
        }
        next
    }

    /// Pure progress transform: returns a new tree. Unknown step ids are
    /// a no-op; progress is clamped to 0..=100.
    pub fn apply_progress(&self, step_id: &str, progress: f32) -> Self {
        let mut next = self.clone();
        if let Some(step) = next.step_mut(step_id) {
            step.progress = progress.clamp(0.0, 100.0);
        }
        next
    }

    fn step_mut(&mut self, step_id: &str) -> Option<&mut ProcessingStep> {
        match step_id {
            STEP_FFMPEG_INIT => Some(&mut self.ffmpeg_init),
            STEP_FILE_VALIDATION => Some(&mut self.file_validation),
            STEP_AUDIO_CONVERSION => Some(&mut self.audio_conversion),
            STEP_AUDIO_SPLITTING => Some(&mut self.audio_splitting),
            STEP_FINALIZING => Some(&mut self.finalizing),
            other => {
                let index = parse_chunk_index(other)?;
                self.chunks.get_mut(index)
            }
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&ProcessingStep> {
        match step_id {
            STEP_FFMPEG_INIT => Some(&self.ffmpeg_init),
            STEP_FILE_VALIDATION => Some(&self.file_validation),
            STEP_AUDIO_CONVERSION => Some(&self.audio_conversion),
            STEP_AUDIO_SPLITTING => Some(&self.audio_splitting),
            STEP_FINALIZING => Some(&self.finalizing),
            other => {
                let index = parse_chunk_index(other)?;
                self.chunks.get(index)
            }
        }
    }
}

impl Default for ProcessingSteps {
    fn default() -> Self {
        Self::new()
    }
}
