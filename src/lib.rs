//! Chunked transcription pipeline for long media files.
//!
//! A media file is converted and split by an external audio engine, each
//! chunk is dispatched to a remote speech-to-text backend one at a time,
//! and the partial results are merged back into a single chronologically
//! ordered, deduplicated transcript while observers watch live progress.

pub mod audio;
pub mod dispatch;
pub mod merge;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod segment;
pub mod steps;
pub mod transport;

pub use audio::{AudioChunk, AudioEngine, AudioEngineError, ConvertedAudio, MediaInput};
pub use pipeline::{
    LogKind, NoopObserver, Pipeline, PipelineError, PipelineObserver, RunOutput, RunState,
};
pub use segment::TranscriptionSegment;
pub use steps::{ProcessingStep, ProcessingSteps, StepStatus};
pub use transport::{BackendConfig, ChunkTranscriber, HttpTranscriber, TranscribeOptions};
