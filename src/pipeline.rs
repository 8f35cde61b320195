use crate::audio::{AudioEngine, AudioEngineError, EngineEvents, MediaInput};
use crate::dispatch::Dispatcher;
use crate::merge::SegmentMerger;
use crate::parser::parse_fallback;
use crate::progress::{chunk_local_progress, chunk_progress, preparation_progress, OverallProgress};
use crate::segment::TranscriptionSegment;
use crate::steps::{
    chunk_step_id, ProcessingSteps, StepStatus, STEP_AUDIO_CONVERSION, STEP_AUDIO_SPLITTING,
    STEP_FFMPEG_INIT, STEP_FILE_VALIDATION, STEP_FINALIZING,
};
use crate::transport::{BackendConfig, ChunkTranscriber, TranscribeOptions};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LogKind {
    Info,
    Warning,
    Error,
}

/// Host-facing callbacks. All methods default to no-ops so observers only
/// implement what they display. Log events carry stable keys plus params
/// rather than formatted prose, so a host can localize them.
pub trait PipelineObserver: Send + Sync {
    fn on_log(&self, _kind: LogKind, _key: &str, _params: Option<serde_json::Value>) {}
    fn on_ffmpeg_log(&self, _line: &str) {}
    fn on_state_update(&self, _state: &RunState) {}
    fn on_progress(&self, _percent: f32) {}
    fn on_segments_update(&self, _segments: &[TranscriptionSegment]) {}
    fn on_steps_update(&self, _steps: &ProcessingSteps) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    pub is_processing: bool,
    pub overall_progress: f32,
    pub last_merged_end_time: f64,
    pub segment_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub segments: Vec<TranscriptionSegment>,
    pub processing_time_secs: f64,
    pub original_file_name: String,
    pub completed_at: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Backend base URL is not configured")]
    MissingBaseUrl,

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    AudioEngine(#[from] AudioEngineError),

    #[error("Audio splitting produced no chunks")]
    NoChunks,
}

/// State owned by one `process_file` invocation. Created fresh per run and
/// dropped with it, so nothing leaks across runs. The generation number is
/// the guard against a stale run's late callbacks: once a newer run bumps
/// the pipeline counter, every publish on the old context becomes a no-op.
struct RunShared {
    run_id: Uuid,
    generation: u64,
    active: Arc<AtomicU64>,
    observer: Arc<dyn PipelineObserver>,
    steps: Mutex<ProcessingSteps>,
    progress: Mutex<OverallProgress>,
    merger: Mutex<SegmentMerger>,
}

impl RunShared {
    fn new(generation: u64, active: Arc<AtomicU64>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generation,
            active,
            observer,
            steps: Mutex::new(ProcessingSteps::new()),
            progress: Mutex::new(OverallProgress::new()),
            merger: Mutex::new(SegmentMerger::new()),
        }
    }

    fn is_current(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.generation
    }

    fn set_status(
        &self,
        step_id: &str,
        status: StepStatus,
        error: Option<String>,
        skip_reason: Option<String>,
    ) {
        if !self.is_current() {
            return;
        }
        if let Ok(mut steps) = self.steps.lock() {
            *steps = steps.apply_status(step_id, status, error, skip_reason);
            self.observer.on_steps_update(&steps);
        }
    }

    fn set_step_progress(&self, step_id: &str, value: f32) {
        if !self.is_current() {
            return;
        }
        if let Ok(mut steps) = self.steps.lock() {
            *steps = steps.apply_progress(step_id, value);
            self.observer.on_steps_update(&steps);
        }
    }

    fn add_chunk_steps(&self, count: usize) {
        if !self.is_current() {
            return;
        }
        if let Ok(mut steps) = self.steps.lock() {
            *steps = steps.with_chunks(count);
            self.observer.on_steps_update(&steps);
        }
    }

    fn publish_progress(&self, raw: f32) {
        if !self.is_current() {
            return;
        }
        if let Ok(mut progress) = self.progress.lock() {
            let value = progress.advance(raw);
            self.observer.on_progress(value);
        }
    }

    /// Force-zero, bypassing the monotonic guard. Only for run start and
    /// fatal aborts.
    fn reset_progress(&self) {
        if !self.is_current() {
            return;
        }
        if let Ok(mut progress) = self.progress.lock() {
            progress.reset();
            self.observer.on_progress(0.0);
        }
    }

    fn publish_state(&self, is_processing: bool) {
        if !self.is_current() {
            return;
        }
        let overall_progress = self
            .progress
            .lock()
            .map(|p| p.value())
            .unwrap_or_default();
        let (last_merged_end_time, segment_count) = self
            .merger
            .lock()
            .map(|m| (m.last_end_time(), m.segments().len()))
            .unwrap_or_default();

        let state = RunState {
            run_id: self.run_id.to_string(),
            is_processing,
            overall_progress,
            last_merged_end_time,
            segment_count,
        };
        self.observer.on_state_update(&state);
    }

    fn log(&self, kind: LogKind, key: &str, params: Option<serde_json::Value>) {
        if !self.is_current() {
            return;
        }
        self.observer.on_log(kind, key, params);
    }

    fn merge_streaming_batch(
        &self,
        batch: &[TranscriptionSegment],
        chunk_offset: f64,
        index: usize,
        count: usize,
        total_duration: f64,
        step_id: &str,
    ) {
        if !self.is_current() {
            return;
        }
        let merged_end = {
            let Ok(mut merger) = self.merger.lock() else {
                return;
            };
            let segments = merger.merge_streaming(batch, chunk_offset);
            self.observer.on_segments_update(segments);
            merger.last_end_time()
        };
        self.set_step_progress(
            step_id,
            chunk_local_progress(index, count, merged_end, total_duration),
        );
        self.publish_progress(chunk_progress(index, count, merged_end, total_duration));
    }

    fn merge_fallback_batch(
        &self,
        batch: &[TranscriptionSegment],
        index: usize,
        count: usize,
        total_duration: f64,
    ) {
        if !self.is_current() {
            return;
        }
        let merged_end = {
            let Ok(mut merger) = self.merger.lock() else {
                return;
            };
            let segments = merger.merge_fallback(batch);
            self.observer.on_segments_update(segments);
            merger.last_end_time()
        };
        self.publish_progress(chunk_progress(index, count, merged_end, total_duration));
    }
}

/// Forwards engine chatter to the observer; during conversion it also maps
/// the engine's 0..=1 progress into the conversion share of the bar.
struct EngineBridge {
    shared: Arc<RunShared>,
    conversion: bool,
}

impl EngineEvents for EngineBridge {
    fn on_line(&self, line: &str) {
        if self.shared.is_current() {
            self.shared.observer.on_ffmpeg_log(line);
        }
    }

    fn on_progress(&self, fraction: f32) {
        if !self.conversion {
            return;
        }
        self.shared
            .set_step_progress(STEP_AUDIO_CONVERSION, fraction * 100.0);
        self.shared
            .publish_progress(preparation_progress(true, true, false, fraction));
    }
}

/// Sequences the stages: validate -> init -> convert -> split ->
/// [per chunk: dispatch -> merge] -> finalize. Chunks run strictly one at
/// a time; the merger's end-time anchor is only correct if chunk i+1 starts
/// merging after chunk i has fully settled.
pub struct Pipeline {
    engine: Arc<dyn AudioEngine>,
    transport: Arc<dyn ChunkTranscriber>,
    observer: Arc<dyn PipelineObserver>,
    run_seq: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        transport: Arc<dyn ChunkTranscriber>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            engine,
            transport,
            observer,
            run_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn process_file(
        &self,
        input: MediaInput,
        options: TranscribeOptions,
        config: BackendConfig,
    ) -> Result<RunOutput, PipelineError> {
        let generation = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::new(RunShared::new(
            generation,
            self.run_seq.clone(),
            self.observer.clone(),
        ));
        let started = Instant::now();

        tracing::info!(
            "Run {} started: {} ({} bytes)",
            shared.run_id,
            input.file_name,
            input.bytes.len()
        );

        shared.reset_progress();
        shared.publish_state(true);
        shared.log(
            LogKind::Info,
            "processing.started",
            Some(json!({ "fileName": input.file_name })),
        );

        match self.run_stages(&shared, &input, &options, &config).await {
            Ok(segments) => {
                shared.publish_progress(100.0);
                shared.publish_state(false);
                shared.log(
                    LogKind::Info,
                    "processing.completed",
                    Some(json!({ "segmentCount": segments.len() })),
                );

                Ok(RunOutput {
                    segments,
                    processing_time_secs: started.elapsed().as_secs_f64(),
                    original_file_name: input.file_name,
                    completed_at: Utc::now().to_rfc3339(),
                })
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", shared.run_id, e);
                shared.log(
                    LogKind::Error,
                    "processing.failed",
                    Some(json!({ "error": e.to_string() })),
                );
                shared.reset_progress();
                shared.publish_state(false);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        shared: &Arc<RunShared>,
        input: &MediaInput,
        options: &TranscribeOptions,
        config: &BackendConfig,
    ) -> Result<Vec<TranscriptionSegment>, PipelineError> {
        // Fatal before any audio work: without a base URL no chunk could be
        // dispatched anyway.
        if config.base_url.is_none() {
            return Err(PipelineError::MissingBaseUrl);
        }

        shared.set_status(STEP_FILE_VALIDATION, StepStatus::InProgress, None, None);
        if input.bytes.is_empty() {
            let message = "file is empty".to_string();
            shared.set_status(
                STEP_FILE_VALIDATION,
                StepStatus::Error,
                Some(message.clone()),
                None,
            );
            return Err(PipelineError::InvalidInput(message));
        }
        shared.set_status(STEP_FILE_VALIDATION, StepStatus::Completed, None, None);
        shared.publish_progress(preparation_progress(true, false, false, 0.0));

        shared.set_status(STEP_FFMPEG_INIT, StepStatus::InProgress, None, None);
        let init_bridge = EngineBridge {
            shared: shared.clone(),
            conversion: false,
        };
        if let Err(e) = self.engine.init(&init_bridge).await {
            shared.set_status(STEP_FFMPEG_INIT, StepStatus::Error, Some(e.to_string()), None);
            return Err(e.into());
        }
        shared.set_status(STEP_FFMPEG_INIT, StepStatus::Completed, None, None);
        shared.publish_progress(preparation_progress(true, true, false, 0.0));

        shared.set_status(STEP_AUDIO_CONVERSION, StepStatus::InProgress, None, None);
        let convert_bridge = EngineBridge {
            shared: shared.clone(),
            conversion: true,
        };
        let audio = match self.engine.convert(input, &convert_bridge).await {
            Ok(audio) => audio,
            Err(e) => {
                shared.set_status(
                    STEP_AUDIO_CONVERSION,
                    StepStatus::Error,
                    Some(e.to_string()),
                    None,
                );
                return Err(e.into());
            }
        };
        shared.set_status(STEP_AUDIO_CONVERSION, StepStatus::Completed, None, None);
        shared.publish_progress(preparation_progress(true, true, false, 1.0));

        shared.set_status(STEP_AUDIO_SPLITTING, StepStatus::InProgress, None, None);
        let chunks = match self.engine.split(&audio).await {
            Ok(chunks) => chunks,
            Err(e) => {
                shared.set_status(
                    STEP_AUDIO_SPLITTING,
                    StepStatus::Error,
                    Some(e.to_string()),
                    None,
                );
                return Err(e.into());
            }
        };
        if chunks.is_empty() {
            shared.set_status(
                STEP_AUDIO_SPLITTING,
                StepStatus::Error,
                Some("splitting produced no chunks".to_string()),
                None,
            );
            return Err(PipelineError::NoChunks);
        }

        let chunk_count = chunks.len();
        let total_duration = audio.duration_secs;
        shared.add_chunk_steps(chunk_count);

        if chunk_count == 1 {
            shared.set_status(
                STEP_AUDIO_SPLITTING,
                StepStatus::Skipped,
                None,
                Some(format!(
                    "audio fits in a single chunk ({:.1}s)",
                    total_duration
                )),
            );
        } else {
            shared.set_status(STEP_AUDIO_SPLITTING, StepStatus::Completed, None, None);
        }
        shared.publish_progress(preparation_progress(true, true, true, 1.0));
        shared.log(
            LogKind::Info,
            "transcription.started",
            Some(json!({ "chunkCount": chunk_count, "totalDuration": total_duration })),
        );

        let dispatcher = Dispatcher::new(self.transport.as_ref());

        for (index, chunk) in chunks.iter().enumerate() {
            let step_id = chunk_step_id(index);
            shared.set_status(&step_id, StepStatus::InProgress, None, None);

            // Anchor for every partial batch of this chunk, read once.
            let chunk_offset = shared
                .merger
                .lock()
                .map(|m| m.last_end_time())
                .unwrap_or_default();
            let streamed = AtomicBool::new(false);

            let partial_shared = shared.clone();
            let partial_step = step_id.clone();
            let on_partial = |batch: Vec<TranscriptionSegment>| {
                streamed.store(true, Ordering::SeqCst);
                partial_shared.merge_streaming_batch(
                    &batch,
                    chunk_offset,
                    index,
                    chunk_count,
                    total_duration,
                    &partial_step,
                );
            };

            match dispatcher
                .dispatch(chunk, options, config, &on_partial)
                .await
            {
                Ok(body) => {
                    if !streamed.load(Ordering::SeqCst) {
                        // Nothing streamed for this chunk; parse the final
                        // response instead.
                        let parsed = parse_fallback(&body, chunk.duration_secs);
                        shared.merge_fallback_batch(&parsed, index, chunk_count, total_duration);
                    }
                    shared.set_step_progress(&step_id, 100.0);
                    shared.set_status(&step_id, StepStatus::Completed, None, None);
                }
                Err(e) => {
                    // Chunk failures are not fatal; a partial transcript
                    // beats no transcript.
                    tracing::error!("Chunk {} failed after retries: {}", index, e);
                    shared.log(
                        LogKind::Error,
                        "chunk.failed",
                        Some(json!({ "chunk": index, "error": e.to_string() })),
                    );
                    shared.set_status(&step_id, StepStatus::Error, Some(e.to_string()), None);
                }
            }

            // Top of this chunk's sub-range, reached even when the chunk
            // failed or came back empty.
            shared.publish_progress(chunk_progress(
                index,
                chunk_count,
                total_duration,
                total_duration,
            ));
            shared.publish_state(true);
        }

        shared.set_status(STEP_FINALIZING, StepStatus::InProgress, None, None);
        let segments = shared
            .merger
            .lock()
            .map(|m| m.segments().to_vec())
            .unwrap_or_default();
        shared.set_status(STEP_FINALIZING, StepStatus::Completed, None, None);

        Ok(segments)
    }
}
