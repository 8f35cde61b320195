use async_trait::async_trait;
use thiserror::Error;

/// The media blob handed to a run, as the caller received it.
#[derive(Debug, Clone)]
pub struct MediaInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Decoded, resampled PCM for the whole file.
#[derive(Debug, Clone)]
pub struct ConvertedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// A time-bounded slice of the converted audio, dispatched independently.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Audio engine initialization failed: {0}")]
    Init(String),

    #[error("Audio conversion failed: {0}")]
    Convert(String),

    #[error("Audio splitting failed: {0}")]
    Split(String),
}

/// Progress and raw log lines surfaced by the engine while it works.
pub trait EngineEvents: Send + Sync {
    fn on_line(&self, _line: &str) {}
    fn on_progress(&self, _fraction: f32) {}
}

pub struct NoopEngineEvents;

impl EngineEvents for NoopEngineEvents {}

/// External decode/resample/split collaborator. Implementations typically
/// shell out to an audio toolkit; the pipeline only consumes PCM chunks and
/// the total duration.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn init(&self, events: &dyn EngineEvents) -> Result<(), AudioEngineError>;

    async fn convert(
        &self,
        input: &MediaInput,
        events: &dyn EngineEvents,
    ) -> Result<ConvertedAudio, AudioEngineError>;

    async fn split(&self, audio: &ConvertedAudio) -> Result<Vec<AudioChunk>, AudioEngineError>;
}

/// Wrap PCM i16 samples in a minimal RIFF/WAVE container for upload.
pub fn encode_wav_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut wav = Vec::new();

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    let file_size = (36 + samples.len() * 2) as u32;
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * 2;
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&(channels * 2).to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    wav.extend_from_slice(b"data");
    let data_size = (samples.len() * 2) as u32;
    wav.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header() {
        let samples = vec![0i16, 100, -100, 32000];
        let wav = encode_wav_i16(&samples, 16000, 1);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        // 44-byte header plus two bytes per sample.
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let data_size = u32::from_le_bytes(wav[40..44].try_into().unwrap());
        assert_eq!(data_size as usize, samples.len() * 2);
    }
}
