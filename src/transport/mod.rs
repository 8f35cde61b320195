// src/transport/mod.rs
// Transcription transport seam and error taxonomy.

mod http;

pub use http::HttpTranscriber;

use crate::audio::AudioChunk;
use crate::segment::TranscriptionSegment;
use async_trait::async_trait;
use thiserror::Error;

/// Per-run transcription options serialized to the backend.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: Option<String>,
    pub response_format: String,
    pub timestamp_granularity: Option<String>,
    pub temperature: Option<f32>,
    pub prompt: Option<String>,
    pub hotwords: Option<Vec<String>>,
    pub vad_filter: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            response_format: "verbose_json".to_string(),
            timestamp_granularity: None,
            temperature: None,
            prompt: None,
            hotwords: None,
            vad_filter: false,
        }
    }
}

/// Where and how to reach the backend. A missing base URL is a fatal
/// configuration error, caught before any audio work starts.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    /// Routing hint for transports that tunnel through an intermediary;
    /// the reference HTTP client sends directly.
    pub use_proxy: bool,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed")]
    Authentication,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Error-message signatures of interrupted message channels, the one class
/// of failure worth retrying before giving up on a chunk.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "message channel closed",
    "asynchronous response by returning true",
    "back/forward cache",
];

impl TransportError {
    /// True for transient transport failures that a short backoff can heal.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(message) | TransportError::Backend(message) => {
                let lower = message.to_lowercase();
                TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
            }
            _ => false,
        }
    }
}

/// Sink for streamed partial segment batches while one chunk is in flight.
pub type PartialSink<'a> = &'a (dyn Fn(Vec<TranscriptionSegment>) + Send + Sync);

/// External "transcribe one chunk" collaborator. The transport either
/// invokes `on_partial` with growing chunk-local segment batches as the
/// backend streams, or it never streams and the returned body is handed to
/// the fallback parser.
#[async_trait]
pub trait ChunkTranscriber: Send + Sync {
    async fn transcribe_chunk(
        &self,
        chunk: &AudioChunk,
        options: &TranscribeOptions,
        config: &BackendConfig,
        on_partial: PartialSink<'_>,
    ) -> Result<String, TransportError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_signature_classification() {
        let err = TransportError::Network(
            "The message channel closed before a response was received".to_string(),
        );
        assert!(err.is_transient());

        let err = TransportError::Backend(
            "A listener indicated an asynchronous response by returning true".to_string(),
        );
        assert!(err.is_transient());

        assert!(!TransportError::Timeout.is_transient());
        assert!(!TransportError::Authentication.is_transient());
        assert!(!TransportError::Network("connection refused".to_string()).is_transient());
    }
}
