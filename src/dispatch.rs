use crate::audio::AudioChunk;
use crate::transport::{
    BackendConfig, ChunkTranscriber, PartialSink, TranscribeOptions, TransportError,
};
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u8 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sends one chunk to the transport, retrying transient channel failures
/// before giving up. Non-transient errors propagate immediately.
pub struct Dispatcher<'a> {
    transport: &'a dyn ChunkTranscriber,
    max_retries: u8,
    retry_delay: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: &'a dyn ChunkTranscriber) -> Self {
        Self {
            transport,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }

    pub async fn dispatch(
        &self,
        chunk: &AudioChunk,
        options: &TranscribeOptions,
        config: &BackendConfig,
        on_partial: PartialSink<'_>,
    ) -> Result<String, TransportError> {
        let mut attempt = 0u8;

        loop {
            match self
                .transport
                .transcribe_chunk(chunk, options, config, on_partial)
                .await
            {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt < self.max_retries && e.is_transient() {
                        tracing::warn!(
                            "Chunk {} attempt {}/{} hit transient error: {}, retrying in {}s",
                            chunk.index,
                            attempt + 1,
                            self.max_retries + 1,
                            e,
                            self.retry_delay.as_secs()
                        );
                        sleep(self.retry_delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}
