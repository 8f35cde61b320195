// src/transport/http.rs
// Reference HTTP transcription transport (OpenAI-compatible endpoint).

use super::{BackendConfig, ChunkTranscriber, PartialSink, TranscribeOptions, TransportError};
use crate::audio::{encode_wav_i16, AudioChunk};
use crate::segment::TranscriptionSegment;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart;
use serde_json::Value;
use std::time::Duration;

const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";
const TIMEOUT_SECS: u64 = 300;

pub struct HttpTranscriber {
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        tracing::info!("HTTP transcriber initialized");

        Self { client }
    }

    fn build_form(chunk: &AudioChunk, options: &TranscribeOptions) -> Result<multipart::Form, TransportError> {
        if chunk.samples.is_empty() {
            return Err(TransportError::Backend("Empty audio chunk".to_string()));
        }

        let wav_bytes = encode_wav_i16(&chunk.samples, chunk.sample_rate, 1);

        let file_part = multipart::Part::bytes(wav_bytes)
            .file_name(format!("chunk_{}.wav", chunk.index))
            .mime_str("audio/wav")
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let mut form = multipart::Form::new()
            .text("model", options.model.clone())
            .text("response_format", options.response_format.clone())
            .text("vad_filter", options.vad_filter.to_string())
            .part("file", file_part);

        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(temperature) = options.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(hotwords) = &options.hotwords {
            form = form.text("hotwords", hotwords.join(","));
        }
        if let Some(granularity) = &options.timestamp_granularity {
            form = form.text("timestamp_granularities[]", granularity.clone());
        }

        Ok(form)
    }
}

impl Default for HttpTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkTranscriber for HttpTranscriber {
    async fn transcribe_chunk(
        &self,
        chunk: &AudioChunk,
        options: &TranscribeOptions,
        config: &BackendConfig,
        on_partial: PartialSink<'_>,
    ) -> Result<String, TransportError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| TransportError::Backend("Backend base URL is not configured".to_string()))?;
        let url = format!("{}{}", base_url.trim_end_matches('/'), TRANSCRIPTIONS_PATH);

        tracing::info!(
            "Transcribing chunk {} ({:.1}s) via {}",
            chunk.index,
            chunk.duration_secs,
            url
        );

        let form = Self::build_form(chunk, options)?;

        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = &config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await;

        match response {
            Ok(resp) => {
                let status = resp.status();

                if status.is_success() {
                    let streaming = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.contains("text/event-stream"))
                        .unwrap_or(false);

                    if streaming {
                        read_event_stream(resp, on_partial).await
                    } else {
                        resp.text()
                            .await
                            .map_err(|e| TransportError::Network(e.to_string()))
                    }
                } else if status.as_u16() == 401 {
                    Err(TransportError::Authentication)
                } else if status.as_u16() == 429 {
                    Err(TransportError::RateLimit)
                } else {
                    let error_text = resp.text().await.unwrap_or_default();
                    Err(TransportError::Backend(format!(
                        "HTTP {}: {}",
                        status, error_text
                    )))
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Network(e.to_string()))
                }
            }
        }
    }

    fn name(&self) -> &str {
        "HTTP backend"
    }
}

/// Consume an SSE body line by line, forwarding each event that carries a
/// `segments` array. The raw body is still accumulated and returned so the
/// fallback parser can handle payloads that never streamed segments.
async fn read_event_stream(
    resp: reqwest::Response,
    on_partial: PartialSink<'_>,
) -> Result<String, TransportError> {
    drain_event_lines(resp.bytes_stream(), on_partial).await
}

/// Line reassembly over an arbitrary byte stream: events may arrive split
/// across stream items, and the final line may lack a newline.
async fn drain_event_lines<S, B, E>(
    stream: S,
    on_partial: PartialSink<'_>,
) -> Result<String, TransportError>
where
    S: futures_util::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = String::new();
    let mut pending = String::new();
    let mut stream = Box::pin(stream);

    while let Some(item) = stream.next().await {
        let bytes = item.map_err(|e| TransportError::Network(e.to_string()))?;
        pending.push_str(&String::from_utf8_lossy(bytes.as_ref()));

        while let Some(newline) = pending.find('\n') {
            let line: String = pending.drain(..=newline).collect();
            body.push_str(&line);

            if let Some(batch) = parse_partial_line(line.trim_end()) {
                on_partial(batch);
            }
        }
    }

    if !pending.is_empty() {
        if let Some(batch) = parse_partial_line(pending.trim_end()) {
            on_partial(batch);
        }
        body.push_str(&pending);
    }

    Ok(body)
}

fn parse_partial_line(line: &str) -> Option<Vec<TranscriptionSegment>> {
    let payload = line.strip_prefix("data: ")?.trim();
    let value: Value = serde_json::from_str(payload).ok()?;
    let segments = value.get("segments")?.as_array()?;

    let parsed: Vec<TranscriptionSegment> = segments
        .iter()
        .filter_map(|s| serde_json::from_value(s.clone()).ok())
        .collect();

    (!parsed.is_empty()).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_line_with_segments() {
        let line = r#"data: {"segments": [{"start": 0.0, "end": 1.0, "text": "hi"}]}"#;
        let batch = parse_partial_line(line).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].text, "hi");
    }

    #[test]
    fn test_parse_partial_line_rejects_non_events() {
        assert!(parse_partial_line("00:00:01.000 --> 00:00:02.000").is_none());
        assert!(parse_partial_line(r#"data: {"text": "no segments"}"#).is_none());
        assert!(parse_partial_line("data: not json").is_none());
    }

    #[tokio::test]
    async fn test_event_stream_reassembles_split_lines() {
        use futures_util::stream;
        use std::convert::Infallible;
        use std::sync::Mutex;

        // One event split across two stream items, one complete event, and a
        // trailing event with no newline.
        let pieces: Vec<Result<&[u8], Infallible>> = vec![
            Ok(br#"data: {"segments": [{"start": 0.0,"#),
            Ok(b" \"end\": 1.0, \"text\": \"split\"}]}\ndata: "),
            Ok(br#"{"segments": [{"start": 1.0, "end": 2.0, "text": "tail"}]}"#),
        ];

        let batches: Mutex<Vec<Vec<TranscriptionSegment>>> = Mutex::new(Vec::new());
        let sink = |batch: Vec<TranscriptionSegment>| {
            batches.lock().unwrap().push(batch);
        };

        let body = drain_event_lines(stream::iter(pieces), &sink)
            .await
            .unwrap();

        let batches = batches.into_inner().unwrap();
        assert_eq!(batches.len(), 2, "split line and unterminated tail both parse");
        assert_eq!(batches[0][0].text, "split");
        assert_eq!(batches[1][0].text, "tail");
        assert!(body.contains("split"));
        assert!(body.contains("tail"));
    }

    #[test]
    fn test_build_form_rejects_empty_chunk() {
        let chunk = AudioChunk {
            index: 0,
            samples: Vec::new(),
            sample_rate: 16000,
            duration_secs: 0.0,
        };
        let result = HttpTranscriber::build_form(&chunk, &TranscribeOptions::default());
        assert!(result.is_err());
    }
}
