//! Incremental server-sent-events decoder
//!
//! Bytes arrive in arbitrary chunks; events are only emitted once their
//! terminating blank line has been seen. Lines are split on `\n` before any
//! UTF-8 decoding so multi-byte characters straddling a chunk boundary
//! survive intact.

use serde::Deserialize;

use super::ProviderError;

const MAX_SSE_BUFFER_SIZE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    /// `data: [DONE]`
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a chunk and collect the events it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, ProviderError> {
        if self.finished {
            return Ok(Vec::new());
        }
        if self.buffer.len() + chunk.len() > MAX_SSE_BUFFER_SIZE {
            return Err(ProviderError::Decode(
                "SSE buffer exceeded maximum size".to_string(),
            ));
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.take_line(line) {
                let done = event == SseEvent::Done;
                events.push(event);
                if done {
                    self.finished = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Flush an event left without its trailing blank line at end of stream
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.take_line(rest.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // event:, id: and retry: carry nothing we use
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if data.trim() == "[DONE]" {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data))
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: Option<String>,
}

/// Pull the text delta out of one chat-completions stream event
pub fn parse_delta(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::Api {
            status: 500,
            message: error
                .message
                .unwrap_or_else(|| "Provider stream error".to_string()),
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}
