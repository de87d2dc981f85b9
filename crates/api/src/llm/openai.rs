//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;

use super::sse::{parse_delta, SseDecoder, SseEvent};
use super::{ChatMessage, ChatProvider, DeltaStream, ProviderError};

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    pub fn new(http: Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Chat provider request failed");
                ProviderError::from(e)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("Chat provider error")
                    .to_string()
            });

        tracing::warn!(
            status = status.as_u16(),
            message = %message,
            "Chat provider returned an error"
        );

        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response = self.send(messages, false).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        let response = self.send(messages, true).await?;
        let bytes = Box::pin(response.bytes_stream());

        struct State<S> {
            bytes: S,
            decoder: SseDecoder,
            pending: VecDeque<Result<String, ProviderError>>,
            done: bool,
        }

        let state = State {
            bytes,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }

                let events = match state.bytes.next().await {
                    Some(Ok(chunk)) => state.decoder.push(&chunk),
                    Some(Err(e)) => Err(ProviderError::from(e)),
                    None => {
                        state.done = true;
                        Ok(state.decoder.finish().into_iter().collect())
                    }
                };

                match events {
                    Ok(events) => {
                        for event in events {
                            match event {
                                SseEvent::Done => {
                                    state.done = true;
                                    break;
                                }
                                SseEvent::Data(data) => match parse_delta(&data) {
                                    Ok(Some(text)) => state.pending.push_back(Ok(text)),
                                    Ok(None) => {}
                                    Err(e) => {
                                        state.pending.push_back(Err(e));
                                        state.done = true;
                                        break;
                                    }
                                },
                            }
                        }
                    }
                    Err(e) => {
                        state.pending.push_back(Err(e));
                        state.done = true;
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
