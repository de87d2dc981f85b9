//! Chat relay
//!
//! `POST /api/chat` forwards the conversation to the chat provider. In
//! streaming mode each text delta is written to the response as raw bytes
//! the moment it arrives.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::llm::{ChatMessage, DeltaStream};
use crate::state::AppState;
use crate::subscription::{check_access, Access};

/// Fragments buffered between the provider and a slow client
const RELAY_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Validate the decoded body
pub fn parse_chat_request(body: &Value) -> ApiResult<ChatRequest> {
    let messages = match body.get("messages") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(ApiError::bad_request("messages array required")),
    };

    let messages = messages
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<ChatMessage>(item.clone()).map_err(|_| {
                ApiError::bad_request(format!(
                    "messages[{}] must have a role of system, user or assistant and string content",
                    i
                ))
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let stream = match body.get("stream") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(ApiError::bad_request("stream must be a boolean")),
    };

    Ok(ChatRequest { messages, stream })
}

/// How the forwarding loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Completed,
    ClientGone,
    ProviderFailed,
    TimedOut,
}

/// Copy provider deltas into the response channel until either side stops.
///
/// Dropping `upstream` on return cancels the provider request.
pub async fn relay(
    mut upstream: DeltaStream,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    read_timeout: Duration,
) -> RelayEnd {
    let mut fragments = 0usize;
    let end = loop {
        let next = tokio::select! {
            _ = tx.closed() => break RelayEnd::ClientGone,
            next = tokio::time::timeout(read_timeout, upstream.next()) => next,
        };

        match next {
            Err(_) => {
                tracing::warn!(timeout_secs = read_timeout.as_secs(), "Chat provider stream stalled");
                break RelayEnd::TimedOut;
            }
            Ok(None) => break RelayEnd::Completed,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "Chat provider stream failed mid-response");
                break RelayEnd::ProviderFailed;
            }
            Ok(Some(Ok(text))) => {
                fragments += 1;
                if tx.send(Ok(Bytes::from(text))).await.is_err() {
                    break RelayEnd::ClientGone;
                }
            }
        }
    };

    tracing::debug!(fragments = fragments, end = ?end, "Chat relay finished");
    end
}

fn streaming_response(rx: mpsc::Receiver<Result<Bytes, Infallible>>) -> Response {
    let mut response = Body::from_stream(ReceiverStream::new(rx)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> ApiResult<Response> {
    let provider = state
        .chat
        .clone()
        .ok_or(ApiError::NotConfigured("Chat provider not configured"))?;

    let (user, access_token) = session
        .require_user()
        .map_err(|_| ApiError::Unauthorized)?;

    let store = state.stores.scoped(access_token);
    match check_access(store.as_ref(), Some(user)).await? {
        Access::Subscribed => {}
        _ => return Err(ApiError::Forbidden("Active subscription required")),
    }

    let body: Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON body"))?;
    let request = parse_chat_request(&body)?;

    tracing::info!(
        user_id = %user.id,
        messages = request.messages.len(),
        stream = request.stream,
        "Chat request"
    );

    if !request.stream {
        let content = provider.complete(&request.messages).await?;
        let message = ChatMessage::assistant(content);
        return Ok(Json(json!({ "message": message })).into_response());
    }

    let upstream = provider.stream(&request.messages).await?;
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    let read_timeout = state.config.chat_stream_read_timeout;
    tokio::spawn(async move {
        relay(upstream, tx, read_timeout).await;
    });

    Ok(streaming_response(rx))
}
