//! Stripe webhook route
//!
//! The body is taken as raw bytes; the signature covers the exact payload.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use paychat_billing::{BillingError, ReconcileOutcome};

use crate::state::AppState;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(handler) = state.webhooks.clone() else {
        tracing::error!("Stripe webhook received but webhooks are not configured");
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Webhook not configured");
    };

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
    else {
        tracing::warn!("Stripe webhook missing signature header");
        return error(StatusCode::BAD_REQUEST, "Missing stripe-signature header");
    };

    let event = match handler.verify_event(&body, signature) {
        Ok(event) => event,
        Err(BillingError::WebhookSignatureInvalid) => {
            return error(StatusCode::BAD_REQUEST, "Invalid signature");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stripe webhook body rejected");
            return error(StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    match handler.handle_event(&event).await {
        Ok(outcome) => {
            if let ReconcileOutcome::StoreFailed { error } = &outcome {
                tracing::error!(event_id = %event.id, error = %error, "Webhook acknowledged despite store failure");
            }
            Json(json!({ "received": true })).into_response()
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Webhook handler failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Webhook handler failed")
        }
    }
}
