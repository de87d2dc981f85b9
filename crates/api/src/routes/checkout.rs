//! Stripe checkout route

use axum::{extract::State, Extension, Json};

use paychat_billing::CheckoutResponse;

use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /api/stripe/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<CheckoutResponse>> {
    let checkout = state
        .checkout
        .clone()
        .ok_or(ApiError::NotConfigured("Stripe not configured"))?;

    let (user, access_token) = session
        .require_user()
        .map_err(|_| ApiError::Unauthorized)?;

    let store = state.stores.scoped(access_token);
    let result = checkout
        .start_checkout(store.as_ref(), user.id, user.email.as_deref())
        .await;

    match result {
        Ok(Some(response)) => {
            tracing::info!(user_id = %user.id, "Checkout session ready");
            Ok(Json(response))
        }
        Ok(None) => Err(ApiError::internal(
            "Failed to create checkout session",
            "Stripe returned a session without a URL",
        )),
        Err(e) => Err(ApiError::internal("Checkout failed", e)),
    }
}
