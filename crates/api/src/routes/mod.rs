//! HTTP routes

pub mod auth;
pub mod chat;
pub mod checkout;
pub mod pages;
pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::{middleware::WEBHOOK_PATH, session_gate};
use crate::state::AppState;

/// Build the application router. Every route sits behind the session gate,
/// which lets the webhook path through untouched.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Pages
        .route("/", get(pages::home))
        .route("/login", get(pages::login_page))
        .route("/signup", get(pages::signup_page))
        .route("/paywall", get(pages::paywall))
        .route("/chat", get(pages::chat_page))
        .route("/subscribe/success", get(pages::subscribe_success))
        .route("/subscribe/cancel", get(pages::subscribe_cancel))
        .route("/health", get(pages::health))
        // Auth forms and API
        .route("/auth/login", post(auth::login))
        .route("/auth/signup", post(auth::signup))
        .route("/api/auth/logout", post(auth::logout))
        // Paid features
        .route("/api/chat", post(chat::chat))
        .route("/api/stripe/checkout", post(checkout::create_checkout))
        .route(WEBHOOK_PATH, post(webhooks::stripe_webhook))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state)
}
