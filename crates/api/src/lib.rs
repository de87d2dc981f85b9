// API crate clippy configuration
#![allow(clippy::single_match)] // Clearer in some cases
#![allow(clippy::format_in_format_args)] // Intentional in logging macros
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Paychat API Library
//!
//! Session handling, the subscription guard, the chat relay and the Stripe
//! routes for the Paychat web app.

pub mod auth;
pub mod config;
pub mod error;
pub mod llm;
pub mod routes;
pub mod security;
pub mod state;
pub mod subscription;
pub mod templates;
#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
