//! Identity provider seam

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// A fresh token pair from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Provider signed the new user straight in
    SignedIn(SessionTokens),
    /// Provider wants the address confirmed first
    ConfirmationRequired,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    /// Provider refused the request; the message is safe to show
    #[error("{0}")]
    Rejected(String),
    /// Provider unreachable or failing
    #[error("Authentication service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingAuth | AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AuthError::Rejected(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AuthError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Authentication service unavailable".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Supabase auth operations the app relies on
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_access_token(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    /// Revoke the session behind an access token
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}
