//! Login, signup and logout

use axum::{
    extract::State,
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{
    middleware::encode_next,
    session::{append_cookies, presented_tokens},
    AuthError, CookieJar, SignUpOutcome,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Only same-site absolute paths are followed after login
pub fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn see_other(location: &str, cookies: &[String]) -> Response {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(LOCATION, value);
        }
        Err(_) => {
            headers.insert(LOCATION, HeaderValue::from_static("/"));
        }
    }
    append_cookies(&mut headers, cookies);
    (StatusCode::SEE_OTHER, headers).into_response()
}

fn error_location(page: &str, message: &str, next: &str) -> String {
    let mut location = format!("{}?error={}", page, urlencoding::encode(message));
    if next != "/" {
        location.push_str(&format!("&next={}", encode_next(next)));
    }
    location
}

fn form_error(page: &str, message: &str, next: &str) -> Response {
    see_other(&error_location(page, message, next), &[])
}

fn user_message(err: &AuthError) -> String {
    match err {
        AuthError::Rejected(message) => message.clone(),
        AuthError::Unavailable(_) => "Sign-in is temporarily unavailable. Please try again.".to_string(),
        _ => "Authentication failed".to_string(),
    }
}

/// POST /auth/login
pub async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let next = sanitize_next(form.next.as_deref());
    let email = form.email.trim();

    if email.is_empty() || form.password.is_empty() {
        return form_error("/login", "Email and password are required", &next);
    }

    match state.identity.sign_in(email, &form.password).await {
        Ok(tokens) => {
            let jar = CookieJar::new(state.config.secure_cookies);
            see_other(&next, &jar.set_session(&tokens))
        }
        Err(e) => {
            tracing::info!(error = %e, "Login failed");
            form_error("/login", &user_message(&e), &next)
        }
    }
}

/// POST /auth/signup
pub async fn signup(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    let email = form.email.trim();

    if email.is_empty() || form.password.is_empty() {
        return form_error("/signup", "Email and password are required", "/");
    }

    match state.identity.sign_up(email, &form.password).await {
        Ok(SignUpOutcome::SignedIn(tokens)) => {
            let jar = CookieJar::new(state.config.secure_cookies);
            see_other("/", &jar.set_session(&tokens))
        }
        Ok(SignUpOutcome::ConfirmationRequired) => see_other(
            &format!(
                "/signup?notice={}",
                urlencoding::encode("Check your email to confirm your account, then log in.")
            ),
            &[],
        ),
        Err(e) => {
            tracing::info!(error = %e, "Signup failed");
            form_error("/signup", &user_message(&e), "/")
        }
    }
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(access_token) = presented_tokens(&headers).access_token {
        // Cookies are cleared either way
        if let Err(e) = state.identity.sign_out(&access_token).await {
            tracing::warn!(error = %e, "Failed to revoke session at provider");
        }
    }

    let mut response = Json(json!({ "success": true })).into_response();
    let jar = CookieJar::new(state.config.secure_cookies);
    append_cookies(response.headers_mut(), &jar.clear_session());
    response
}
