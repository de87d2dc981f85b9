//! Session gate middleware for Axum
//!
//! Runs on every request except the Stripe webhook. It resolves (and when
//! needed refreshes) the caller's session, applies the redirect matrix, and
//! attaches any cookie changes to whatever response goes back out.

use axum::{
    extract::{Request, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::identity::{AuthError, AuthUser, IdentityProvider};
use super::session::{append_cookies, presented_tokens, CookieJar, PresentedTokens};
use crate::state::AppState;

pub const WEBHOOK_PATH: &str = "/api/webhooks/stripe";

/// How the gate treats a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// `/login`, `/signup`
    AuthPage,
    /// `/chat*`, `/paywall*`, `/subscribe*`
    Protected,
    /// Stripe webhook; no session handling at all
    Webhook,
    Public,
}

fn has_prefix_segment(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub fn classify_path(path: &str) -> PathClass {
    if path == WEBHOOK_PATH {
        PathClass::Webhook
    } else if path == "/login" || path == "/signup" {
        PathClass::AuthPage
    } else if ["/chat", "/paywall", "/subscribe"]
        .iter()
        .any(|prefix| has_prefix_segment(path, prefix))
    {
        PathClass::Protected
    } else {
        PathClass::Public
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(String),
}

/// Unreserved characters plus `/`; everything else in `next` is escaped
const NEXT_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a path for use as the `next` query value, keeping `/`
pub fn encode_next(path: &str) -> String {
    utf8_percent_encode(path, NEXT_PATH).to_string()
}

pub fn login_redirect(path: &str) -> String {
    format!("/login?next={}", encode_next(path))
}

/// Redirect matrix
pub fn gate_decision(class: PathClass, signed_in: bool, path: &str) -> GateDecision {
    match (class, signed_in) {
        (PathClass::AuthPage, true) => GateDecision::Redirect("/".to_string()),
        (PathClass::Protected, false) => GateDecision::Redirect(login_redirect(path)),
        _ => GateDecision::Allow,
    }
}

/// What to do with the caller's session cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    Keep,
    Set(super::SessionTokens),
    Clear,
}

/// Outcome of session resolution, also stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Option<AuthUser>,
    /// Access token valid for this request, for user-scoped store calls
    pub access_token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            access_token: None,
        }
    }

    /// The user and their token, or 401
    pub fn require_user(&self) -> Result<(&AuthUser, &str), AuthError> {
        match (&self.user, &self.access_token) {
            (Some(user), Some(token)) => Ok((user, token.as_str())),
            _ => Err(AuthError::MissingAuth),
        }
    }
}

/// Resolve the presented tokens into a user, refreshing when the access
/// token is no longer accepted
pub async fn resolve_session(
    identity: &dyn IdentityProvider,
    tokens: &PresentedTokens,
) -> (Session, CookieAction) {
    let mut access_rejected = false;

    if let Some(access_token) = &tokens.access_token {
        match identity.verify_access_token(access_token).await {
            Ok(user) => {
                return (
                    Session {
                        user: Some(user),
                        access_token: Some(access_token.clone()),
                    },
                    CookieAction::Keep,
                )
            }
            Err(AuthError::Unavailable(reason)) => {
                tracing::warn!(reason = %reason, "Could not verify session; treating as anonymous");
                return (Session::anonymous(), CookieAction::Keep);
            }
            Err(_) => access_rejected = true,
        }
    }

    let Some(refresh_token) = &tokens.refresh_token else {
        let action = if access_rejected {
            CookieAction::Clear
        } else {
            CookieAction::Keep
        };
        return (Session::anonymous(), action);
    };

    match identity.refresh_session(refresh_token).await {
        Ok(fresh) => {
            tracing::debug!(user_id = %fresh.user.id, "Session refreshed");
            (
                Session {
                    user: Some(fresh.user.clone()),
                    access_token: Some(fresh.access_token.clone()),
                },
                CookieAction::Set(fresh),
            )
        }
        Err(AuthError::Unavailable(reason)) => {
            tracing::warn!(reason = %reason, "Could not refresh session; treating as anonymous");
            (Session::anonymous(), CookieAction::Keep)
        }
        Err(_) => {
            tracing::debug!("Refresh token rejected; clearing session");
            (Session::anonymous(), CookieAction::Clear)
        }
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Middleware applied to the whole router
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let class = classify_path(&path);

    if class == PathClass::Webhook {
        return next.run(request).await;
    }

    let tokens = presented_tokens(request.headers());
    let (session, cookies) = resolve_session(state.identity.as_ref(), &tokens).await;
    let decision = gate_decision(class, session.user.is_some(), &path);

    let mut response = match decision {
        GateDecision::Redirect(location) => {
            tracing::debug!(path = %path, location = %location, "Gate redirect");
            redirect(&location)
        }
        GateDecision::Allow => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
    };

    // Handlers that set the session themselves (login, logout) take precedence
    if response.headers().contains_key(SET_COOKIE) {
        return response;
    }

    let jar = CookieJar::new(state.config.secure_cookies);
    match cookies {
        CookieAction::Keep => {}
        CookieAction::Set(fresh) => append_cookies(response.headers_mut(), &jar.set_session(&fresh)),
        CookieAction::Clear => append_cookies(response.headers_mut(), &jar.clear_session()),
    }

    response
}
