//! HTML pages

use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension,
};
use serde::Deserialize;

use crate::auth::{middleware::login_redirect, Session};
use crate::state::AppState;
use crate::subscription::{check_access, Access};
use crate::templates::{self, FormFlash, HomeView};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub error: Option<String>,
    pub notice: Option<String>,
    pub next: Option<String>,
}

impl PageQuery {
    fn flash(&self) -> FormFlash<'_> {
        FormFlash {
            error: self.error.as_deref(),
            notice: self.notice.as_deref(),
            next: self.next.as_deref(),
        }
    }
}

fn temporary_redirect(location: &'static str) -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(LOCATION, HeaderValue::from_static(location))],
    )
        .into_response()
}

async fn access_for(state: &AppState, session: &Session) -> Access {
    let Ok((user, token)) = session.require_user() else {
        return Access::Anonymous;
    };
    let store = state.stores.scoped(token);
    match check_access(store.as_ref(), Some(user)).await {
        Ok(access) => access,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Subscription lookup failed");
            Access::Unsubscribed(Default::default())
        }
    }
}

/// GET /
pub async fn home(State(state): State<AppState>, Extension(session): Extension<Session>) -> Html<String> {
    let view = match &session.user {
        None => HomeView::Anonymous,
        Some(user) => HomeView::SignedIn {
            email: user.email.clone(),
            subscribed: access_for(&state, &session).await == Access::Subscribed,
        },
    };
    Html(templates::home(&view))
}

/// GET /login
pub async fn login_page(Query(query): Query<PageQuery>) -> Html<String> {
    Html(templates::login(&query.flash()))
}

/// GET /signup
pub async fn signup_page(Query(query): Query<PageQuery>) -> Html<String> {
    Html(templates::signup(&query.flash()))
}

/// GET /paywall
pub async fn paywall(Extension(session): Extension<Session>) -> Html<String> {
    let email = session.user.as_ref().and_then(|u| u.email.as_deref());
    Html(templates::paywall(email))
}

/// GET /chat
///
/// The gate already sent anonymous visitors to login; this adds the
/// subscription check. A failed lookup is treated as unsubscribed.
pub async fn chat_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    match access_for(&state, &session).await {
        Access::Subscribed => Html(templates::chat()).into_response(),
        Access::Anonymous => match HeaderValue::from_str(&login_redirect("/chat")) {
            Ok(location) => (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response(),
            Err(_) => temporary_redirect("/login"),
        },
        Access::Unsubscribed(_) => temporary_redirect("/paywall"),
    }
}

/// GET /subscribe/success
pub async fn subscribe_success() -> Html<String> {
    Html(templates::subscribe_success())
}

/// GET /subscribe/cancel
pub async fn subscribe_cancel() -> Html<String> {
    Html(templates::subscribe_cancel())
}

pub async fn health() -> &'static str {
    "ok"
}
