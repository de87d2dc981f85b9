//! Session cookies
//!
//! A session is a pair of HttpOnly cookies holding the Supabase access and
//! refresh tokens. API clients may send the access token as a bearer header
//! instead.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use super::SessionTokens;

pub const ACCESS_COOKIE: &str = "paychat-access-token";
pub const REFRESH_COOKIE: &str = "paychat-refresh-token";

/// Refresh tokens outlive access tokens; the browser keeps both this long
const COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 30;

/// Tokens presented by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Bearer header first, then cookies
pub fn presented_tokens(headers: &HeaderMap) -> PresentedTokens {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    PresentedTokens {
        access_token: bearer.or_else(|| cookie_value(headers, ACCESS_COOKIE)),
        refresh_token: cookie_value(headers, REFRESH_COOKIE),
    }
}

/// Builds `Set-Cookie` values for the session pair
#[derive(Debug, Clone, Copy)]
pub struct CookieJar {
    secure: bool,
}

impl CookieJar {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn cookie(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            name, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn set_session(&self, tokens: &SessionTokens) -> Vec<String> {
        vec![
            self.cookie(ACCESS_COOKIE, &tokens.access_token, COOKIE_MAX_AGE_SECS),
            self.cookie(REFRESH_COOKIE, &tokens.refresh_token, COOKIE_MAX_AGE_SECS),
        ]
    }

    pub fn clear_session(&self) -> Vec<String> {
        vec![
            self.cookie(ACCESS_COOKIE, "", 0),
            self.cookie(REFRESH_COOKIE, "", 0),
        ]
    }
}

/// Append `Set-Cookie` headers, skipping any value that is not a valid header
pub fn append_cookies(headers: &mut HeaderMap, cookies: &[String]) {
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(_) => tracing::warn!("Dropping session cookie with invalid characters"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use uuid::Uuid;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_tokens_from_cookies() {
        let h = headers(&[(
            "cookie",
            "theme=dark; paychat-access-token=acc; paychat-refresh-token=ref",
        )]);
        assert_eq!(
            presented_tokens(&h),
            PresentedTokens {
                access_token: Some("acc".to_string()),
                refresh_token: Some("ref".to_string()),
            }
        );
    }

    #[test]
    fn test_bearer_header_preferred() {
        let h = headers(&[
            ("authorization", "Bearer header-token"),
            ("cookie", "paychat-access-token=cookie-token"),
        ]);
        assert_eq!(presented_tokens(&h).access_token.as_deref(), Some("header-token"));
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let h = headers(&[("cookie", "paychat-access-token=; paychat-refresh-token=r")]);
        let tokens = presented_tokens(&h);
        assert_eq!(tokens.access_token, None);
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_cookie_attributes() {
        let tokens = SessionTokens {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            user: AuthUser {
                id: Uuid::nil(),
                email: None,
            },
        };

        let plain = CookieJar::new(false).set_session(&tokens);
        assert!(plain[0].starts_with("paychat-access-token=a; Path=/; HttpOnly; SameSite=Lax"));
        assert!(!plain[0].contains("Secure"));

        let secure = CookieJar::new(true).set_session(&tokens);
        assert!(secure[1].starts_with("paychat-refresh-token=r;"));
        assert!(secure[1].ends_with("; Secure"));

        let cleared = CookieJar::new(false).clear_session();
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    }
}
