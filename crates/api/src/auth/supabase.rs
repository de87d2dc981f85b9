//! Supabase auth (GoTrue) client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::identity::{AuthError, AuthUser, IdentityProvider, SessionTokens, SignUpOutcome};
use super::jwt::JwtVerifier;

/// Cache Supabase verification results for 60 seconds so a page load that
/// fans out into several requests verifies its token once
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// Bound on cached tokens; the oldest entry is evicted past this
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Upper bound on one `/auth/v1/user` round trip
const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
struct CachedUser {
    user: AuthUser,
    cached_at: Instant,
}

type TokenCache = Arc<RwLock<HashMap<String, CachedUser>>>;

type VerifyResult = Result<AuthUser, AuthError>;

/// Verifications currently waiting on Supabase, keyed by token. Never held
/// across an await.
type InFlightRequests = Arc<Mutex<HashMap<String, broadcast::Sender<VerifyResult>>>>;

fn lock_in_flight(map: &InFlightRequests) -> MutexGuard<'_, HashMap<String, broadcast::Sender<VerifyResult>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the in-flight entry of the request doing the actual lookup.
///
/// Dropped without `finish` (the leader was cancelled), it still removes the
/// entry, which closes the channel and releases every waiter.
struct InFlightGuard {
    requests: InFlightRequests,
    token: String,
    finished: bool,
}

impl InFlightGuard {
    fn finish(mut self, result: &VerifyResult) {
        self.finished = true;
        if let Some(tx) = lock_in_flight(&self.requests).remove(&self.token) {
            // Receivers may have gone away
            let _ = tx.send(result.clone());
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // After `finish` the token may already belong to a newer lookup
        if !self.finished {
            lock_in_flight(&self.requests).remove(&self.token);
        }
    }
}

/// User object returned by GoTrue
#[derive(Debug, Clone, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl GoTrueUser {
    fn into_auth_user(self) -> Result<AuthUser, AuthError> {
        let id = Uuid::parse_str(&self.id).map_err(|_| {
            tracing::warn!(user_id = %self.id, "Supabase returned a non-UUID user id");
            AuthError::InvalidToken
        })?;
        Ok(AuthUser {
            id,
            email: self.email,
        })
    }
}

/// `/token` and `/signup` responses. Signup without a session returns the
/// bare user object, so every field is optional.
#[derive(Debug, Deserialize)]
struct GoTrueSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<GoTrueUser>,
}

impl GoTrueSession {
    fn into_tokens(self) -> Option<Result<SessionTokens, AuthError>> {
        match (self.access_token, self.refresh_token, self.user) {
            (Some(access_token), Some(refresh_token), Some(user)) => {
                Some(user.into_auth_user().map(|user| SessionTokens {
                    access_token,
                    refresh_token,
                    user,
                }))
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct SupabaseAuth {
    http: Client,
    supabase_url: String,
    anon_key: String,
    jwt: Option<JwtVerifier>,
    token_cache: TokenCache,
    in_flight_requests: InFlightRequests,
    verify_timeout: Duration,
}

impl SupabaseAuth {
    pub fn new(http: Client, supabase_url: &str, anon_key: &str, jwt_secret: Option<&str>) -> Self {
        Self {
            http,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            jwt: jwt_secret.map(JwtVerifier::new),
            token_cache: Arc::new(RwLock::new(HashMap::new())),
            in_flight_requests: Arc::new(Mutex::new(HashMap::new())),
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    /// Verify via the API, with caching and request coalescing
    async fn verify_via_api(&self, token: &str) -> Result<AuthUser, AuthError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(token) {
                if cached.cached_at.elapsed() < TOKEN_CACHE_TTL {
                    tracing::debug!(user_id = %cached.user.id, "Using cached Supabase auth");
                    return Ok(cached.user.clone());
                }
            }
        }

        let waiting = {
            let mut in_flight = lock_in_flight(&self.in_flight_requests);
            match in_flight.get(token) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(token.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiting {
            tracing::debug!("Joining in-flight Supabase verification");
            return match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(AuthError::Unavailable("verification abandoned".to_string())),
            };
        }

        let guard = InFlightGuard {
            requests: self.in_flight_requests.clone(),
            token: token.to_string(),
            finished: false,
        };

        let result = match tokio::time::timeout(self.verify_timeout, self.fetch_user(token)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.verify_timeout.as_secs_f64(),
                    "Supabase auth did not answer in time"
                );
                Err(AuthError::Unavailable("verification timed out".to_string()))
            }
        };

        guard.finish(&result);

        if let Ok(ref user) = result {
            let mut cache = self.token_cache.write().await;
            if cache.len() >= MAX_CACHE_ENTRIES {
                if let Some(oldest) = cache
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest);
                }
            }
            cache.insert(
                token.to_string(),
                CachedUser {
                    user: user.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        result
    }

    async fn fetch_user(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Supabase auth");
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Supabase auth unavailable");
            return Err(AuthError::Unavailable(status.to_string()));
        }
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Supabase rejected access token");
            return Err(AuthError::InvalidToken);
        }

        response
            .json::<GoTrueUser>()
            .await
            .map_err(|_| AuthError::InvalidToken)?
            .into_auth_user()
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, AuthError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path = %path, "Failed to reach Supabase auth");
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = error_message(&text).unwrap_or_else(|| status.to_string());
        tracing::debug!(status = status.as_u16(), path = %path, message = %message, "Supabase auth request failed");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(AuthError::Unavailable(message))
        } else {
            Err(AuthError::Rejected(message))
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<SessionTokens, AuthError> {
        let session: GoTrueSession = self
            .post_json(&format!("token?grant_type={}", grant_type), body)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        session
            .into_tokens()
            .unwrap_or_else(|| Err(AuthError::Unavailable("incomplete session".to_string())))
    }
}

/// GoTrue has used several error shapes over time
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn verify_access_token(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        match &self.jwt {
            Some(verifier) => verifier.verify(access_token),
            None => self.verify_via_api(access_token).await,
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
            .map_err(|e| match e {
                AuthError::Rejected(_) => AuthError::InvalidToken,
                other => other,
            })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let tokens = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::info!(user_id = %tokens.user.id, "User signed in");
        Ok(tokens)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let session: GoTrueSession = self
            .post_json("signup", json!({ "email": email, "password": password }))
            .await?
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match session.into_tokens() {
            Some(tokens) => {
                let tokens = tokens?;
                tracing::info!(user_id = %tokens.user.id, "User signed up and signed in");
                Ok(SignUpOutcome::SignedIn(tokens))
            }
            None => {
                tracing::info!("User signed up; confirmation required");
                Ok(SignUpOutcome::ConfirmationRequired)
            }
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.token_cache.write().await.remove(access_token);

        let response = self
            .http
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::Rejected(response.status().to_string()))
        }
    }
}
