//! Fakes and builders shared by router-level tests

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use paychat_billing::{
    BillingResult, CheckoutGateway, CheckoutService, SessionRequest, WebhookHandler,
};
use paychat_shared::{MemoryUserStore, SubscriptionStatus, UserRecord};

use crate::auth::{AuthError, AuthUser, IdentityProvider, SessionTokens, SignUpOutcome};
use crate::config::Config;
use crate::llm::{ChatMessage, ChatProvider, DeltaStream, ProviderError};
use crate::routes::create_router;
use crate::state::AppState;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PASSWORD: &str = "hunter22";

/// Identity provider backed by in-memory token tables
#[derive(Default)]
pub struct FakeIdentity {
    access: Mutex<HashMap<String, AuthUser>>,
    refresh: Mutex<HashMap<String, SessionTokens>>,
    accounts: Mutex<HashMap<String, AuthUser>>,
    pub outage: AtomicBool,
    pub sign_outs: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn grant_access(&self, token: &str, user: &AuthUser) {
        self.access.lock().unwrap().insert(token.to_string(), user.clone());
    }

    /// `refresh_token` trades for `fresh`, whose access token is then valid
    pub fn grant_refresh(&self, refresh_token: &str, fresh: SessionTokens) {
        self.grant_access(&fresh.access_token, &fresh.user);
        self.refresh.lock().unwrap().insert(refresh_token.to_string(), fresh);
    }

    pub fn add_account(&self, email: &str, user: &AuthUser) {
        self.accounts.lock().unwrap().insert(email.to_string(), user.clone());
    }

    fn check_outage(&self) -> Result<(), AuthError> {
        if self.outage.load(Ordering::SeqCst) {
            Err(AuthError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_access_token(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        self.check_outage()?;
        self.access
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        self.check_outage()?;
        self.refresh
            .lock()
            .unwrap()
            .get(refresh_token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        self.check_outage()?;
        let user = self.accounts.lock().unwrap().get(email).cloned();
        match user {
            Some(user) if password == PASSWORD => {
                let tokens = SessionTokens {
                    access_token: format!("access-{}", user.id),
                    refresh_token: format!("refresh-{}", user.id),
                    user,
                };
                self.grant_access(&tokens.access_token, &tokens.user);
                Ok(tokens)
            }
            _ => Err(AuthError::Rejected("Invalid login credentials".to_string())),
        }
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
        self.check_outage()?;
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }
        Ok(SignUpOutcome::ConfirmationRequired)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.sign_outs.lock().unwrap().push(access_token.to_string());
        self.access.lock().unwrap().remove(access_token);
        Ok(())
    }
}

/// Chat provider replaying canned deltas
pub struct FakeChat {
    pub deltas: Vec<String>,
    pub failure: Option<ProviderError>,
    pub calls: AtomicUsize,
}

impl FakeChat {
    pub fn replying(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            deltas: Vec::new(),
            failure: Some(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(self.deltas.concat()),
        }
    }

    async fn stream(&self, _messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        let items: Vec<Result<String, ProviderError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Checkout gateway that records calls instead of reaching Stripe
#[derive(Default)]
pub struct FakeGateway {
    pub customers_created: AtomicUsize,
    pub sessions: Mutex<Vec<SessionRequest>>,
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    async fn create_customer(&self, _email: Option<&str>, _user_id: Uuid) -> BillingResult<String> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_fake_{}", n + 1))
    }

    async fn create_session(&self, request: &SessionRequest) -> BillingResult<Option<String>> {
        self.sessions.lock().unwrap().push(request.clone());
        Ok(Some("https://checkout.stripe.com/c/pay/cs_fake".to_string()))
    }
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("SUPABASE_URL", "http://supabase.test"),
        ("SUPABASE_ANON_KEY", "anon-key"),
        ("APP_URL", "http://app.test"),
        ("STRIPE_SECRET_KEY", "sk_test_fake"),
        ("STRIPE_PRICE_ID", "price_fake"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("OPENAI_API_KEY", "sk-fake"),
        ("CHAT_STREAM_READ_TIMEOUT_SECS", "5"),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

/// A fully wired app over fakes
pub struct TestApp {
    pub state: AppState,
    pub store: MemoryUserStore,
    pub identity: Arc<FakeIdentity>,
    pub chat: Arc<FakeChat>,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_chat(FakeChat::replying(&["Hel", "lo", "!"]))
    }

    pub fn with_chat(chat: FakeChat) -> Self {
        let config = test_config();
        let store = MemoryUserStore::new();
        let identity = Arc::new(FakeIdentity::default());
        let chat = Arc::new(chat);
        let gateway = Arc::new(FakeGateway::default());

        let checkout = CheckoutService::new(
            gateway.clone(),
            "price_fake".to_string(),
            config.app_url.clone(),
        );
        let webhooks = WebhookHandler::new(WEBHOOK_SECRET.to_string(), Arc::new(store.clone()));

        let state = AppState {
            config,
            stores: Arc::new(store.clone()),
            identity: identity.clone(),
            chat: Some(chat.clone()),
            checkout: Some(Arc::new(checkout)),
            webhooks: Some(Arc::new(webhooks)),
        };

        Self {
            state,
            store,
            identity,
            chat,
            gateway,
        }
    }

    pub fn without_chat(mut self) -> Self {
        self.state.chat = None;
        self
    }

    pub fn without_checkout(mut self) -> Self {
        self.state.checkout = None;
        self
    }

    pub fn without_webhooks(mut self) -> Self {
        self.state.webhooks = None;
        self
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Insert a user with `status` and return a valid access token for them
    pub async fn signed_in(&self, status: SubscriptionStatus) -> (UserRecord, String) {
        let mut record = UserRecord::new(Uuid::new_v4(), Some("user@example.com".to_string()));
        record.subscription_status = status;
        self.store.insert(record.clone()).await;

        let token = format!("access-{}", record.id);
        self.identity.grant_access(
            &token,
            &AuthUser {
                id: record.id,
                email: record.email.clone(),
            },
        );
        (record, token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
