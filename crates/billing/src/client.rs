//! Stripe client configuration

use stripe::Client;

/// Stripe settings, built once from the application config
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub price_id: String,
    /// Base URL of this application, used for checkout return URLs
    pub app_url: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("price_id", &self.price_id)
            .field("app_url", &self.app_url)
            .finish()
    }
}

/// Thin wrapper around the async-stripe client
#[derive(Clone)]
pub struct StripeClient {
    inner: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = Client::new(config.secret_key.clone());
        Self { inner, config }
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
