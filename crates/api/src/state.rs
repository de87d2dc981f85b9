//! Application state

use reqwest::Client;
use std::sync::Arc;

use paychat_billing::{CheckoutService, StripeClient, StripeConfig, WebhookHandler};
use paychat_shared::UserStores;

use crate::{
    auth::{IdentityProvider, SupabaseAuth},
    config::Config,
    llm::{ChatProvider, OpenAiClient},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// User-scoped and privileged access to the users table
    pub stores: Arc<dyn UserStores>,
    pub identity: Arc<dyn IdentityProvider>,
    /// `None` when no provider key is configured
    pub chat: Option<Arc<dyn ChatProvider>>,
    pub checkout: Option<Arc<CheckoutService>>,
    /// Needs both a signing secret and a privileged store
    pub webhooks: Option<Arc<WebhookHandler>>,
}

impl AppState {
    pub fn new(config: Config, stores: Arc<dyn UserStores>, http_client: Client) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseAuth::new(
            http_client.clone(),
            &config.supabase_url,
            &config.supabase_anon_key,
            config.supabase_jwt_secret.as_deref(),
        ));
        if config.supabase_jwt_secret.is_some() {
            tracing::info!("Supabase JWT validation enabled");
        } else {
            tracing::info!(
                "Supabase API verification enabled via {}",
                config.supabase_url
            );
        }

        let chat = config.openai_api_key.as_ref().map(|key| {
            let client = OpenAiClient::new(
                http_client.clone(),
                key.clone(),
                config.openai_model.clone(),
                config.openai_base_url.clone(),
            );
            tracing::info!(model = %client.model(), "Chat provider initialized");
            Arc::new(client) as Arc<dyn ChatProvider>
        });

        let checkout = match (&config.stripe_secret_key, &config.stripe_price_id) {
            (Some(secret_key), Some(price_id)) => {
                let stripe = StripeClient::new(StripeConfig {
                    secret_key: secret_key.clone(),
                    price_id: price_id.clone(),
                    app_url: config.app_url.clone(),
                });
                tracing::info!("Stripe checkout initialized");
                Some(Arc::new(CheckoutService::from_client(stripe)))
            }
            _ => None,
        };

        let webhooks = match (&config.stripe_webhook_secret, stores.service()) {
            (Some(secret), Some(store)) => {
                tracing::info!("Stripe webhook handler initialized");
                Some(Arc::new(WebhookHandler::new(secret.clone(), store)))
            }
            _ => None,
        };

        config.log_degraded_features();

        Self {
            config,
            stores,
            identity,
            chat,
            checkout,
            webhooks,
        }
    }
}
