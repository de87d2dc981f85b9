//! Hosted checkout sessions
//!
//! Reuses the Stripe customer stored on the user record or creates one, then
//! opens a subscription-mode checkout session for the configured price. The
//! subscription status itself is never touched here; only the webhook
//! reconciler activates a user.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData, CreateCustomer, Customer, CustomerId,
};
use uuid::Uuid;

use paychat_shared::UserStore;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::USER_ID_METADATA_KEY;

/// Response body for a created checkout session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Parameters for one checkout session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub customer_id: String,
    pub user_id: Uuid,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// The two Stripe calls checkout needs
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Create a customer and return its id
    async fn create_customer(&self, email: Option<&str>, user_id: Uuid) -> BillingResult<String>;

    /// Create a session and return its hosted URL, if Stripe supplied one
    async fn create_session(&self, request: &SessionRequest) -> BillingResult<Option<String>>;
}

/// Gateway backed by the Stripe API
pub struct StripeCheckoutGateway {
    stripe: StripeClient,
}

impl StripeCheckoutGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }
}

fn user_metadata(user_id: Uuid) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(USER_ID_METADATA_KEY.to_string(), user_id.to_string());
    metadata
}

#[async_trait]
impl CheckoutGateway for StripeCheckoutGateway {
    async fn create_customer(&self, email: Option<&str>, user_id: Uuid) -> BillingResult<String> {
        let params = CreateCustomer {
            email,
            metadata: Some(user_metadata(user_id)),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created new Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    async fn create_session(&self, request: &SessionRequest) -> BillingResult<Option<String>> {
        let customer: CustomerId = request
            .customer_id
            .parse()
            .map_err(|_| BillingError::StripeApi("Invalid customer ID".to_string()))?;
        let client_reference_id = request.user_id.to_string();

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.customer = Some(customer);
        params.client_reference_id = Some(&client_reference_id);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(user_metadata(request.user_id)),
            ..Default::default()
        });

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %request.user_id,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(session.url)
    }
}

/// Starts checkout for signed-in users
pub struct CheckoutService {
    gateway: Arc<dyn CheckoutGateway>,
    price_id: String,
    app_url: String,
}

impl CheckoutService {
    pub fn new(gateway: Arc<dyn CheckoutGateway>, price_id: String, app_url: String) -> Self {
        Self {
            gateway,
            price_id,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the service from the Stripe config, using the live gateway
    pub fn from_client(stripe: StripeClient) -> Self {
        let config = stripe.config().clone();
        Self::new(
            Arc::new(StripeCheckoutGateway::new(stripe)),
            config.price_id,
            config.app_url,
        )
    }

    pub fn success_url(&self) -> String {
        format!(
            "{}/subscribe/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_url
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/subscribe/cancel", self.app_url)
    }

    /// Resolve the user's Stripe customer and open a session.
    ///
    /// Returns `Ok(None)` when Stripe created the session without a URL.
    pub async fn start_checkout(
        &self,
        store: &dyn UserStore,
        user_id: Uuid,
        email: Option<&str>,
    ) -> BillingResult<Option<CheckoutResponse>> {
        let existing = store
            .find_by_id(user_id)
            .await?
            .and_then(|user| user.stripe_customer_id)
            .filter(|id| !id.is_empty());

        let customer_id = match existing {
            Some(id) => {
                tracing::debug!(user_id = %user_id, customer_id = %id, "Reusing Stripe customer");
                id
            }
            None => {
                let id = self.gateway.create_customer(email, user_id).await?;
                // The session can still proceed if this write is lost; the
                // webhook stores the customer id again on completion.
                match store.set_customer_id(user_id, &id).await {
                    Ok(0) => tracing::warn!(user_id = %user_id, "No user row to store customer id on"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        "Failed to store Stripe customer id"
                    ),
                }
                id
            }
        };

        let request = SessionRequest {
            customer_id,
            user_id,
            price_id: self.price_id.clone(),
            success_url: self.success_url(),
            cancel_url: self.cancel_url(),
        };

        let url = self.gateway.create_session(&request).await?;
        Ok(url.map(|url| CheckoutResponse { url }))
    }
}
