//! Billing errors

use paychat_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,
    #[error("Malformed webhook payload: {0}")]
    WebhookPayload(String),
    #[error("Stripe API error: {0}")]
    StripeApi(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::WebhookPayload(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
