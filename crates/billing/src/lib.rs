// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paychat Billing Module
//!
//! Stripe integration for the single subscription plan.
//!
//! ## Features
//!
//! - **Checkout**: Reuse or create the Stripe customer and open a hosted checkout session
//! - **Webhooks**: Verify signed events and reconcile the local subscription status

pub mod checkout;
pub mod client;
pub mod error;
pub mod events;
pub mod signature;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{
    CheckoutGateway, CheckoutResponse, CheckoutService, SessionRequest, StripeCheckoutGateway,
};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{WebhookEvent, WebhookEventKind, USER_ID_METADATA_KEY};

// Signature
pub use signature::{compute_signature, verify_signature, WEBHOOK_TOLERANCE_SECS};

// Webhooks
pub use webhooks::{map_stripe_status, ReconcileOutcome, WebhookHandler};
