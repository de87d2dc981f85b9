//! User records and the persistence seam
//!
//! The `users` table is owned by the external database. This module only
//! describes the shape of a row and the handful of conditional updates the
//! application performs on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;

/// A row of the `users` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    /// A fresh record with no subscription, as created at signup
    pub fn new(id: Uuid, email: Option<String>) -> Self {
        Self {
            id,
            email,
            subscription_status: SubscriptionStatus::Inactive,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Fields written when a hosted checkout completes.
///
/// `None` leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutUpdate {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
}

impl CheckoutUpdate {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.subscription_id.is_none() && self.status.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Failed to decode row: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reads and conditional updates on the `users` table.
///
/// Every update is a single statement keyed either by user id or by
/// subscription id and returns the number of rows it touched.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>>;

    /// Keyed by user id.
    async fn record_checkout(&self, user_id: Uuid, update: &CheckoutUpdate) -> StoreResult<u64>;

    /// Keyed by subscription id.
    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<u64>;

    /// Keyed by subscription id. Sets `canceled` and clears the subscription id.
    async fn cancel_subscription(&self, subscription_id: &str) -> StoreResult<u64>;

    /// Keyed by user id. Never touches the subscription status.
    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> StoreResult<u64>;
}

/// Hands out stores with the right credentials for the caller
pub trait UserStores: Send + Sync {
    /// Store acting on behalf of a signed-in user
    fn scoped(&self, access_token: &str) -> Arc<dyn UserStore>;

    /// Privileged store for server-trusted paths (the webhook reconciler).
    /// `None` when no privileged credentials are configured.
    fn service(&self) -> Option<Arc<dyn UserStore>>;
}

/// Look up a user's subscription status, treating a missing row as inactive
pub async fn subscription_status_of(
    store: &dyn UserStore,
    user_id: Uuid,
) -> StoreResult<SubscriptionStatus> {
    Ok(store
        .find_by_id(user_id)
        .await?
        .map(|user| user.subscription_status)
        .unwrap_or_default())
}
