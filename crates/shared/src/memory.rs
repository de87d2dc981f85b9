//! In-memory user store for tests and local development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;
use crate::users::{CheckoutUpdate, StoreResult, UserRecord, UserStore, UserStores};

/// Thread-safe map of user records.
///
/// Cloning shares the underlying map, so a test can keep a handle while the
/// application state owns another.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, UserRecord>>>,
    mutations: Arc<AtomicUsize>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn get(&self, user_id: Uuid) -> Option<UserRecord> {
        self.users.read().await.get(&user_id).cloned()
    }

    /// Number of update calls that reached the store, whether or not they matched a row
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn note_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    async fn update_where<P, F>(&self, predicate: P, mut apply: F) -> u64
    where
        P: Fn(&UserRecord) -> bool,
        F: FnMut(&mut UserRecord),
    {
        self.note_mutation();
        let mut users = self.users.write().await;
        let mut touched = 0;
        for user in users.values_mut().filter(|u| predicate(&**u)) {
            apply(&mut *user);
            user.updated_at = OffsetDateTime::now_utc();
            touched += 1;
        }
        touched
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.get(user_id).await)
    }

    async fn record_checkout(&self, user_id: Uuid, update: &CheckoutUpdate) -> StoreResult<u64> {
        Ok(self
            .update_where(
                |u| u.id == user_id,
                |u| {
                    if let Some(customer_id) = &update.customer_id {
                        u.stripe_customer_id = Some(customer_id.clone());
                    }
                    if let Some(subscription_id) = &update.subscription_id {
                        u.stripe_subscription_id = Some(subscription_id.clone());
                    }
                    if let Some(status) = update.status {
                        u.subscription_status = status;
                    }
                },
            )
            .await)
    }

    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<u64> {
        Ok(self
            .update_where(
                |u| u.stripe_subscription_id.as_deref() == Some(subscription_id),
                |u| u.subscription_status = status,
            )
            .await)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> StoreResult<u64> {
        Ok(self
            .update_where(
                |u| u.stripe_subscription_id.as_deref() == Some(subscription_id),
                |u| {
                    u.subscription_status = SubscriptionStatus::Canceled;
                    u.stripe_subscription_id = None;
                },
            )
            .await)
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> StoreResult<u64> {
        Ok(self
            .update_where(
                |u| u.id == user_id,
                |u| u.stripe_customer_id = Some(customer_id.to_string()),
            )
            .await)
    }
}

impl UserStores for MemoryUserStore {
    fn scoped(&self, _access_token: &str) -> Arc<dyn UserStore> {
        Arc::new(self.clone())
    }

    fn service(&self) -> Option<Arc<dyn UserStore>> {
        Some(Arc::new(self.clone()))
    }
}
