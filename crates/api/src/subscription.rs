//! Subscription guard
//!
//! Authoritative access check against the stored user record. The gate only
//! knows whether someone is signed in; paid features ask here.

use paychat_shared::{subscription_status_of, StoreResult, SubscriptionStatus, UserStore};

use crate::auth::AuthUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    Unsubscribed(SubscriptionStatus),
    Subscribed,
}

pub async fn check_access(store: &dyn UserStore, user: Option<&AuthUser>) -> StoreResult<Access> {
    let Some(user) = user else {
        return Ok(Access::Anonymous);
    };

    let status = subscription_status_of(store, user.id).await?;
    if status.is_active() {
        Ok(Access::Subscribed)
    } else {
        tracing::debug!(user_id = %user.id, status = %status, "User has no active subscription");
        Ok(Access::Unsubscribed(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paychat_shared::{MemoryUserStore, UserRecord};
    use uuid::Uuid;

    fn auth_user(id: Uuid) -> AuthUser {
        AuthUser { id, email: None }
    }

    #[tokio::test]
    async fn test_access_levels() {
        let store = MemoryUserStore::new();
        let mut active = UserRecord::new(Uuid::new_v4(), None);
        active.subscription_status = SubscriptionStatus::Active;
        let mut past_due = UserRecord::new(Uuid::new_v4(), None);
        past_due.subscription_status = SubscriptionStatus::PastDue;
        store.insert(active.clone()).await;
        store.insert(past_due.clone()).await;

        assert_eq!(check_access(&store, None).await.unwrap(), Access::Anonymous);
        assert_eq!(
            check_access(&store, Some(&auth_user(active.id))).await.unwrap(),
            Access::Subscribed
        );
        assert_eq!(
            check_access(&store, Some(&auth_user(past_due.id))).await.unwrap(),
            Access::Unsubscribed(SubscriptionStatus::PastDue)
        );
        assert_eq!(
            check_access(&store, Some(&auth_user(Uuid::new_v4()))).await.unwrap(),
            Access::Unsubscribed(SubscriptionStatus::Inactive)
        );
    }
}
