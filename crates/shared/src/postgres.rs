//! Direct Postgres backend (sqlx)

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;
use crate::users::{CheckoutUpdate, StoreResult, UserRecord, UserStore, UserStores};

/// Database row type for user lookup
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: Option<String>,
    subscription_status: Option<String>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            subscription_status: SubscriptionStatus::from_db(row.subscription_status.as_deref()),
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            updated_at: row.updated_at,
        }
    }
}

/// User store backed by a direct Postgres connection.
///
/// The connection is trusted, so the same store serves both user-scoped
/// reads and the webhook's privileged writes.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, subscription_status, stripe_customer_id,
                   stripe_subscription_id, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn record_checkout(&self, user_id: Uuid, update: &CheckoutUpdate) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET stripe_customer_id = COALESCE($2, stripe_customer_id),
                stripe_subscription_id = COALESCE($3, stripe_subscription_id),
                subscription_status = COALESCE($4, subscription_status),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.customer_id.as_deref())
        .bind(update.subscription_id.as_deref())
        .bind(update.status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = $2, updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = 'canceled',
                stripe_subscription_id = NULL,
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE users SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

impl UserStores for PgUserStore {
    fn scoped(&self, _access_token: &str) -> Arc<dyn UserStore> {
        Arc::new(self.clone())
    }

    fn service(&self) -> Option<Arc<dyn UserStore>> {
        Some(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Setup test database pool
    async fn setup_test_store() -> PgUserStore {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/test".to_string());
        let pool = crate::db::create_pool(&database_url)
            .await
            .expect("Failed to connect to test database");
        crate::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        PgUserStore::new(pool)
    }

    #[test]
    fn test_row_with_unknown_status_decodes_inactive() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: None,
            subscription_status: Some("trialing".to_string()),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            updated_at: OffsetDateTime::now_utc(),
        };
        let record = UserRecord::from(row);
        assert_eq!(record.subscription_status, SubscriptionStatus::Inactive);
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database at DATABASE_URL"]
    async fn test_cancel_clears_subscription_id() {
        let store = setup_test_store().await;
        let user_id = Uuid::new_v4();
        let sub_id = format!("sub_{}", user_id.simple());

        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
            .bind(user_id)
            .bind("pg-test@example.com")
            .execute(store.pool())
            .await
            .unwrap();

        let update = CheckoutUpdate {
            customer_id: Some("cus_pg".to_string()),
            subscription_id: Some(sub_id.clone()),
            status: Some(SubscriptionStatus::Active),
        };
        assert_eq!(store.record_checkout(user_id, &update).await.unwrap(), 1);
        assert_eq!(store.cancel_subscription(&sub_id).await.unwrap(), 1);

        let user = store.find_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.subscription_status, SubscriptionStatus::Canceled);
        assert_eq!(user.stripe_subscription_id, None);
        assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_pg"));

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(store.pool())
            .await
            .ok();
    }
}
