//! Supabase PostgREST backend
//!
//! Talks to `{SUPABASE_URL}/rest/v1/users`. Reads made on behalf of a user
//! carry that user's access token so row-level security applies; the
//! webhook's writes use the service-role key.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;
use crate::users::{CheckoutUpdate, StoreError, StoreResult, UserRecord, UserStore, UserStores};

const USER_COLUMNS: &str =
    "id,email,subscription_status,stripe_customer_id,stripe_subscription_id,updated_at";

/// Row shape returned by PostgREST
#[derive(Debug, Deserialize)]
struct RestUserRow {
    id: Uuid,
    email: Option<String>,
    subscription_status: Option<String>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    updated_at: Option<String>,
}

impl RestUserRow {
    fn into_record(self) -> UserRecord {
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        UserRecord {
            id: self.id,
            email: self.email,
            subscription_status: SubscriptionStatus::from_db(self.subscription_status.as_deref()),
            stripe_customer_id: self.stripe_customer_id,
            stripe_subscription_id: self.stripe_subscription_id,
            updated_at,
        }
    }
}

/// Factory for PostgREST-backed stores
#[derive(Clone)]
pub struct RestUserStores {
    http: Client,
    endpoint: String,
    anon_key: String,
    service_role_key: Option<String>,
}

impl RestUserStores {
    pub fn new(
        http: Client,
        supabase_url: &str,
        anon_key: impl Into<String>,
        service_role_key: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}/rest/v1/users", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
            service_role_key,
        }
    }
}

impl UserStores for RestUserStores {
    fn scoped(&self, access_token: &str) -> Arc<dyn UserStore> {
        Arc::new(RestUserStore {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.anon_key.clone(),
            bearer: access_token.to_string(),
        })
    }

    fn service(&self) -> Option<Arc<dyn UserStore>> {
        self.service_role_key.as_ref().map(|key| {
            Arc::new(RestUserStore {
                http: self.http.clone(),
                endpoint: self.endpoint.clone(),
                api_key: key.clone(),
                bearer: key.clone(),
            }) as Arc<dyn UserStore>
        })
    }
}

/// A PostgREST client bound to one set of credentials
#[derive(Clone)]
pub struct RestUserStore {
    http: Client,
    endpoint: String,
    api_key: String,
    bearer: String,
}

impl RestUserStore {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
    }

    /// PATCH the rows matching `filter` and return how many changed
    async fn patch(&self, filter: (&str, String), body: Value) -> StoreResult<u64> {
        let response = self
            .authorized(self.http.patch(&self.endpoint))
            .query(&[filter, ("select", "id".to_string())])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let rows: Vec<Value> = read_json(response).await?;
        Ok(rows.len() as u64)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[async_trait]
impl UserStore for RestUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        let response = self
            .authorized(self.http.get(&self.endpoint))
            .query(&[
                ("select", USER_COLUMNS.to_string()),
                ("id", format!("eq.{}", user_id)),
            ])
            .send()
            .await?;

        let rows: Vec<RestUserRow> = read_json(response).await?;
        Ok(rows.into_iter().next().map(RestUserRow::into_record))
    }

    async fn record_checkout(&self, user_id: Uuid, update: &CheckoutUpdate) -> StoreResult<u64> {
        let mut body = Map::new();
        if let Some(customer_id) = &update.customer_id {
            body.insert("stripe_customer_id".into(), json!(customer_id));
        }
        if let Some(subscription_id) = &update.subscription_id {
            body.insert("stripe_subscription_id".into(), json!(subscription_id));
        }
        if let Some(status) = update.status {
            body.insert("subscription_status".into(), json!(status.as_str()));
        }
        body.insert("updated_at".into(), json!(now_rfc3339()));

        self.patch(("id", format!("eq.{}", user_id)), Value::Object(body))
            .await
    }

    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<u64> {
        self.patch(
            ("stripe_subscription_id", format!("eq.{}", subscription_id)),
            json!({
                "subscription_status": status.as_str(),
                "updated_at": now_rfc3339(),
            }),
        )
        .await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> StoreResult<u64> {
        self.patch(
            ("stripe_subscription_id", format!("eq.{}", subscription_id)),
            json!({
                "subscription_status": SubscriptionStatus::Canceled.as_str(),
                "stripe_subscription_id": null,
                "updated_at": now_rfc3339(),
            }),
        )
        .await
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> StoreResult<u64> {
        self.patch(
            ("id", format!("eq.{}", user_id)),
            json!({
                "stripe_customer_id": customer_id,
                "updated_at": now_rfc3339(),
            }),
        )
        .await
    }
}
