//! Stripe webhook event payloads
//!
//! Only the handful of fields the reconciler reads are modelled. Decoding
//! into these lean types instead of the full generated Stripe objects keeps
//! the handler tolerant of API-version drift in fields we never look at.

use serde::Deserialize;
use std::collections::HashMap;

/// Metadata key carrying our user id on checkout sessions and subscriptions
pub const USER_ID_METADATA_KEY: &str = "supabase_user_id";

/// Outer event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Event types the reconciler acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    CheckoutSessionCompleted,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Other(String),
}

impl WebhookEventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => WebhookEventKind::CheckoutSessionCompleted,
            "customer.subscription.updated" => WebhookEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => WebhookEventKind::SubscriptionDeleted,
            other => WebhookEventKind::Other(other.to_string()),
        }
    }
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::parse(&self.type_)
    }

    /// Decode `data.object` as the given payload type
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data.object)
    }
}

/// A reference Stripe may send either as a bare id or as an expanded object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExpandableRef {
    Id(String),
    Object { id: String },
}

impl ExpandableRef {
    pub fn id(&self) -> &str {
        match self {
            ExpandableRef::Id(id) => id,
            ExpandableRef::Object { id } => id,
        }
    }
}

/// `checkout.session` object
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub customer: Option<ExpandableRef>,
    #[serde(default)]
    pub subscription: Option<ExpandableRef>,
}

impl CheckoutSessionObject {
    /// Explicit reference first, then metadata
    pub fn user_reference(&self) -> Option<&str> {
        self.client_reference_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.get(USER_ID_METADATA_KEY))
                    .map(String::as_str)
                    .filter(|id| !id.is_empty())
            })
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(ExpandableRef::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(ExpandableRef::id)
    }
}

/// `subscription` object
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
}
