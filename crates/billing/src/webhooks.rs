//! Stripe webhook handling
//!
//! Keeps `users.subscription_status` in step with Stripe's view of each
//! subscription. Signature failures and malformed payloads are errors; a
//! storage failure after a valid event is logged and the event is still
//! acknowledged so Stripe does not replay a partially applied update.

use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use paychat_shared::{CheckoutUpdate, SubscriptionStatus, UserStore};

use crate::error::BillingResult;
use crate::events::{CheckoutSessionObject, SubscriptionObject, WebhookEvent, WebhookEventKind};
use crate::signature::verify_signature;

/// Map a Stripe subscription status onto the local status
pub fn map_stripe_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::Inactive,
    }
}

/// What handling an event did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Checkout completed and the user was activated
    Activated { user_id: Uuid, rows: u64 },
    /// Checkout completed without a subscription; only the customer id was kept
    CustomerLinked { user_id: Uuid, rows: u64 },
    StatusUpdated { status: SubscriptionStatus, rows: u64 },
    Canceled { rows: u64 },
    /// Recognised event that could not be attributed to a user
    Skipped { reason: String },
    /// Event type we do not act on
    Ignored { event_type: String },
    /// Store write failed; acknowledged anyway
    StoreFailed { error: String },
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    secret: String,
    store: Arc<dyn UserStore>,
}

impl WebhookHandler {
    pub fn new(secret: impl Into<String>, store: Arc<dyn UserStore>) -> Self {
        Self {
            secret: secret.into(),
            store,
        }
    }

    /// Verify the signature header and decode the event envelope
    pub fn verify_event(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookEvent> {
        self.verify_event_at(payload, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_event_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        verify_signature(payload, signature, &self.secret, now)?;
        let event: WebhookEvent = serde_json::from_slice(payload)?;
        tracing::debug!(event_id = %event.id, event_type = %event.type_, "Verified webhook event");
        Ok(event)
    }

    /// Apply a verified event to the user store
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<ReconcileOutcome> {
        tracing::info!(event_id = %event.id, event_type = %event.type_, "Processing webhook event");

        match event.kind() {
            WebhookEventKind::CheckoutSessionCompleted => {
                let session: CheckoutSessionObject = event.object()?;
                Ok(self.handle_checkout_completed(&session).await)
            }
            WebhookEventKind::SubscriptionUpdated => {
                let subscription: SubscriptionObject = event.object()?;
                Ok(self.handle_subscription_updated(&subscription).await)
            }
            WebhookEventKind::SubscriptionDeleted => {
                let subscription: SubscriptionObject = event.object()?;
                Ok(self.handle_subscription_deleted(&subscription).await)
            }
            WebhookEventKind::Other(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring unhandled event type");
                Ok(ReconcileOutcome::Ignored { event_type })
            }
        }
    }

    async fn handle_checkout_completed(&self, session: &CheckoutSessionObject) -> ReconcileOutcome {
        let Some(reference) = session.user_reference() else {
            tracing::warn!(session_id = %session.id, "Checkout session has no user reference");
            return ReconcileOutcome::Skipped {
                reason: "missing user reference".to_string(),
            };
        };

        let user_id = match Uuid::parse_str(reference) {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(
                    session_id = %session.id,
                    reference = %reference,
                    "Checkout session user reference is not a valid id"
                );
                return ReconcileOutcome::Skipped {
                    reason: "invalid user reference".to_string(),
                };
            }
        };

        let subscription_id = session.subscription_id().map(str::to_string);
        // An active user always has a subscription id, so no id means no activation
        let activating = subscription_id.is_some();
        let update = CheckoutUpdate {
            customer_id: session.customer_id().map(str::to_string),
            subscription_id,
            status: activating.then_some(SubscriptionStatus::Active),
        };

        if update.is_empty() {
            tracing::warn!(
                session_id = %session.id,
                user_id = %user_id,
                "Checkout session carried neither customer nor subscription"
            );
            return ReconcileOutcome::Skipped {
                reason: "nothing to record".to_string(),
            };
        }

        if !activating {
            tracing::warn!(
                session_id = %session.id,
                user_id = %user_id,
                "Checkout completed without a subscription; not activating"
            );
        }

        match self.store.record_checkout(user_id, &update).await {
            Ok(rows) => {
                if rows == 0 {
                    tracing::warn!(user_id = %user_id, "Checkout completed for unknown user");
                }
                tracing::info!(
                    user_id = %user_id,
                    subscription_id = ?update.subscription_id,
                    customer_id = ?update.customer_id,
                    rows = rows,
                    "Recorded completed checkout"
                );
                if activating {
                    ReconcileOutcome::Activated { user_id, rows }
                } else {
                    ReconcileOutcome::CustomerLinked { user_id, rows }
                }
            }
            Err(e) => store_failed("checkout.session.completed", e),
        }
    }

    async fn handle_subscription_updated(&self, subscription: &SubscriptionObject) -> ReconcileOutcome {
        let status = map_stripe_status(&subscription.status);
        let result = self
            .store
            .set_status_by_subscription(&subscription.id, status)
            .await;

        match result {
            Ok(rows) => {
                note_row_count(&subscription.id, rows);
                tracing::info!(
                    subscription_id = %subscription.id,
                    stripe_status = %subscription.status,
                    status = %status,
                    rows = rows,
                    "Updated subscription status"
                );
                ReconcileOutcome::StatusUpdated { status, rows }
            }
            Err(e) => store_failed("customer.subscription.updated", e),
        }
    }

    async fn handle_subscription_deleted(&self, subscription: &SubscriptionObject) -> ReconcileOutcome {
        match self.store.cancel_subscription(&subscription.id).await {
            Ok(rows) => {
                note_row_count(&subscription.id, rows);
                tracing::info!(
                    subscription_id = %subscription.id,
                    rows = rows,
                    "Subscription canceled"
                );
                ReconcileOutcome::Canceled { rows }
            }
            Err(e) => store_failed("customer.subscription.deleted", e),
        }
    }
}

fn note_row_count(subscription_id: &str, rows: u64) {
    match rows {
        0 => tracing::warn!(subscription_id = %subscription_id, "No user holds this subscription"),
        1 => {}
        n => tracing::warn!(
            subscription_id = %subscription_id,
            rows = n,
            "Subscription id matched more than one user; all were updated"
        ),
    }
}

fn store_failed(event_type: &str, error: impl std::fmt::Display) -> ReconcileOutcome {
    tracing::error!(
        event_type = %event_type,
        error = %error,
        "Failed to apply webhook event to user store"
    );
    ReconcileOutcome::StoreFailed {
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_table() {
        let cases = [
            ("active", SubscriptionStatus::Active),
            ("past_due", SubscriptionStatus::PastDue),
            ("unpaid", SubscriptionStatus::PastDue),
            ("canceled", SubscriptionStatus::Canceled),
            ("incomplete_expired", SubscriptionStatus::Canceled),
            ("trialing", SubscriptionStatus::Inactive),
            ("incomplete", SubscriptionStatus::Inactive),
            ("paused", SubscriptionStatus::Inactive),
            ("", SubscriptionStatus::Inactive),
            ("ACTIVE", SubscriptionStatus::Inactive),
        ];
        for (stripe_status, expected) in cases {
            assert_eq!(
                map_stripe_status(stripe_status),
                expected,
                "stripe status {:?}",
                stripe_status
            );
        }
    }

    #[test]
    fn test_mapping_is_stable() {
        for status in ["active", "past_due", "canceled", "whatever"] {
            assert_eq!(map_stripe_status(status), map_stripe_status(status));
        }
    }
}
