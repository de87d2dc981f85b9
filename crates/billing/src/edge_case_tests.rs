// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the webhook reconciler
//!
//! Drives signed payloads through `WebhookHandler` against the in-memory
//! store:
//! - Signature rejection leaves storage untouched
//! - Replayed events converge on the same state
//! - Unattributable and unknown events are acknowledged as no-ops

#[cfg(test)]
mod webhook_tests {
    use crate::error::BillingError;
    use crate::signature::compute_signature;
    use crate::webhooks::{ReconcileOutcome, WebhookHandler};
    use paychat_shared::{MemoryUserStore, SubscriptionStatus, UserRecord, UserStore};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    const SECRET: &str = "whsec_edge_case_secret";
    const NOW: i64 = 1_735_689_600;

    fn handler(store: &MemoryUserStore) -> WebhookHandler {
        WebhookHandler::new(SECRET, Arc::new(store.clone()))
    }

    fn signed(body: &serde_json::Value) -> (Vec<u8>, String) {
        let payload = serde_json::to_vec(body).unwrap();
        let sig = compute_signature(SECRET, NOW, &payload).unwrap();
        (payload, format!("t={},v1={}", NOW, sig))
    }

    fn event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "evt_test",
            "type": event_type,
            "created": NOW,
            "data": { "object": object }
        })
    }

    async fn deliver(handler: &WebhookHandler, body: serde_json::Value) -> ReconcileOutcome {
        let (payload, header) = signed(&body);
        let event = handler.verify_event_at(&payload, &header, NOW).unwrap();
        handler.handle_event(&event).await.unwrap()
    }

    async fn subscribed_user(store: &MemoryUserStore, sub_id: &str) -> Uuid {
        let mut user = UserRecord::new(Uuid::new_v4(), Some("sub@example.com".to_string()));
        user.stripe_customer_id = Some("cus_1".to_string());
        user.stripe_subscription_id = Some(sub_id.to_string());
        user.subscription_status = SubscriptionStatus::Active;
        store.insert(user.clone()).await;
        user.id
    }

    // =========================================================================
    // Invalid signature: rejected before any store call
    // =========================================================================
    #[tokio::test]
    async fn test_invalid_signature_mutates_nothing() {
        let store = MemoryUserStore::new();
        let user_id = subscribed_user(&store, "sub_1").await;
        let handler = handler(&store);

        let body = event(
            "customer.subscription.deleted",
            json!({ "id": "sub_1", "status": "canceled" }),
        );
        let payload = serde_json::to_vec(&body).unwrap();
        let header = format!("t={},v1={}", NOW, "0".repeat(64));

        let result = handler.verify_event_at(&payload, &header, NOW);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(
            store.get(user_id).await.unwrap().subscription_status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_valid_signature_with_non_json_body_is_payload_error() {
        let store = MemoryUserStore::new();
        let handler = handler(&store);
        let payload = b"not json".to_vec();
        let sig = compute_signature(SECRET, NOW, &payload).unwrap();

        let result = handler.verify_event_at(&payload, &format!("t={},v1={}", NOW, sig), NOW);
        assert!(matches!(result, Err(BillingError::WebhookPayload(_))));
    }

    // =========================================================================
    // checkout.session.completed
    // =========================================================================
    #[tokio::test]
    async fn test_checkout_completed_activates_user() {
        let store = MemoryUserStore::new();
        let user = UserRecord::new(Uuid::new_v4(), None);
        store.insert(user.clone()).await;

        let outcome = deliver(
            &handler(&store),
            event(
                "checkout.session.completed",
                json!({
                    "id": "cs_1",
                    "client_reference_id": user.id.to_string(),
                    "customer": "cus_42",
                    "subscription": "sub_42"
                }),
            ),
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Activated { user_id: user.id, rows: 1 });
        let stored = store.get(user.id).await.unwrap();
        assert_eq!(stored.subscription_status, SubscriptionStatus::Active);
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_42"));
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_42"));
    }

    #[tokio::test]
    async fn test_checkout_completed_resolves_user_from_metadata() {
        let store = MemoryUserStore::new();
        let user = UserRecord::new(Uuid::new_v4(), None);
        store.insert(user.clone()).await;

        let outcome = deliver(
            &handler(&store),
            event(
                "checkout.session.completed",
                json!({
                    "id": "cs_1",
                    "client_reference_id": null,
                    "metadata": { "supabase_user_id": user.id.to_string() },
                    "customer": { "id": "cus_7" },
                    "subscription": { "id": "sub_7" }
                }),
            ),
        )
        .await;

        assert!(matches!(outcome, ReconcileOutcome::Activated { .. }));
        assert_eq!(
            store.get(user.id).await.unwrap().stripe_subscription_id.as_deref(),
            Some("sub_7")
        );
    }

    #[tokio::test]
    async fn test_checkout_completed_without_user_is_acknowledged_noop() {
        let store = MemoryUserStore::new();
        let outcome = deliver(
            &handler(&store),
            event(
                "checkout.session.completed",
                json!({ "id": "cs_1", "customer": "cus_1", "subscription": "sub_1" }),
            ),
        )
        .await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_completed_with_malformed_user_id_is_skipped() {
        let store = MemoryUserStore::new();
        let outcome = deliver(
            &handler(&store),
            event(
                "checkout.session.completed",
                json!({ "id": "cs_1", "client_reference_id": "not-a-uuid", "subscription": "sub_1" }),
            ),
        )
        .await;

        assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_completed_without_subscription_does_not_activate() {
        let store = MemoryUserStore::new();
        let user = UserRecord::new(Uuid::new_v4(), None);
        store.insert(user.clone()).await;

        let outcome = deliver(
            &handler(&store),
            event(
                "checkout.session.completed",
                json!({ "id": "cs_1", "client_reference_id": user.id.to_string(), "customer": "cus_3" }),
            ),
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::CustomerLinked { user_id: user.id, rows: 1 });
        let stored = store.get(user.id).await.unwrap();
        assert_eq!(stored.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_3"));
    }

    // =========================================================================
    // customer.subscription.updated
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_updated_is_idempotent() {
        let store = MemoryUserStore::new();
        let user_id = subscribed_user(&store, "sub_9").await;
        let handler = handler(&store);
        let body = event(
            "customer.subscription.updated",
            json!({ "id": "sub_9", "status": "past_due" }),
        );

        let first = deliver(&handler, body.clone()).await;
        let after_first = store.get(user_id).await.unwrap();
        let second = deliver(&handler, body).await;
        let after_second = store.get(user_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(after_first.subscription_status, after_second.subscription_status);
        assert_eq!(after_first.stripe_subscription_id, after_second.stripe_subscription_id);
        assert_eq!(after_first.stripe_customer_id, after_second.stripe_customer_id);
    }

    #[tokio::test]
    async fn test_subscription_updated_for_unknown_subscription() {
        let store = MemoryUserStore::new();
        subscribed_user(&store, "sub_known").await;

        let outcome = deliver(
            &handler(&store),
            event(
                "customer.subscription.updated",
                json!({ "id": "sub_unknown", "status": "active" }),
            ),
        )
        .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::StatusUpdated { status: SubscriptionStatus::Active, rows: 0 }
        );
    }

    #[tokio::test]
    async fn test_duplicate_subscription_ids_all_updated() {
        let store = MemoryUserStore::new();
        let a = subscribed_user(&store, "sub_dup").await;
        let b = subscribed_user(&store, "sub_dup").await;

        let outcome = deliver(
            &handler(&store),
            event(
                "customer.subscription.updated",
                json!({ "id": "sub_dup", "status": "unpaid" }),
            ),
        )
        .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::StatusUpdated { status: SubscriptionStatus::PastDue, rows: 2 }
        );
        for id in [a, b] {
            assert_eq!(
                store.get(id).await.unwrap().subscription_status,
                SubscriptionStatus::PastDue
            );
        }
    }

    #[tokio::test]
    async fn test_subscription_object_missing_status_is_payload_error() {
        let store = MemoryUserStore::new();
        let handler = handler(&store);
        let (payload, header) = signed(&event("customer.subscription.updated", json!({ "id": "sub_1" })));
        let event = handler.verify_event_at(&payload, &header, NOW).unwrap();

        let result = handler.handle_event(&event).await;
        assert!(matches!(result, Err(BillingError::WebhookPayload(_))));
        assert_eq!(store.mutation_count(), 0);
    }

    // =========================================================================
    // customer.subscription.deleted
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_deleted_cancels_and_clears_id() {
        let store = MemoryUserStore::new();
        let user_id = subscribed_user(&store, "sub_del").await;

        let outcome = deliver(
            &handler(&store),
            event(
                "customer.subscription.deleted",
                json!({ "id": "sub_del", "status": "canceled" }),
            ),
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Canceled { rows: 1 });
        let stored = store.get(user_id).await.unwrap();
        assert_eq!(stored.subscription_status, SubscriptionStatus::Canceled);
        assert_eq!(stored.stripe_subscription_id, None);
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_late_update_after_delete_finds_nothing() {
        let store = MemoryUserStore::new();
        let user_id = subscribed_user(&store, "sub_late").await;
        let handler = handler(&store);

        deliver(
            &handler,
            event("customer.subscription.deleted", json!({ "id": "sub_late", "status": "canceled" })),
        )
        .await;
        let outcome = deliver(
            &handler,
            event("customer.subscription.updated", json!({ "id": "sub_late", "status": "active" })),
        )
        .await;

        assert!(matches!(outcome, ReconcileOutcome::StatusUpdated { rows: 0, .. }));
        assert_eq!(
            store.get(user_id).await.unwrap().subscription_status,
            SubscriptionStatus::Canceled
        );
    }

    // =========================================================================
    // Unknown event types
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_event_type_is_noop() {
        let store = MemoryUserStore::new();
        subscribed_user(&store, "sub_1").await;

        let outcome = deliver(
            &handler(&store),
            event("invoice.payment_succeeded", json!({ "id": "in_1" })),
        )
        .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored { event_type: "invoice.payment_succeeded".to_string() }
        );
        assert_eq!(store.mutation_count(), 0);
    }

    // =========================================================================
    // Store failures are acknowledged
    // =========================================================================
    struct FailingStore;

    #[async_trait::async_trait]
    impl UserStore for FailingStore {
        async fn find_by_id(&self, _: Uuid) -> paychat_shared::StoreResult<Option<UserRecord>> {
            Ok(None)
        }
        async fn record_checkout(
            &self,
            _: Uuid,
            _: &paychat_shared::CheckoutUpdate,
        ) -> paychat_shared::StoreResult<u64> {
            Err(paychat_shared::StoreError::Decode("boom".to_string()))
        }
        async fn set_status_by_subscription(
            &self,
            _: &str,
            _: SubscriptionStatus,
        ) -> paychat_shared::StoreResult<u64> {
            Err(paychat_shared::StoreError::Decode("boom".to_string()))
        }
        async fn cancel_subscription(&self, _: &str) -> paychat_shared::StoreResult<u64> {
            Err(paychat_shared::StoreError::Decode("boom".to_string()))
        }
        async fn set_customer_id(&self, _: Uuid, _: &str) -> paychat_shared::StoreResult<u64> {
            Err(paychat_shared::StoreError::Decode("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_acknowledged() {
        let handler = WebhookHandler::new(SECRET, Arc::new(FailingStore));
        let outcome = deliver(
            &handler,
            event("customer.subscription.deleted", json!({ "id": "sub_1", "status": "canceled" })),
        )
        .await;

        assert!(matches!(outcome, ReconcileOutcome::StoreFailed { .. }));
    }
}
