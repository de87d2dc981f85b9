// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Paychat shared types
//!
//! Domain types used by both the API server and the billing crate:
//! the subscription status enum, the user record, and the persistence
//! seam (`UserStore`) with its Postgres, PostgREST and in-memory backends.

pub mod db;
pub mod memory;
pub mod postgres;
pub mod rest;
pub mod subscription;
pub mod users;

pub use db::{create_pool, run_migrations};
pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use rest::{RestUserStore, RestUserStores};
pub use subscription::SubscriptionStatus;
pub use users::{
    subscription_status_of, CheckoutUpdate, StoreError, StoreResult, UserRecord, UserStore,
    UserStores,
};
