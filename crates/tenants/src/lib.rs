//! Tenant records and the in-memory tenant info cache.
//!
//! Records are persisted in SQLite (`users` table). The cache mirrors the
//! fields event dispatch needs so the hot path never reads the database.

pub mod cache;
pub mod memory;
pub mod model;
pub mod sqlite;
pub mod store;

pub use {
    cache::{TenantInfo, TenantInfoCache},
    memory::InMemoryTenantStore,
    model::TenantRecord,
    sqlite::SqliteTenantStore,
    store::{StoreError, TenantStore},
};
