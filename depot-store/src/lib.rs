pub mod app_config;
pub mod database;
pub mod lookups;
pub mod order_repo;
pub mod service;

pub use app_config::Config;
pub use database::DbClient;
pub use service::OrderLifecycleService;

use depot_core::error::DomainError;

/// Collapse a storage error into the opaque `Internal` variant after
/// logging enough context to diagnose it. Business errors never pass
/// through here.
pub(crate) fn storage_failure(operation: &str, err: &sqlx::Error) -> DomainError {
    tracing::error!(error = %err, operation, "storage failure");
    DomainError::internal(format!("{operation} failed unexpectedly"))
}
