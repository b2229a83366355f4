//! Directory repository trait definition.
//!
//! Users, merchants, and orders belong to the surrounding CRUD system. The
//! chat engine only reads them, so this port is lookup-only.

use chowline_types::directory::{Merchant, Order, User};
use chowline_types::error::RepositoryError;

/// Read-only access to identity, merchant, and order records.
///
/// Implementations live in chowline-infra (e.g., `SqliteDirectoryRepository`).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait DirectoryRepository: Send + Sync {
    /// Get a user by login name.
    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Get a user by id.
    fn get_user_by_id(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Get the merchant profile owned by a user.
    fn get_merchant_by_user_id(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Merchant>, RepositoryError>> + Send;

    /// Get a merchant profile by id.
    fn get_merchant_by_id(
        &self,
        merchant_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Merchant>, RepositoryError>> + Send;

    /// Get the id of the user owning a merchant profile.
    fn get_owning_user_id(
        &self,
        merchant_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    /// Get an order by id.
    fn get_order_by_id(
        &self,
        order_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Orders placed with a merchant, newest first.
    fn list_orders_by_merchant(
        &self,
        merchant_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// Orders placed by a customer, newest first.
    fn list_orders_by_customer(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Order>, RepositoryError>> + Send;

    /// Orders assigned to a courier, newest first.
    fn list_orders_by_courier(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Order>, RepositoryError>> + Send;
}
