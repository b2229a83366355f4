//! SQLite directory repository implementation.
//!
//! Read-only adapter over the `users`, `merchants`, and `orders` tables.

use chowline_core::repository::directory::DirectoryRepository;
use chowline_types::directory::{Merchant, Order, User};
use chowline_types::error::RepositoryError;
use chowline_types::role::Role;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `DirectoryRepository`.
pub struct SqliteDirectoryRepository {
    pool: DatabasePool,
}

impl SqliteDirectoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct UserRow {
    id: i64,
    username: String,
    nickname: Option<String>,
    avatar_url: Option<String>,
    role: Option<String>,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            nickname: row.try_get("nickname")?,
            avatar_url: row.try_get("avatar_url")?,
            role: row.try_get("role")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        let role: Option<Role> = self
            .role
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(str::parse)
            .transpose()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(User {
            id: self.id,
            username: self.username,
            nickname: self.nickname,
            avatar_url: self.avatar_url,
            role,
        })
    }
}

struct OrderRow {
    id: i64,
    order_no: String,
    status: Option<String>,
    remark: Option<String>,
    merchant_id: Option<i64>,
    customer_id: Option<i64>,
    courier_id: Option<i64>,
    created_at: Option<String>,
}

impl OrderRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_no: row.try_get("order_no")?,
            status: row.try_get("status")?,
            remark: row.try_get("remark")?,
            merchant_id: row.try_get("merchant_id")?,
            customer_id: row.try_get("customer_id")?,
            courier_id: row.try_get("courier_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_order(self) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            order_no: self.order_no,
            status: self.status,
            remark: self.remark,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            courier_id: self.courier_id,
            created_at: self.created_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn merchant_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Merchant, RepositoryError> {
    Ok(Merchant {
        id: row.try_get("id").map_err(query_error)?,
        user_id: row.try_get("user_id").map_err(query_error)?,
        name: row.try_get("name").map_err(query_error)?,
    })
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

impl SqliteDirectoryRepository {
    async fn fetch_merchant(&self, sql: &str, key: i64) -> Result<Option<Merchant>, RepositoryError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(merchant_from_row).transpose()
    }

    async fn fetch_orders(&self, column: &str, key: i64) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!("SELECT * FROM orders WHERE {column} = ? ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql)
            .bind(key)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(OrderRow::from_row(row).map_err(query_error)?.into_order()?);
        }
        Ok(orders)
    }
}

impl DirectoryRepository for SqliteDirectoryRepository {
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(UserRow::from_row(&row).map_err(query_error)?.into_user()?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(UserRow::from_row(&row).map_err(query_error)?.into_user()?)),
            None => Ok(None),
        }
    }

    async fn get_merchant_by_user_id(
        &self,
        user_id: i64,
    ) -> Result<Option<Merchant>, RepositoryError> {
        self.fetch_merchant("SELECT * FROM merchants WHERE user_id = ?", user_id)
            .await
    }

    async fn get_merchant_by_id(
        &self,
        merchant_id: i64,
    ) -> Result<Option<Merchant>, RepositoryError> {
        self.fetch_merchant("SELECT * FROM merchants WHERE id = ?", merchant_id)
            .await
    }

    async fn get_owning_user_id(&self, merchant_id: i64) -> Result<Option<i64>, RepositoryError> {
        Ok(self
            .get_merchant_by_id(merchant_id)
            .await?
            .map(|m| m.user_id))
    }

    async fn get_order_by_id(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(OrderRow::from_row(&row).map_err(query_error)?.into_order()?)),
            None => Ok(None),
        }
    }

    async fn list_orders_by_merchant(&self, merchant_id: i64) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("merchant_id", merchant_id).await
    }

    async fn list_orders_by_customer(&self, user_id: i64) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("customer_id", user_id).await
    }

    async fn list_orders_by_courier(&self, user_id: i64) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("courier_id", user_id).await
    }
}
