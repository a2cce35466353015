//! `PostgreSQL` implementation of the shopping list store.
//!
//! # Tables
//!
//! - `app_user` - List owners
//! - `product` - Catalog products referenced by line items
//! - `shopping_list` - Lists, each with exactly one owner
//! - `shopping_list_shared_user` - Users a list is shared with
//! - `line_item` - Items, each owned by exactly one list (`ON DELETE CASCADE`)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/service/migrations/` and run via:
//! ```bash
//! cargo run -p shopping-lists-cli -- migrate
//! ```
//!
//! # Isolation
//!
//! Every scope runs at `REPEATABLE READ`. If a concurrent scope deleted an item
//! this scope read, the delete fails with a serialization error, which maps to
//! `StoreError::Conflict`.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::instrument;

use shopping_lists_core::{
    LineItem, LineItemId, NewShoppingList, ProductId, Quantity, ShoppingList, ShoppingListId,
    User, UserId,
};

use super::{ShoppingListStore, StoreError, StoreTransaction};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: ShoppingListId,
    name: String,
    date: NaiveDate,
    done: bool,
    owner_id: UserId,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: LineItemId,
    shopping_list_id: ShoppingListId,
    product_id: ProductId,
    quantity: Quantity,
    purchased: bool,
}

impl From<ItemRow> for LineItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            shopping_list_id: row.shopping_list_id,
            product: row.product_id,
            quantity: row.quantity,
            purchased: row.purchased,
        }
    }
}

impl ListRow {
    fn into_list(self, shared_users: Vec<UserId>, items: Vec<LineItem>) -> ShoppingList {
        ShoppingList {
            id: self.id,
            name: self.name,
            date: self.date,
            done: self.done,
            owner: self.owner_id,
            shared_users,
            items,
        }
    }
}

/// Shopping list store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ShoppingListStore for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        Ok(PgTransaction { tx })
    }
}

/// One `REPEATABLE READ` transaction.
///
/// sqlx rolls the transaction back if this value is dropped uncommitted.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl StoreTransaction for PgTransaction {
    #[instrument(skip(self))]
    async fn fetch_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name
            FROM app_user
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            name: r.name,
        }))
    }

    #[instrument(skip(self))]
    async fn fetch_list(
        &mut self,
        id: ShoppingListId,
        owner: Option<UserId>,
    ) -> Result<Option<ShoppingList>, StoreError> {
        let row = sqlx::query_as::<_, ListRow>(
            r"
            SELECT id, name, date, done, owner_id
            FROM shopping_list
            WHERE id = $1 AND ($2::int4 IS NULL OR owner_id = $2)
            ",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let shared_users = sqlx::query_scalar::<_, UserId>(
            r"
            SELECT user_id
            FROM shopping_list_shared_user
            WHERE shopping_list_id = $1
            ORDER BY user_id
            ",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        let items = self.fetch_items(&[id], None).await?;

        Ok(Some(row.into_list(shared_users, items)))
    }

    #[instrument(skip(self))]
    async fn fetch_items(
        &mut self,
        list_ids: &[ShoppingListId],
        purchased: Option<bool>,
    ) -> Result<Vec<LineItem>, StoreError> {
        let ids: Vec<i32> = list_ids.iter().map(ShoppingListId::as_i32).collect();

        let rows = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT id, shopping_list_id, product_id, quantity, purchased
            FROM line_item
            WHERE shopping_list_id = ANY($1)
              AND ($2::boolean IS NULL OR purchased = $2)
            ORDER BY array_position($1, shopping_list_id), position, id
            ",
        )
        .bind(&ids)
        .bind(purchased)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }

    #[instrument(skip(self, list), fields(name = %list.name, items = list.items.len()))]
    async fn save_list(&mut self, list: NewShoppingList) -> Result<ShoppingList, StoreError> {
        let row = sqlx::query_as::<_, ListRow>(
            r"
            INSERT INTO shopping_list (name, date, done, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, date, done, owner_id
            ",
        )
        .bind(&list.name)
        .bind(list.date)
        .bind(list.done)
        .bind(list.owner)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut items = Vec::with_capacity(list.items.len());
        for (position, item) in list.items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                StoreError::DataCorruption(format!("list position {position} out of range"))
            })?;

            let item_row = sqlx::query_as::<_, ItemRow>(
                r"
                INSERT INTO line_item (shopping_list_id, product_id, quantity, purchased, position)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, shopping_list_id, product_id, quantity, purchased
                ",
            )
            .bind(row.id)
            .bind(item.product)
            .bind(item.quantity)
            .bind(item.purchased)
            .bind(position)
            .fetch_one(&mut *self.tx)
            .await?;

            items.push(LineItem::from(item_row));
        }

        Ok(row.into_list(Vec::new(), items))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_items(&mut self, ids: &[LineItemId]) -> Result<(), StoreError> {
        let unique: HashSet<i32> = ids.iter().map(LineItemId::as_i32).collect();
        if unique.is_empty() {
            return Ok(());
        }
        let unique: Vec<i32> = unique.into_iter().collect();

        let result = sqlx::query(
            r"
            DELETE FROM line_item
            WHERE id = ANY($1)
            ",
        )
        .bind(&unique)
        .execute(&mut *self.tx)
        .await?;

        let expected = u64::try_from(unique.len()).unwrap_or(u64::MAX);
        if result.rows_affected() != expected {
            return Err(StoreError::Conflict(format!(
                "expected to delete {expected} line items, deleted {}",
                result.rows_affected()
            )));
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
