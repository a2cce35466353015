//! Persistence boundary for the merge service.
//!
//! A [`ShoppingListStore`] hands out explicit transactional scopes
//! ([`StoreTransaction`]). Every read and write of a merge goes through one
//! scope, which is then either committed or rolled back as a unit. Dropping a
//! scope without committing rolls it back.
//!
//! # Implementations
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx, one `REPEATABLE READ` transaction per scope
//! - [`MemoryStore`] - in-process fake with optimistic conflict detection, used in tests

pub mod memory;
pub mod postgres;

use std::future::Future;

use thiserror::Error;

use shopping_lists_core::{
    LineItem, LineItemId, NewShoppingList, ShoppingList, ShoppingListId, User, UserId,
};

pub use memory::{MemoryStore, MemoryTransaction, Operation};
pub use postgres::{PgStore, PgTransaction, create_pool};

/// SQLSTATE for `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database transport or query error from sqlx.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A concurrent transaction changed data this scope depends on.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

impl StoreError {
    /// Returns `true` if the failure was caused by a concurrent writer.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
            && (code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
        {
            return Self::Conflict(db_err.message().to_owned());
        }
        Self::Database(err)
    }
}

/// A source of transactional scopes over shopping lists.
pub trait ShoppingListStore: Send + Sync {
    /// The scope type handed out by [`begin`](Self::begin).
    type Transaction: StoreTransaction;

    /// Open a new transactional scope.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the scope cannot be opened.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StoreError>> + Send;
}

/// One unit of work against the store.
///
/// Nothing written through a scope is visible to other scopes until
/// [`commit`](Self::commit) succeeds.
pub trait StoreTransaction: Send {
    /// Fetch a user by ID.
    fn fetch_user(
        &mut self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Fetch a shopping list with its items, optionally only if `owner` owns it.
    fn fetch_list(
        &mut self,
        id: ShoppingListId,
        owner: Option<UserId>,
    ) -> impl Future<Output = Result<Option<ShoppingList>, StoreError>> + Send;

    /// Fetch the items of `list_ids`, optionally filtered on `purchased`.
    ///
    /// Items come back grouped by list in the order of `list_ids`, and in list
    /// order within each group.
    fn fetch_items(
        &mut self,
        list_ids: &[ShoppingListId],
        purchased: Option<bool>,
    ) -> impl Future<Output = Result<Vec<LineItem>, StoreError>> + Send;

    /// Insert a new list together with its items.
    fn save_list(
        &mut self,
        list: NewShoppingList,
    ) -> impl Future<Output = Result<ShoppingList, StoreError>> + Send;

    /// Delete items by ID.
    ///
    /// Fails with `StoreError::Conflict` if any of the items is already gone.
    fn delete_items(
        &mut self,
        ids: &[LineItemId],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Make every write of this scope visible.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every write of this scope.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_sqlx_errors_are_not_conflicts() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflict_display() {
        let err = StoreError::Conflict("line item 4 is gone".to_owned());
        assert_eq!(err.to_string(), "concurrent modification: line item 4 is gone");
        assert!(err.is_conflict());
    }
}
