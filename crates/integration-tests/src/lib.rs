//! Integration tests for the shopping list merge service.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory store tests
//! cargo test -p shopping-lists-integration-tests
//!
//! # Including the PostgreSQL tests
//! DATABASE_URL=postgres://localhost/lists_test \
//!     cargo test -p shopping-lists-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `merge_pending` - Merging unpurchased items, with and without purge
//! - `merge_lists` - Merging every item, aggregation across lists
//! - `concurrency` - Competing merges and timeouts
//! - `postgres` - The same flows against a real database
//!
//! This library holds the shared fixtures.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use chrono::NaiveDate;

use shopping_lists::{MemoryStore, MergeService};
use shopping_lists_core::{LineItem, ListMetadata, ProductId, Quantity, ShoppingListId, User};

/// Generous timeout for tests that aren't about timeouts.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A fixed calendar date.
#[must_use]
pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
}

/// Metadata for a merged list.
#[must_use]
pub fn metadata(name: &str) -> ListMetadata {
    ListMetadata::new(name, date())
}

/// A whole-unit quantity.
#[must_use]
pub fn units(n: i64) -> Quantity {
    Quantity::from_units(n).unwrap()
}

/// A merge service over `store` with [`TEST_TIMEOUT`].
#[must_use]
pub fn service(store: &MemoryStore) -> MergeService<MemoryStore> {
    MergeService::new(store.clone(), TEST_TIMEOUT)
}

/// One user owning two lists of three items each.
pub struct Fixture {
    /// The backing store.
    pub store: MemoryStore,
    /// Owner of both lists.
    pub user: User,
    /// The two source lists.
    pub lists: [ShoppingListId; 2],
    /// All six items; the first three belong to `lists[0]`.
    pub items: Vec<LineItem>,
}

impl Fixture {
    /// Six items over two lists, each with a distinct product and a quantity
    /// of `index + 1`. Items at even indexes are purchased.
    #[must_use]
    pub fn two_lists() -> Self {
        Self::build(|i| ProductId::new(100 + i32::try_from(i).unwrap()))
    }

    /// Like [`two_lists`](Self::two_lists), but item 4 (on the second list)
    /// has the same product as item 1 (on the first list).
    #[must_use]
    pub fn two_lists_with_shared_product() -> Self {
        Self::build(|i| {
            let i = if i == 4 { 1 } else { i };
            ProductId::new(100 + i32::try_from(i).unwrap())
        })
    }

    fn build(product: impl Fn(usize) -> ProductId) -> Self {
        let store = MemoryStore::new();
        let user = store.add_user("Ada");
        let lists = [
            store.add_list(user.id, metadata("Groceries")),
            store.add_list(user.id, metadata("Hardware")),
        ];

        let items = (0..6)
            .map(|i| {
                let list = lists[i / 3];
                let quantity = units(i64::try_from(i).unwrap() + 1);
                store
                    .add_item(list, product(i), quantity, i % 2 == 0)
                    .unwrap()
            })
            .collect();

        Self {
            store,
            user,
            lists,
            items,
        }
    }

    /// Items not yet purchased.
    #[must_use]
    pub fn pending(&self) -> Vec<&LineItem> {
        self.items.iter().filter(|item| !item.purchased).collect()
    }

    /// Items already purchased.
    #[must_use]
    pub fn purchased(&self) -> Vec<&LineItem> {
        self.items.iter().filter(|item| item.purchased).collect()
    }
}
