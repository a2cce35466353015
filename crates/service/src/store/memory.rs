//! In-memory shopping list store.
//!
//! Each scope works on a private snapshot of the committed tables taken at
//! [`begin`](ShoppingListStore::begin). Commit is optimistic: it fails with
//! `StoreError::Conflict` if an item the scope deletes, or a list the scope
//! read, was removed by another scope that committed first. Only then are the
//! scope's writes applied to the shared tables.
//!
//! The store also counts calls per [`Operation`], can fail chosen operations
//! on demand, and can delay every operation, which is what the merge tests
//! use to observe atomicity, rollback and timeouts.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;

use shopping_lists_core::{
    LineItem, LineItemId, ListMetadata, NewShoppingList, ProductId, Quantity, ShoppingList,
    ShoppingListId, User, UserId,
};

use super::{ShoppingListStore, StoreError, StoreTransaction};

/// Store operations, for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening a scope.
    Begin,
    /// `fetch_user`.
    FetchUser,
    /// `fetch_list`.
    FetchList,
    /// `fetch_items`.
    FetchItems,
    /// `save_list`.
    SaveList,
    /// `delete_items`.
    DeleteItems,
    /// Committing a scope.
    Commit,
    /// Rolling back a scope.
    Rollback,
}

#[derive(Debug, Clone)]
struct ListRecord {
    name: String,
    date: NaiveDate,
    done: bool,
    owner: UserId,
    shared_users: Vec<UserId>,
}

#[derive(Debug, Clone)]
struct ItemRecord {
    list: ShoppingListId,
    product: ProductId,
    quantity: Quantity,
    purchased: bool,
    position: usize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    lists: BTreeMap<ShoppingListId, ListRecord>,
    items: BTreeMap<LineItemId, ItemRecord>,
}

impl Tables {
    fn line_item(id: LineItemId, record: &ItemRecord) -> LineItem {
        LineItem {
            id,
            shopping_list_id: record.list,
            product: record.product,
            quantity: record.quantity,
            purchased: record.purchased,
        }
    }

    fn items_of(&self, list_ids: &[ShoppingListId], purchased: Option<bool>) -> Vec<LineItem> {
        let mut selected: Vec<(usize, usize, LineItemId, &ItemRecord)> = self
            .items
            .iter()
            .filter(|(_, item)| purchased.is_none_or(|p| item.purchased == p))
            .filter_map(|(id, item)| {
                list_ids
                    .iter()
                    .position(|list| *list == item.list)
                    .map(|rank| (rank, item.position, *id, item))
            })
            .collect();

        selected.sort_by_key(|(rank, position, id, _)| (*rank, *position, *id));

        selected
            .into_iter()
            .map(|(_, _, id, item)| Self::line_item(id, item))
            .collect()
    }

    fn shopping_list(&self, id: ShoppingListId) -> Option<ShoppingList> {
        let record = self.lists.get(&id)?;
        Some(ShoppingList {
            id,
            name: record.name.clone(),
            date: record.date,
            done: record.done,
            owner: record.owner,
            shared_users: record.shared_users.clone(),
            items: self.items_of(&[id], None),
        })
    }

    fn next_position(&self, list: ShoppingListId) -> usize {
        self.items
            .values()
            .filter(|item| item.list == list)
            .map(|item| item.position + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    next_id: i32,
    calls: HashMap<Operation, usize>,
    failures: HashSet<Operation>,
    latency: Duration,
}

impl Shared {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // Every critical section leaves the tables consistent, so a poisoned lock
    // still guards valid data.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record a call, apply injected failures, then wait out the configured latency.
async fn enter(shared: &Mutex<Shared>, op: Operation) -> Result<(), StoreError> {
    let latency = {
        let mut guard = lock(shared);
        *guard.calls.entry(op).or_default() += 1;
        if guard.failures.contains(&op) {
            return Err(StoreError::Unavailable(format!("injected failure in {op:?}")));
        }
        guard.latency
    };

    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }

    Ok(())
}

/// In-memory shopping list store.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly into the committed tables.
    pub fn add_user(&self, name: &str) -> User {
        let mut shared = lock(&self.shared);
        let user = User {
            id: UserId::new(shared.allocate_id()),
            name: name.to_owned(),
        };
        shared.tables.users.insert(user.id, user.clone());
        user
    }

    /// Insert an empty list directly into the committed tables.
    pub fn add_list(&self, owner: UserId, metadata: ListMetadata) -> ShoppingListId {
        let mut shared = lock(&self.shared);
        let id = ShoppingListId::new(shared.allocate_id());
        shared.tables.lists.insert(
            id,
            ListRecord {
                name: metadata.name,
                date: metadata.date,
                done: false,
                owner,
                shared_users: Vec::new(),
            },
        );
        id
    }

    /// Append an item to a committed list.
    ///
    /// Returns `None` if the list does not exist.
    pub fn add_item(
        &self,
        list: ShoppingListId,
        product: ProductId,
        quantity: Quantity,
        purchased: bool,
    ) -> Option<LineItem> {
        let mut shared = lock(&self.shared);
        if !shared.tables.lists.contains_key(&list) {
            return None;
        }

        let id = LineItemId::new(shared.allocate_id());
        let record = ItemRecord {
            list,
            product,
            quantity,
            purchased,
            position: shared.tables.next_position(list),
        };
        let item = Tables::line_item(id, &record);
        shared.tables.items.insert(id, record);
        Some(item)
    }

    /// A committed list with its items.
    #[must_use]
    pub fn list(&self, id: ShoppingListId) -> Option<ShoppingList> {
        lock(&self.shared).tables.shopping_list(id)
    }

    /// IDs of all committed lists, ascending.
    #[must_use]
    pub fn list_ids(&self) -> Vec<ShoppingListId> {
        lock(&self.shared).tables.lists.keys().copied().collect()
    }

    /// Whether a committed item with this ID exists.
    #[must_use]
    pub fn contains_item(&self, id: LineItemId) -> bool {
        lock(&self.shared).tables.items.contains_key(&id)
    }

    /// How many times `op` has been called, including failed calls.
    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        lock(&self.shared).calls.get(&op).copied().unwrap_or(0)
    }

    /// Make every later call of `op` fail with `StoreError::Unavailable`.
    pub fn fail_on(&self, op: Operation) {
        lock(&self.shared).failures.insert(op);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.shared).failures.clear();
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.shared).latency = latency;
    }
}

impl ShoppingListStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        enter(&self.shared, Operation::Begin).await?;

        let snapshot = lock(&self.shared).tables.clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            working: snapshot,
            read_lists: BTreeSet::new(),
            created_lists: Vec::new(),
            deleted_items: BTreeSet::new(),
        })
    }
}

/// A scope over a [`MemoryStore`].
///
/// Dropping it uncommitted discards the snapshot and every write made to it.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    working: Tables,
    read_lists: BTreeSet<ShoppingListId>,
    created_lists: Vec<ShoppingListId>,
    deleted_items: BTreeSet<LineItemId>,
}

impl StoreTransaction for MemoryTransaction {
    async fn fetch_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        enter(&self.shared, Operation::FetchUser).await?;
        Ok(self.working.users.get(&id).cloned())
    }

    async fn fetch_list(
        &mut self,
        id: ShoppingListId,
        owner: Option<UserId>,
    ) -> Result<Option<ShoppingList>, StoreError> {
        enter(&self.shared, Operation::FetchList).await?;

        let list = self
            .working
            .shopping_list(id)
            .filter(|list| owner.is_none_or(|owner| list.owner == owner));
        if list.is_some() {
            self.read_lists.insert(id);
        }
        Ok(list)
    }

    async fn fetch_items(
        &mut self,
        list_ids: &[ShoppingListId],
        purchased: Option<bool>,
    ) -> Result<Vec<LineItem>, StoreError> {
        enter(&self.shared, Operation::FetchItems).await?;
        Ok(self.working.items_of(list_ids, purchased))
    }

    async fn save_list(&mut self, list: NewShoppingList) -> Result<ShoppingList, StoreError> {
        enter(&self.shared, Operation::SaveList).await?;

        let (list_id, item_ids) = {
            let mut shared = lock(&self.shared);
            let list_id = ShoppingListId::new(shared.allocate_id());
            let item_ids: Vec<LineItemId> = list
                .items
                .iter()
                .map(|_| LineItemId::new(shared.allocate_id()))
                .collect();
            (list_id, item_ids)
        };

        self.working.lists.insert(
            list_id,
            ListRecord {
                name: list.name,
                date: list.date,
                done: list.done,
                owner: list.owner,
                shared_users: Vec::new(),
            },
        );
        for (position, (id, item)) in item_ids.into_iter().zip(list.items).enumerate() {
            self.working.items.insert(
                id,
                ItemRecord {
                    list: list_id,
                    product: item.product,
                    quantity: item.quantity,
                    purchased: item.purchased,
                    position,
                },
            );
        }
        self.created_lists.push(list_id);

        self.working.shopping_list(list_id).ok_or_else(|| {
            StoreError::DataCorruption(format!("shopping list {list_id} vanished after insert"))
        })
    }

    async fn delete_items(&mut self, ids: &[LineItemId]) -> Result<(), StoreError> {
        enter(&self.shared, Operation::DeleteItems).await?;

        if let Some(missing) = ids.iter().find(|id| !self.working.items.contains_key(*id)) {
            return Err(StoreError::Conflict(format!(
                "line item {missing} no longer exists"
            )));
        }

        for id in ids {
            self.working.items.remove(id);
            self.deleted_items.insert(*id);
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        enter(&self.shared, Operation::Commit).await?;

        let mut shared = lock(&self.shared);

        if let Some(gone) = self
            .deleted_items
            .iter()
            .find(|id| !shared.tables.items.contains_key(*id))
        {
            return Err(StoreError::Conflict(format!(
                "line item {gone} was removed by a concurrent transaction"
            )));
        }
        if let Some(gone) = self
            .read_lists
            .iter()
            .find(|id| !shared.tables.lists.contains_key(*id))
        {
            return Err(StoreError::Conflict(format!(
                "shopping list {gone} was removed by a concurrent transaction"
            )));
        }

        for id in &self.deleted_items {
            shared.tables.items.remove(id);
        }
        for list_id in &self.created_lists {
            if let Some(record) = self.working.lists.get(list_id) {
                shared.tables.lists.insert(*list_id, record.clone());
            }
            for (id, item) in self.working.items.iter().filter(|(_, i)| i.list == *list_id) {
                shared.tables.items.insert(*id, item.clone());
            }
        }

        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        enter(&self.shared, Operation::Rollback).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn seeded() -> (MemoryStore, User, ShoppingListId, Vec<LineItem>) {
        let store = MemoryStore::new();
        let user = store.add_user("Ada");
        let list = store.add_list(user.id, ListMetadata::new("Weekly", date()));
        let items = (1..=3)
            .map(|p| {
                store
                    .add_item(list, ProductId::new(p), Quantity::ONE, p == 2)
                    .unwrap()
            })
            .collect();
        (store, user, list, items)
    }

    #[tokio::test]
    async fn test_fetch_items_filters_on_purchased() {
        let (store, _, list, items) = seeded();
        let mut tx = store.begin().await.unwrap();

        let pending = tx.fetch_items(&[list], Some(false)).await.unwrap();
        let all = tx.fetch_items(&[list], None).await.unwrap();

        assert_eq!(pending.len(), 2);
        assert_eq!(all, items);
    }

    #[tokio::test]
    async fn test_fetch_items_follows_requested_list_order() {
        let (store, user, first, _) = seeded();
        let second = store.add_list(user.id, ListMetadata::new("Party", date()));
        let other = store
            .add_item(second, ProductId::new(9), Quantity::ONE, false)
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let items = tx.fetch_items(&[second, first], None).await.unwrap();

        assert_eq!(items.first(), Some(&other));
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_list_scoped_to_owner() {
        let (store, user, list, _) = seeded();
        let stranger = store.add_user("Bob");
        let mut tx = store.begin().await.unwrap();

        assert!(tx.fetch_list(list, Some(user.id)).await.unwrap().is_some());
        assert!(tx.fetch_list(list, Some(stranger.id)).await.unwrap().is_none());
        assert!(tx.fetch_list(list, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let (store, user, list, items) = seeded();
        let mut tx = store.begin().await.unwrap();

        let saved = tx
            .save_list(NewShoppingList::new(
                ListMetadata::new("Merged", date()),
                user.id,
                vec![],
            ))
            .await
            .unwrap();
        tx.delete_items(&[items[0].id]).await.unwrap();

        assert!(store.list(saved.id).is_none());
        assert!(store.contains_item(items[0].id));

        tx.commit().await.unwrap();

        assert!(store.list(saved.id).is_some());
        assert!(!store.contains_item(items[0].id));
        assert_eq!(store.list(list).unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_scope_discards_writes() {
        let (store, user, _, items) = seeded();
        {
            let mut tx = store.begin().await.unwrap();
            tx.save_list(NewShoppingList::new(
                ListMetadata::new("Merged", date()),
                user.id,
                vec![],
            ))
            .await
            .unwrap();
            tx.delete_items(&[items[1].id]).await.unwrap();
        }

        assert_eq!(store.list_ids().len(), 1);
        assert!(store.contains_item(items[1].id));
    }

    #[tokio::test]
    async fn test_concurrent_delete_conflicts_at_commit() {
        let (store, _, _, items) = seeded();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.delete_items(&[items[0].id]).await.unwrap();
        second.delete_items(&[items[0].id]).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_of_missing_item_conflicts() {
        let (store, _, _, _) = seeded();
        let mut tx = store.begin().await.unwrap();

        let err = tx.delete_items(&[LineItemId::new(999)]).await.unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_injected_failure_is_counted() {
        let (store, user, _, _) = seeded();
        store.fail_on(Operation::FetchUser);
        let mut tx = store.begin().await.unwrap();

        let err = tx.fetch_user(user.id).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.calls(Operation::FetchUser), 1);

        store.clear_failures();
        assert!(tx.fetch_user(user.id).await.unwrap().is_some());
    }
}
