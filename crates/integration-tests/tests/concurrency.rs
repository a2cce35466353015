//! Integration tests for competing merges, timeouts and cancellation.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use shopping_lists::store::{MemoryTransaction, Operation};
use shopping_lists::{
    MemoryStore, MergeError, MergeService, MergeStep, ShoppingListStore, StoreError,
    StoreTransaction,
};
use shopping_lists_core::{
    LineItem, LineItemId, NewShoppingList, ShoppingList, ShoppingListId, User, UserId,
};
use shopping_lists_integration_tests::{Fixture, metadata, service};

/// A store whose commits apply immediately but are acknowledged late.
#[derive(Clone)]
struct SlowAckStore {
    inner: MemoryStore,
    ack_delay: Duration,
}

struct SlowAckTransaction {
    inner: MemoryTransaction,
    ack_delay: Duration,
}

impl ShoppingListStore for SlowAckStore {
    type Transaction = SlowAckTransaction;

    async fn begin(&self) -> Result<SlowAckTransaction, StoreError> {
        Ok(SlowAckTransaction {
            inner: self.inner.begin().await?,
            ack_delay: self.ack_delay,
        })
    }
}

impl StoreTransaction for SlowAckTransaction {
    async fn fetch_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.fetch_user(id).await
    }

    async fn fetch_list(
        &mut self,
        id: ShoppingListId,
        owner: Option<UserId>,
    ) -> Result<Option<ShoppingList>, StoreError> {
        self.inner.fetch_list(id, owner).await
    }

    async fn fetch_items(
        &mut self,
        list_ids: &[ShoppingListId],
        purchased: Option<bool>,
    ) -> Result<Vec<LineItem>, StoreError> {
        self.inner.fetch_items(list_ids, purchased).await
    }

    async fn save_list(&mut self, list: NewShoppingList) -> Result<ShoppingList, StoreError> {
        self.inner.save_list(list).await
    }

    async fn delete_items(&mut self, ids: &[LineItemId]) -> Result<(), StoreError> {
        self.inner.delete_items(ids).await
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.inner.commit().await?;
        tokio::time::sleep(self.ack_delay).await;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_competing_purges_commit_once() {
    let fx = Fixture::two_lists();
    fx.store.set_latency(Duration::from_millis(5));
    let service = service(&fx.store);

    let (first, second) = tokio::join!(
        service.create_from_pending_items(&fx.lists, fx.user.id, metadata("First"), true),
        service.create_from_pending_items(&fx.lists, fx.user.id, metadata("Second"), true),
    );

    let (won, lost) = match (first, second) {
        (Ok(list), Err(err)) | (Err(err), Ok(list)) => (list, err),
        (first, second) => panic!("expected one winner, got {first:?} and {second:?}"),
    };

    assert!(matches!(
        lost,
        MergeError::Conflict {
            step: MergeStep::Commit,
            ..
        }
    ));
    assert!(lost.is_retryable());

    // Only the winner's list exists, and each pending item moved exactly once.
    assert_eq!(fx.store.list_ids().len(), 3);
    assert!(fx.store.list(won.id).is_some());
    assert_eq!(won.items.len(), 3);
    for item in fx.pending() {
        assert!(!fx.store.contains_item(item.id));
    }
    for item in fx.purchased() {
        assert!(fx.store.contains_item(item.id));
    }
}

#[tokio::test]
async fn test_retry_after_conflict_finds_nothing_pending() {
    let fx = Fixture::two_lists();
    fx.store.set_latency(Duration::from_millis(5));
    let service = service(&fx.store);

    let (first, second) = tokio::join!(
        service.create_from_pending_items(&fx.lists, fx.user.id, metadata("First"), true),
        service.create_from_pending_items(&fx.lists, fx.user.id, metadata("Second"), true),
    );
    assert!(first.is_ok() != second.is_ok());

    let retried = service
        .create_from_pending_items(&fx.lists, fx.user.id, metadata("Second"), true)
        .await
        .unwrap();

    assert!(retried.items.is_empty());
}

#[tokio::test]
async fn test_competing_copies_both_succeed() {
    let fx = Fixture::two_lists();
    fx.store.set_latency(Duration::from_millis(5));
    let service = service(&fx.store);

    let (first, second) = tokio::join!(
        service.create_from_pending_items(&fx.lists, fx.user.id, metadata("First"), false),
        service.create_from_shopping_lists(&fx.lists, fx.user.id, metadata("Second")),
    );

    assert_eq!(first.unwrap().items.len(), 3);
    assert_eq!(second.unwrap().items.len(), 6);
    assert_eq!(fx.store.list_ids().len(), 4);
    for item in &fx.items {
        assert!(fx.store.contains_item(item.id));
    }
}

#[tokio::test]
async fn test_timeout_rolls_back() {
    let fx = Fixture::two_lists();
    // Eight store calls at 10ms each cannot finish in 65ms.
    fx.store.set_latency(Duration::from_millis(10));
    let timeout = Duration::from_millis(65);
    let service = MergeService::new(fx.store.clone(), timeout);

    let err = service
        .create_from_pending_items(&fx.lists, fx.user.id, metadata("Slow"), true)
        .await
        .unwrap_err();

    assert!(matches!(err, MergeError::TimedOut(t) if t == timeout));
    assert_eq!(fx.store.calls(Operation::Commit), 0);
    assert_eq!(fx.store.list_ids(), fx.lists.to_vec());
    for item in &fx.items {
        assert!(fx.store.contains_item(item.id));
    }
}

#[tokio::test]
async fn test_slow_commit_acknowledgement_is_not_a_timeout() {
    let fx = Fixture::two_lists();
    let store = SlowAckStore {
        inner: fx.store.clone(),
        ack_delay: Duration::from_millis(200),
    };
    let service = MergeService::new(store, Duration::from_millis(100));

    let list = service
        .create_from_pending_items(&fx.lists, fx.user.id, metadata("Late"), true)
        .await
        .unwrap();

    // The caller's answer matches what the store holds.
    assert_eq!(fx.store.list(list.id), Some(list));
    assert_eq!(fx.store.list_ids().len(), 3);
    for item in fx.pending() {
        assert!(!fx.store.contains_item(item.id));
    }
}

#[tokio::test]
async fn test_cancelled_merge_rolls_back() {
    let fx = Fixture::two_lists();
    fx.store.set_latency(Duration::from_millis(10));
    let service = service(&fx.store);

    tokio::select! {
        result = service.create_from_pending_items(&fx.lists, fx.user.id, metadata("Dropped"), true) => {
            panic!("merge finished before cancellation: {result:?}");
        }
        () = tokio::time::sleep(Duration::from_millis(45)) => {}
    }

    assert_eq!(fx.store.calls(Operation::Commit), 0);
    assert_eq!(fx.store.list_ids(), fx.lists.to_vec());
    for item in &fx.items {
        assert!(fx.store.contains_item(item.id));
    }
}
