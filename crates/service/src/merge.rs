//! Shopping list merge service.
//!
//! A merge reads line items from several source lists, collapses them by
//! product with [`aggregate`], and writes the result as a new list owned by
//! the requesting user. All of it happens in one transactional scope that is
//! either committed or rolled back; there is no partially merged outcome.
//!
//! # Steps
//!
//! 1. Reject an empty set of source lists
//! 2. Open a scope
//! 3. Load the requesting user (`NotFound` if absent)
//! 4. Check every source list exists (`NotFound` if absent)
//! 5. Load the source items (only unpurchased ones for a pending merge)
//! 6. Aggregate them
//! 7. Save the new list
//! 8. Optionally delete the originals (pending merge only)
//! 9. Commit
//!
//! Steps 2-8 run under a timeout. When it expires, or when the caller drops
//! the returned future before step 9, the scope is dropped uncommitted and
//! rolls back. The commit itself is not subject to the timeout: a merge that
//! reached it reports the commit's own outcome.

use std::collections::HashSet;
use std::time::Duration;

use tracing::instrument;

use shopping_lists_core::{
    LineItemId, ListMetadata, NewShoppingList, ShoppingList, ShoppingListId, UserId, aggregate,
};

use crate::error::{Entity, MergeError, MergeStep};
use crate::store::{ShoppingListStore, StoreError, StoreTransaction};

/// Which source items a merge picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// Only items not yet purchased.
    Pending,
    /// Every item.
    All,
}

impl Selection {
    const fn purchased_filter(self) -> Option<bool> {
        match self {
            Self::Pending => Some(false),
            Self::All => None,
        }
    }
}

/// Creates shopping lists by merging existing ones.
#[derive(Debug, Clone)]
pub struct MergeService<S> {
    store: S,
    timeout: Duration,
}

impl<S: ShoppingListStore> MergeService<S> {
    /// Create a merge service over `store`; each merge is rolled back if it
    /// runs longer than `timeout`.
    #[must_use]
    pub const fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create a list from the unpurchased items of `source_ids`.
    ///
    /// With `purge_sources`, the copied originals are deleted from their lists
    /// in the same transaction; purchased items are never touched.
    ///
    /// # Errors
    ///
    /// - `MergeError::EmptySources` if `source_ids` is empty
    /// - `MergeError::NotFound` if the user or a source list does not exist
    /// - `MergeError::Conflict` if a concurrent merge consumed the same items
    /// - `MergeError::StoreUnavailable` if the store fails
    /// - `MergeError::TimedOut` if the merge does not reach its commit in time
    #[instrument(skip(self, metadata), fields(name = %metadata.name))]
    pub async fn create_from_pending_items(
        &self,
        source_ids: &[ShoppingListId],
        user_id: UserId,
        metadata: ListMetadata,
        purge_sources: bool,
    ) -> Result<ShoppingList, MergeError> {
        self.merge(
            source_ids,
            user_id,
            metadata,
            Selection::Pending,
            purge_sources,
        )
        .await
    }

    /// Create a list from every item of `source_ids`, purchased or not.
    ///
    /// The source lists are left untouched; the new list holds copies.
    ///
    /// # Errors
    ///
    /// Same as [`create_from_pending_items`](Self::create_from_pending_items).
    #[instrument(skip(self, metadata), fields(name = %metadata.name))]
    pub async fn create_from_shopping_lists(
        &self,
        source_ids: &[ShoppingListId],
        user_id: UserId,
        metadata: ListMetadata,
    ) -> Result<ShoppingList, MergeError> {
        self.merge(source_ids, user_id, metadata, Selection::All, false)
            .await
    }

    async fn merge(
        &self,
        source_ids: &[ShoppingListId],
        user_id: UserId,
        metadata: ListMetadata,
        selection: Selection,
        purge_sources: bool,
    ) -> Result<ShoppingList, MergeError> {
        let sources = distinct(source_ids);
        if sources.is_empty() {
            return Err(MergeError::EmptySources);
        }

        let staged = self.stage(&sources, user_id, metadata, selection, purge_sources);
        let Ok(staged) = tokio::time::timeout(self.timeout, staged).await else {
            tracing::warn!(timeout = ?self.timeout, "Merge timed out, transaction rolled back");
            return Err(MergeError::TimedOut(self.timeout));
        };
        let (tx, merged) = staged?;

        // Outside the deadline: once sent, a commit is awaited to its outcome.
        tx.commit()
            .await
            .map_err(|e| store_failure(MergeStep::Commit, e))?;

        tracing::info!(
            list_id = %merged.list.id,
            sources = sources.len(),
            items = merged.list.items.len(),
            purged = merged.purged,
            "Merged shopping lists"
        );
        Ok(merged.list)
    }

    /// Steps 2-8. On success the scope is handed back uncommitted.
    async fn stage(
        &self,
        sources: &[ShoppingListId],
        user_id: UserId,
        metadata: ListMetadata,
        selection: Selection,
        purge_sources: bool,
    ) -> Result<(S::Transaction, Merged), MergeError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| store_failure(MergeStep::Begin, e))?;

        match apply(&mut tx, sources, user_id, metadata, selection, purge_sources).await {
            Ok(merged) => Ok((tx, merged)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The scope is dropped either way, which discards its writes.
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(error = %err, "Merge aborted");
                Err(err)
            }
        }
    }
}

struct Merged {
    list: ShoppingList,
    purged: usize,
}

/// Steps 3-8, all inside the caller's scope.
async fn apply<T: StoreTransaction>(
    tx: &mut T,
    sources: &[ShoppingListId],
    user_id: UserId,
    metadata: ListMetadata,
    selection: Selection,
    purge_sources: bool,
) -> Result<Merged, MergeError> {
    let user = tx
        .fetch_user(user_id)
        .await
        .map_err(|e| store_failure(MergeStep::FetchUser, e))?
        .ok_or(MergeError::NotFound {
            entity: Entity::User,
            id: user_id.as_i32(),
        })?;

    for &id in sources {
        tx.fetch_list(id, None)
            .await
            .map_err(|e| store_failure(MergeStep::FetchLists, e))?
            .ok_or(MergeError::NotFound {
                entity: Entity::ShoppingList,
                id: id.as_i32(),
            })?;
    }

    let originals = tx
        .fetch_items(sources, selection.purchased_filter())
        .await
        .map_err(|e| store_failure(MergeStep::FetchItems, e))?;

    let items = aggregate(&originals);
    tracing::debug!(
        originals = originals.len(),
        merged = items.len(),
        "Aggregated source items"
    );

    let list = tx
        .save_list(NewShoppingList::new(metadata, user.id, items))
        .await
        .map_err(|e| store_failure(MergeStep::SaveList, e))?;

    let mut purged = 0;
    if purge_sources && !originals.is_empty() {
        let ids: Vec<LineItemId> = originals.iter().map(|item| item.id).collect();
        tx.delete_items(&ids)
            .await
            .map_err(|e| store_failure(MergeStep::PurgeSources, e))?;
        purged = ids.len();
    }

    Ok(Merged { list, purged })
}

/// Classify a store failure, logging the ones that aren't the caller's to retry.
fn store_failure(step: MergeStep, source: StoreError) -> MergeError {
    let err = MergeError::store(step, source);
    if let MergeError::StoreUnavailable { source, .. } = &err {
        tracing::error!(%step, error = %source, "Store failure during merge");
    }
    err
}

/// Drop repeated IDs, keeping first-seen order.
fn distinct(ids: &[ShoppingListId]) -> Vec<ShoppingListId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
