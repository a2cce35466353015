//! Merge error taxonomy.
//!
//! Every failure aborts the whole transactional scope; callers get one of
//! these and a guarantee that the merge had no effect.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Entities a merge can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// The requesting user.
    User,
    /// One of the source shopping lists.
    ShoppingList,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::ShoppingList => f.write_str("shopping list"),
        }
    }
}

/// The phase of a merge a store failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    /// Opening the transactional scope.
    Begin,
    /// Loading the requesting user.
    FetchUser,
    /// Checking that the source lists exist.
    FetchLists,
    /// Loading the source items.
    FetchItems,
    /// Writing the merged list.
    SaveList,
    /// Removing the consumed source items.
    PurgeSources,
    /// Committing the scope.
    Commit,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Begin => "begin transaction",
            Self::FetchUser => "fetch user",
            Self::FetchLists => "fetch source lists",
            Self::FetchItems => "fetch source items",
            Self::SaveList => "save merged list",
            Self::PurgeSources => "purge source items",
            Self::Commit => "commit",
        };
        f.write_str(step)
    }
}

/// Errors returned by the merge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// No source lists were given.
    #[error("at least one source shopping list is required")]
    EmptySources,

    /// The requesting user or a source list does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Which kind of entity is missing.
        entity: Entity,
        /// The ID that was looked up.
        id: i32,
    },

    /// A concurrent merge changed the same data first. Safe to retry.
    #[error("{step}: conflicting concurrent modification")]
    Conflict {
        /// Where the conflict surfaced.
        step: MergeStep,
        /// The store's report.
        #[source]
        source: StoreError,
    },

    /// The store failed for a reason other than a conflict.
    #[error("{step}: store unavailable")]
    StoreUnavailable {
        /// Where the failure happened.
        step: MergeStep,
        /// The store's report.
        #[source]
        source: StoreError,
    },

    /// The scope did not reach its commit in time and was rolled back.
    #[error("merge timed out after {0:?}")]
    TimedOut(Duration),
}

impl MergeError {
    /// Wrap a store failure with the step it happened in.
    #[must_use]
    pub fn store(step: MergeStep, source: StoreError) -> Self {
        if source.is_conflict() {
            Self::Conflict { step, source }
        } else {
            Self::StoreUnavailable { step, source }
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = MergeError::NotFound {
            entity: Entity::User,
            id: 7,
        };
        assert_eq!(err.to_string(), "user 7 not found");

        let err = MergeError::NotFound {
            entity: Entity::ShoppingList,
            id: 3,
        };
        assert_eq!(err.to_string(), "shopping list 3 not found");
    }

    #[test]
    fn test_store_errors_are_classified() {
        let conflict = MergeError::store(
            MergeStep::Commit,
            StoreError::Conflict("line item 4".to_owned()),
        );
        assert!(matches!(conflict, MergeError::Conflict { step: MergeStep::Commit, .. }));
        assert!(conflict.is_retryable());
        assert_eq!(conflict.to_string(), "commit: conflicting concurrent modification");

        let down = MergeError::store(
            MergeStep::SaveList,
            StoreError::Unavailable("connection reset".to_owned()),
        );
        assert!(matches!(down, MergeError::StoreUnavailable { .. }));
        assert!(!down.is_retryable());
        assert_eq!(down.to_string(), "save merged list: store unavailable");
    }

    #[test]
    fn test_validation_and_timeout_are_not_retryable() {
        assert!(!MergeError::EmptySources.is_retryable());
        assert!(!MergeError::TimedOut(Duration::from_secs(1)).is_retryable());
    }
}
