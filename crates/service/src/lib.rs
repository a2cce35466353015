//! Shopping Lists - transactional merge of shopping lists.
//!
//! # Architecture
//!
//! - [`merge::MergeService`] orchestrates a merge inside one transactional scope
//! - [`store`] defines the scope and store traits, with a `PostgreSQL`
//!   implementation and an in-memory one for tests
//! - [`error`] holds the merge error taxonomy
//! - [`config`] loads settings from the environment
//!
//! The pure aggregation step lives in `shopping_lists_core::aggregate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod merge;
pub mod store;

pub use config::{ConfigError, MergeConfig};
pub use error::{Entity, MergeError, MergeStep};
pub use merge::MergeService;
pub use store::{MemoryStore, PgStore, ShoppingListStore, StoreError, StoreTransaction};
