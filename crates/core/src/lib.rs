//! Shopping Lists Core - Shared types and the aggregation engine.
//!
//! This crate provides the types used across all shopping-list components:
//! - `shopping-lists` - The merge service and its store implementations
//! - `shopping-lists-cli` - Command-line tools for migrations and merges
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure functions - no I/O, no
//! database access. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, quantities, and the list/item domain model
//! - [`aggregate`] - Deduplication of line items by product

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod aggregate;
pub mod types;

pub use aggregate::{ListEntry, aggregate};
pub use types::*;
