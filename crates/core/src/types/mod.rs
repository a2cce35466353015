//! Core types for shopping lists.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod list;
pub mod quantity;

pub use id::*;
pub use list::{LineItem, ListMetadata, NewLineItem, NewShoppingList, ShoppingList, User};
pub use quantity::{Quantity, QuantityError};
