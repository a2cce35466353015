//! Shopping list domain types.
//!
//! Persisted values ([`ShoppingList`], [`LineItem`]) always carry an ID. Values
//! that have not been written yet ([`NewShoppingList`], [`NewLineItem`]) never
//! do, so a copy of an item can't be mistaken for the original it came from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{LineItemId, ProductId, Quantity, ShoppingListId, UserId};

/// A person who owns shopping lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

/// One product entry on a shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Unique item ID.
    pub id: LineItemId,
    /// The list that owns this item. An item belongs to exactly one list.
    pub shopping_list_id: ShoppingListId,
    /// Catalog product this entry refers to.
    pub product: ProductId,
    /// How many units are wanted.
    pub quantity: Quantity,
    /// Whether the item has already been bought.
    pub purchased: bool,
}

/// A line item that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    /// Catalog product this entry refers to.
    pub product: ProductId,
    /// How many units are wanted.
    pub quantity: Quantity,
    /// Whether the item has already been bought.
    pub purchased: bool,
}

/// Name and date of a shopping list, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMetadata {
    /// Display name.
    pub name: String,
    /// Calendar date the list is planned for.
    pub date: NaiveDate,
}

impl ListMetadata {
    /// Create list metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            date,
        }
    }
}

/// A named, dated collection of line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    /// Unique list ID.
    pub id: ShoppingListId,
    /// Display name.
    pub name: String,
    /// Calendar date the list is planned for.
    pub date: NaiveDate,
    /// Whether the list is finished.
    pub done: bool,
    /// The single owner of this list.
    pub owner: UserId,
    /// Users the list is shared with.
    pub shared_users: Vec<UserId>,
    /// Items in display order. Every item's `shopping_list_id` is `id`.
    pub items: Vec<LineItem>,
}

impl ShoppingList {
    /// Returns `true` if every item points back at this list.
    #[must_use]
    pub fn owns_all_items(&self) -> bool {
        self.items
            .iter()
            .all(|item| item.shopping_list_id == self.id)
    }
}

/// A shopping list that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShoppingList {
    /// Display name.
    pub name: String,
    /// Calendar date the list is planned for.
    pub date: NaiveDate,
    /// Whether the list is finished.
    pub done: bool,
    /// The single owner of this list.
    pub owner: UserId,
    /// Items in display order.
    pub items: Vec<NewLineItem>,
}

impl NewShoppingList {
    /// Create an unfinished list owned by `owner`.
    #[must_use]
    pub fn new(metadata: ListMetadata, owner: UserId, items: Vec<NewLineItem>) -> Self {
        Self {
            name: metadata.name,
            date: metadata.date,
            done: false,
            owner,
            items,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_new_list_is_not_done() {
        let list = NewShoppingList::new(ListMetadata::new("Weekly", date()), UserId::new(1), vec![]);
        assert!(!list.done);
        assert_eq!(list.name, "Weekly");
        assert_eq!(list.owner, UserId::new(1));
    }

    #[test]
    fn test_owns_all_items() {
        let item = LineItem {
            id: LineItemId::new(1),
            shopping_list_id: ShoppingListId::new(10),
            product: ProductId::new(5),
            quantity: Quantity::ONE,
            purchased: false,
        };
        let mut list = ShoppingList {
            id: ShoppingListId::new(10),
            name: "Weekly".to_owned(),
            date: date(),
            done: false,
            owner: UserId::new(1),
            shared_users: vec![],
            items: vec![item.clone()],
        };
        assert!(list.owns_all_items());

        list.items.push(LineItem {
            shopping_list_id: ShoppingListId::new(11),
            ..item
        });
        assert!(!list.owns_all_items());
    }
}
