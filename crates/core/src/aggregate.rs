//! Line-item aggregation.
//!
//! Collapses line items that refer to the same product into one entry whose
//! quantity is the sum of the group. This is the pure half of a list merge:
//! no I/O, no mutation of the inputs, and it can't fail.

use std::collections::HashMap;

use crate::types::{LineItem, NewLineItem, ProductId, Quantity};

/// Anything that looks like a line item for aggregation purposes.
///
/// Implemented for persisted [`LineItem`]s and for [`NewLineItem`]s, so the
/// output of [`aggregate`] can be aggregated again.
pub trait ListEntry {
    /// The product identity items are grouped by.
    fn product(&self) -> ProductId;
    /// The quantity contributed to the group.
    fn quantity(&self) -> Quantity;
    /// Purchase state; only the first item of a group is consulted.
    fn purchased(&self) -> bool;
}

impl ListEntry for LineItem {
    fn product(&self) -> ProductId {
        self.product
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn purchased(&self) -> bool {
        self.purchased
    }
}

impl ListEntry for NewLineItem {
    fn product(&self) -> ProductId {
        self.product
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn purchased(&self) -> bool {
        self.purchased
    }
}

impl<T: ListEntry + ?Sized> ListEntry for &T {
    fn product(&self) -> ProductId {
        (**self).product()
    }

    fn quantity(&self) -> Quantity {
        (**self).quantity()
    }

    fn purchased(&self) -> bool {
        (**self).purchased()
    }
}

/// Merge `items` into one new line item per distinct product.
///
/// - Quantities of items sharing a product are summed. A sum that would
///   exceed [`Decimal::MAX`](rust_decimal::Decimal::MAX) is capped there, so
///   totals are conserved only below that bound.
/// - `purchased` comes from the first item seen for that product.
/// - Output order is the order in which each product first appears.
///
/// Runs in O(n) time and space.
///
/// # Example
///
/// ```
/// use shopping_lists_core::{NewLineItem, ProductId, Quantity, aggregate};
///
/// let item = |product, units| NewLineItem {
///     product: ProductId::new(product),
///     quantity: Quantity::from_units(units).unwrap(),
///     purchased: false,
/// };
///
/// let merged = aggregate(&[item(1, 2), item(2, 1), item(1, 3)]);
/// assert_eq!(merged, vec![item(1, 5), item(2, 1)]);
/// ```
#[must_use]
pub fn aggregate<I>(items: I) -> Vec<NewLineItem>
where
    I: IntoIterator,
    I::Item: ListEntry,
{
    let items = items.into_iter();
    let mut merged: Vec<NewLineItem> = Vec::with_capacity(items.size_hint().0);
    let mut index: HashMap<ProductId, usize> = HashMap::with_capacity(items.size_hint().0);

    for item in items {
        match index.get(&item.product()) {
            Some(&slot) => {
                if let Some(existing) = merged.get_mut(slot) {
                    existing.quantity += item.quantity();
                }
            }
            None => {
                index.insert(item.product(), merged.len());
                merged.push(NewLineItem {
                    product: item.product(),
                    quantity: item.quantity(),
                    purchased: item.purchased(),
                });
            }
        }
    }

    merged
}
