use crate::id::ItemType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors raised by ledger operations that must not partially apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("insufficient {item}: requested {requested}, available {available}")]
    Insufficient {
        item: ItemType,
        requested: u32,
        available: u32,
    },
}

/// A typed-quantity ledger. Item types with a zero count are never stored,
/// so two ledgers holding the same items compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<ItemType, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add items. Adding zero is a no-op.
    pub fn add(&mut self, item: ItemType, quantity: u32) {
        if quantity == 0 {
            return;
        }
        *self.items.entry(item).or_insert(0) += quantity;
    }

    /// Remove exactly `quantity` items, or nothing at all.
    pub fn subtract(&mut self, item: ItemType, quantity: u32) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Ok(());
        }
        let available = self.quantity(item);
        if available < quantity {
            return Err(InventoryError::Insufficient {
                item,
                requested: quantity,
                available,
            });
        }
        if available == quantity {
            self.items.remove(&item);
        } else {
            self.items.insert(item, available - quantity);
        }
        Ok(())
    }

    /// Whether at least `quantity` of `item` is present.
    pub fn has(&self, item: ItemType, quantity: u32) -> bool {
        self.quantity(item) >= quantity
    }

    /// Whether every entry of `required` is covered by this ledger.
    pub fn has_all(&self, required: &Inventory) -> bool {
        required.iter().all(|(item, qty)| self.has(item, qty))
    }

    pub fn quantity(&self, item: ItemType) -> u32 {
        self.items.get(&item).copied().unwrap_or(0)
    }

    /// Total items across all types.
    pub fn total(&self) -> u32 {
        self.items.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate `(item, quantity)` pairs in item order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemType, u32)> + '_ {
        self.items.iter().map(|(&item, &qty)| (item, qty))
    }

    /// Add every entry of `other`.
    pub fn add_all(&mut self, other: &Inventory) {
        for (item, qty) in other.iter() {
            self.add(item, qty);
        }
    }

    /// Subtract every entry of `other`, all-or-nothing.
    pub fn subtract_all(&mut self, other: &Inventory) -> Result<(), InventoryError> {
        if let Some((item, requested)) = other.iter().find(|&(item, qty)| !self.has(item, qty)) {
            return Err(InventoryError::Insufficient {
                item,
                requested,
                available: self.quantity(item),
            });
        }
        for (item, qty) in other.iter() {
            self.subtract(item, qty)?;
        }
        Ok(())
    }

    /// Move items into `target`. With `subset` only those quantities move
    /// (all-or-nothing); without it the whole ledger is emptied into `target`.
    /// Returns what was moved.
    pub fn move_into(
        &mut self,
        target: &mut Inventory,
        subset: Option<&Inventory>,
    ) -> Result<Inventory, InventoryError> {
        let moved = match subset {
            Some(subset) => subset.clone(),
            None => self.clone(),
        };
        self.subtract_all(&moved)?;
        target.add_all(&moved);
        Ok(moved)
    }
}

impl FromIterator<(ItemType, u32)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (ItemType, u32)>>(iter: I) -> Self {
        let mut inv = Inventory::new();
        for (item, qty) in iter {
            inv.add(item, qty);
        }
        inv
    }
}

impl<const N: usize> From<[(ItemType, u32); N]> for Inventory {
    fn from(entries: [(ItemType, u32); N]) -> Self {
        entries.into_iter().collect()
    }
}
