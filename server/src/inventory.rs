//! Slot-based player inventory.
//!
//! Slot indices arrive from the wire as `i32`; anything outside
//! `0..INVENTORY_SIZE` is rejected rather than clamped.

use crate::catalog::{ItemCatalog, ItemEffect};
use shared::{ItemId, SlotEntry, INVENTORY_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStack {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    slots: [Option<ItemStack>; INVENTORY_SIZE],
}

fn slot_index(slot: i32) -> Option<usize> {
    usize::try_from(slot).ok().filter(|&i| i < INVENTORY_SIZE)
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            slots: [None; INVENTORY_SIZE],
        }
    }

    pub fn slot(&self, slot: i32) -> Option<ItemStack> {
        slot_index(slot).and_then(|i| self.slots[i])
    }

    /// Overwrites a slot. Returns false for an out-of-range index.
    pub fn set_slot(&mut self, slot: i32, stack: Option<ItemStack>) -> bool {
        match slot_index(slot) {
            Some(i) => {
                self.slots[i] = stack.filter(|s| s.quantity > 0);
                true
            }
            None => false,
        }
    }

    /// Adds items, topping up existing stacks before filling empty slots.
    ///
    /// Returns the quantity that did not fit.
    pub fn add_item(&mut self, item_id: ItemId, quantity: u32, catalog: &ItemCatalog) -> u32 {
        let max = catalog.max_stack(item_id);
        let mut remaining = quantity;

        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.item_id == item_id && stack.quantity < max {
                let moved = remaining.min(max - stack.quantity);
                stack.quantity += moved;
                remaining -= moved;
            }
        }

        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let moved = remaining.min(max);
                *slot = Some(ItemStack {
                    item_id,
                    quantity: moved,
                });
                remaining -= moved;
            }
        }

        remaining
    }

    /// Uses one item from `slot` if it is consumable.
    ///
    /// The stack is decremented (and cleared at zero) and the item's restore
    /// effect returned for the caller to apply. Empty, out-of-range and
    /// non-consumable slots are left untouched.
    pub fn consume(&mut self, slot: i32, catalog: &ItemCatalog) -> Option<ItemEffect> {
        let index = slot_index(slot)?;
        let stack = self.slots[index]?;
        let effect = catalog.effect(stack.item_id)?;

        self.slots[index] = if stack.quantity > 1 {
            Some(ItemStack {
                quantity: stack.quantity - 1,
                ..stack
            })
        } else {
            None
        };
        Some(effect)
    }

    /// Moves the stack in `from` onto `to`.
    ///
    /// Into an empty slot the stack is relocated; onto the same item it is
    /// merged up to the stack limit with the remainder left behind; onto a
    /// different item (or a full stack) the two slots are swapped.
    pub fn move_item(&mut self, from: i32, to: i32, catalog: &ItemCatalog) -> bool {
        let (Some(from), Some(to)) = (slot_index(from), slot_index(to)) else {
            return false;
        };
        if from == to {
            return false;
        }
        let Some(source) = self.slots[from] else {
            return false;
        };

        match self.slots[to] {
            Some(mut target) if target.item_id == source.item_id => {
                let room = catalog.max_stack(target.item_id).saturating_sub(target.quantity);
                if room == 0 {
                    self.slots.swap(from, to);
                    return true;
                }
                let moved = room.min(source.quantity);
                target.quantity += moved;
                self.slots[to] = Some(target);
                self.slots[from] = if source.quantity > moved {
                    Some(ItemStack {
                        quantity: source.quantity - moved,
                        ..source
                    })
                } else {
                    None
                };
            }
            _ => self.slots.swap(from, to),
        }
        true
    }

    /// Occupied slots in index order, as sent in an InventoryUpdate.
    pub fn snapshot(&self) -> Vec<SlotEntry> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|stack| SlotEntry {
                    slot_index: index as i32,
                    item_id: stack.item_id,
                    quantity: stack.quantity as i32,
                })
            })
            .collect()
    }

    /// Total quantity of `item_id` across all slots.
    pub fn count(&self, item_id: ItemId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.item_id == item_id)
            .map(|stack| stack.quantity)
            .sum()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}
