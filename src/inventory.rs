//! Authoritative copy counts per item.
//!
//! Every write to an item's available count is a single compare-and-swap on
//! that item's counter. The registry lock only guards the set of items, never
//! the counts themselves.

use crate::error::{LendingError, Result};
use crate::item::{CopyCounter, Item};
use crate::ItemId;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct InventoryLedger {
    items: RwLock<HashMap<ItemId, Arc<CopyCounter>>>,
    reserve_attempts: u32,
}

impl InventoryLedger {
    pub fn new(reserve_attempts: u32) -> Self {
        InventoryLedger {
            items: RwLock::new(HashMap::new()),
            reserve_attempts: reserve_attempts.max(1),
        }
    }

    /// Adds an item with `copies` copies, all of them available.
    pub fn register(&self, id: ItemId, copies: u32) -> Result<Item> {
        let mut items = self
            .items
            .write()
            .map_err(|_| LendingError::poisoned("inventory"))?;

        if items.contains_key(&id) {
            return Err(LendingError::Validation(format!(
                "item {id} is already registered"
            )));
        }

        let counter = Arc::new(CopyCounter::new(id, copies));
        let item = counter.snapshot();
        items.insert(id, counter);
        debug!("Registered item {} with {} copies", id, copies);
        Ok(item)
    }

    pub fn item(&self, id: ItemId) -> Result<Item> {
        Ok(self.counter(id)?.snapshot())
    }

    /// All items, sorted by id.
    pub fn items(&self) -> Result<Vec<Item>> {
        let items = self
            .items
            .read()
            .map_err(|_| LendingError::poisoned("inventory"))?;
        let mut snapshot: Vec<Item> = items.values().map(|c| c.snapshot()).collect();
        snapshot.sort_by_key(|i| i.id);
        Ok(snapshot)
    }

    /// Takes one copy of `id`.
    ///
    /// A lost compare-and-swap is a transient conflict and is retried up to the
    /// configured number of attempts; a counter observed at zero fails
    /// immediately. Returns the remaining available count.
    pub fn reserve_copy(&self, id: ItemId) -> Result<u32> {
        let counter = self.counter(id)?;
        let mut current = counter.available();

        for attempt in 1..=self.reserve_attempts {
            if current == 0 {
                return Err(LendingError::OutOfStock { item: id });
            }
            match counter.try_take(current) {
                Ok(remaining) => return Ok(remaining),
                Err(actual) => {
                    debug!(
                        "Item {}: copy counter contended (attempt {}/{}), expected {} found {}",
                        id, attempt, self.reserve_attempts, current, actual
                    );
                    current = actual;
                }
            }
        }

        warn!(
            "Item {}: giving up after {} contended reserve attempts",
            id, self.reserve_attempts
        );
        Err(LendingError::OutOfStock { item: id })
    }

    /// Returns one copy of `id`. Returns the new available count.
    ///
    /// A release that would push the count past the item's total means more
    /// copies came back than went out; that is reported as a consistency
    /// violation and the counter is left untouched.
    pub fn release_copy(&self, id: ItemId) -> Result<u32> {
        let counter = self.counter(id)?;
        match counter.put_back() {
            Some(available) => Ok(available),
            None => {
                error!(
                    "CONSISTENCY VIOLATION: release of item {} would exceed its {} total copies",
                    id,
                    counter.total()
                );
                Err(LendingError::Consistency(format!(
                    "item {id} already has all {} copies available",
                    counter.total()
                )))
            }
        }
    }

    fn counter(&self, id: ItemId) -> Result<Arc<CopyCounter>> {
        let items = self
            .items
            .read()
            .map_err(|_| LendingError::poisoned("inventory"))?;
        items
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::item_not_found(id))
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RESERVE_ATTEMPTS)
    }
}
