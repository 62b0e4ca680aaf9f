//! Lendable item and its copy counter.

use crate::ItemId;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Point-in-time view of an item's copy counts.
///
/// # Invariants
///
/// - `available_copies <= total_copies`
/// - `available_copies == total_copies - active loans for the item`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl Item {
    pub fn on_loan(&self) -> u32 {
        self.total_copies - self.available_copies
    }
}

/// Shared copy counter for one item.
///
/// `total` is fixed at registration; `available` starts equal to it and is
/// only ever changed through compare-and-swap.
#[derive(Debug)]
pub(crate) struct CopyCounter {
    id: ItemId,
    total: u32,
    available: AtomicU32,
}

impl CopyCounter {
    pub(crate) fn new(id: ItemId, total: u32) -> Self {
        CopyCounter {
            id,
            total,
            available: AtomicU32::new(total),
        }
    }

    pub(crate) fn total(&self) -> u32 {
        self.total
    }

    pub(crate) fn available(&self) -> u32 {
        self.available.load(Ordering::Acquire)
    }

    /// One compare-and-swap from `current` to `current - 1`.
    ///
    /// `Err(actual)` means another caller changed the counter first.
    pub(crate) fn try_take(&self, current: u32) -> std::result::Result<u32, u32> {
        let next = current.checked_sub(1).ok_or(current)?;
        self.available
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| next)
    }

    /// Adds one copy back; `None` if that would exceed `total`.
    pub(crate) fn put_back(&self) -> Option<u32> {
        let total = self.total;
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < total {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    pub(crate) fn snapshot(&self) -> Item {
        Item {
            id: self.id,
            total_copies: self.total,
            available_copies: self.available(),
        }
    }
}
