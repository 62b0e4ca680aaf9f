//! Per-item FIFO queue of demand for unavailable items.

use crate::actor::Actor;
use crate::clock::Clock;
use crate::error::{LendingError, Result};
use crate::events::{EventSink, LendingEvent};
use crate::inventory::InventoryLedger;
use crate::reservation::{Reservation, ReservationStatus};
use crate::store::{ReservationStore, Scope};
use crate::{ItemId, ReservationId, UserId};
use chrono::Duration;
use log::debug;
use std::sync::Arc;

#[derive(Debug)]
pub struct ReservationQueue {
    inventory: Arc<InventoryLedger>,
    store: Arc<ReservationStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    hold: Duration,
}

impl ReservationQueue {
    pub fn new(
        inventory: Arc<InventoryLedger>,
        store: Arc<ReservationStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        hold: Duration,
    ) -> Self {
        ReservationQueue {
            inventory,
            store,
            clock,
            events,
            hold,
        }
    }

    /// Queues `borrower` for the next free copy of `item`.
    ///
    /// Only allowed while no copy is available; otherwise the caller should
    /// borrow directly.
    pub fn create(&self, item: ItemId, borrower: UserId) -> Result<Reservation> {
        let snapshot = self.inventory.item(item)?;
        if snapshot.available_copies > 0 {
            return Err(LendingError::ItemAvailable { item });
        }

        let now = self.clock.now();
        let reservation = self
            .store
            .insert_pending(item, borrower, now, now + self.hold)?;

        debug!(
            "Reservation {} queued for borrower {} on item {}",
            reservation.id, borrower, item
        );
        self.events
            .publish(LendingEvent::ReservationCreated(reservation.clone()));
        Ok(reservation)
    }

    /// Marks the oldest live reservation for `item` as fulfilled.
    ///
    /// Does not touch inventory: the freed copy simply stays available and the
    /// fulfilled holder is expected to borrow it first. A no-op when nothing
    /// qualifies.
    pub fn fulfill_next(&self, item: ItemId) -> Result<Option<Reservation>> {
        let fulfilled = self.store.fulfill_next(item, self.clock.now())?;
        if let Some(reservation) = &fulfilled {
            debug!(
                "Reservation {} fulfilled for borrower {} on item {}",
                reservation.id, reservation.borrower, item
            );
            self.events
                .publish(LendingEvent::ReservationFulfilled(reservation.clone()));
        }
        Ok(fulfilled)
    }

    /// Expires pending reservations whose hold has run out. Returns how many.
    pub fn expire_stale(&self) -> Result<usize> {
        let expired = self.store.expire(self.clock.now())?;
        let count = expired.len();
        for reservation in expired {
            debug!(
                "Reservation {} for item {} expired",
                reservation.id, reservation.item
            );
            self.events
                .publish(LendingEvent::ReservationExpired(reservation));
        }
        Ok(count)
    }

    /// Cancels a pending reservation. Owner or administrator only.
    pub fn cancel(&self, id: ReservationId, actor: &Actor) -> Result<Reservation> {
        let cancelled = self.store.update(id, |reservation| {
            if !actor.may_act_for(reservation.borrower) {
                return Err(LendingError::Unauthorized {
                    user: actor.id,
                    action: "cancel this reservation",
                });
            }
            if !reservation.settle(ReservationStatus::Cancelled) {
                return Err(LendingError::InvalidState(format!(
                    "only pending reservations can be cancelled; reservation {} is {}",
                    reservation.id, reservation.status
                )));
            }
            Ok(())
        })?;

        debug!("Reservation {} cancelled by user {}", id, actor.id);
        self.events
            .publish(LendingEvent::ReservationCancelled(cancelled.clone()));
        Ok(cancelled)
    }

    pub fn get(&self, id: ReservationId) -> Result<Reservation> {
        self.store.get(id)
    }

    /// Reservations in `scope`, optionally of one status, newest first.
    pub fn list(
        &self,
        scope: Scope,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>> {
        let mut found = self.store.select(|r| {
            scope.covers(r.borrower) && status.map_or(true, |s| r.status == s)
        })?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}
