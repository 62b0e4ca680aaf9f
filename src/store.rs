//! In-memory record stores for loans and reservations.
//!
//! Each store keeps its records and its uniqueness index behind one `RwLock`,
//! so the "one active loan" and "one pending reservation" rules are checked
//! and written inside the same critical section. Updates are conditional: the
//! caller's closure sees the current record and may refuse the change, in
//! which case nothing is written.

use crate::error::{LendingError, Result};
use crate::loan::Loan;
use crate::reservation::{Reservation, ReservationStatus};
use crate::{ItemId, LoanId, ReservationId, UserId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whose records a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Borrower(UserId),
    All,
}

impl Scope {
    pub fn covers(&self, borrower: UserId) -> bool {
        match self {
            Scope::Borrower(id) => *id == borrower,
            Scope::All => true,
        }
    }
}

#[derive(Debug, Default)]
struct LoanTable {
    loans: BTreeMap<LoanId, Loan>,
    active: HashMap<(UserId, ItemId), LoanId>,
    next_id: LoanId,
}

#[derive(Debug, Default)]
pub struct LoanStore {
    table: RwLock<LoanTable>,
}

impl LoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LoanTable>> {
        self.table.read().map_err(|_| LendingError::poisoned("loan store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LoanTable>> {
        self.table.write().map_err(|_| LendingError::poisoned("loan store"))
    }

    /// Inserts a new issued loan unless the pair already has an active one.
    pub fn insert_active(
        &self,
        item: ItemId,
        borrower: UserId,
        issued_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Result<Loan> {
        let mut table = self.write()?;
        if table.active.contains_key(&(borrower, item)) {
            return Err(LendingError::DuplicateActiveLoan { borrower, item });
        }

        table.next_id += 1;
        let loan = Loan::new(table.next_id, item, borrower, issued_at, due_at);
        table.active.insert((borrower, item), loan.id);
        table.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    pub fn get(&self, id: LoanId) -> Result<Loan> {
        self.read()?
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::loan_not_found(id))
    }

    pub fn has_active(&self, borrower: UserId, item: ItemId) -> Result<bool> {
        Ok(self.read()?.active.contains_key(&(borrower, item)))
    }

    /// Applies `change` to loan `id` atomically.
    ///
    /// `change` works on a copy; the copy is committed only if it returns `Ok`.
    pub fn update<F>(&self, id: LoanId, change: F) -> Result<Loan>
    where
        F: FnOnce(&mut Loan) -> Result<()>,
    {
        let mut table = self.write()?;
        let current = table
            .loans
            .get(&id)
            .ok_or_else(|| LendingError::loan_not_found(id))?;

        let was_active = current.is_active();
        let mut updated = current.clone();
        change(&mut updated)?;

        if was_active && !updated.is_active() {
            table.active.remove(&(updated.borrower, updated.item));
        }
        table.loans.insert(id, updated.clone());
        Ok(updated)
    }

    /// Moves every issued loan due before `now` to overdue, returning those moved.
    pub fn promote_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Loan>> {
        let mut table = self.write()?;
        let promoted = table
            .loans
            .values_mut()
            .filter_map(|loan| loan.mark_overdue(now).then(|| loan.clone()))
            .collect();
        Ok(promoted)
    }

    /// Loans matching `filter`, ordered by id.
    pub fn select<P>(&self, filter: P) -> Result<Vec<Loan>>
    where
        P: Fn(&Loan) -> bool,
    {
        Ok(self
            .read()?
            .loans
            .values()
            .filter(|loan| filter(loan))
            .cloned()
            .collect())
    }

    /// Number of active loans per item.
    pub fn active_counts(&self) -> Result<HashMap<ItemId, u32>> {
        let table = self.read()?;
        let mut counts = HashMap::new();
        for (_, item) in table.active.keys() {
            *counts.entry(*item).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Debug, Default)]
struct ReservationTable {
    reservations: BTreeMap<ReservationId, Reservation>,
    pending: HashMap<(UserId, ItemId), ReservationId>,
    queues: HashMap<ItemId, VecDeque<ReservationId>>,
    next_id: ReservationId,
}

impl ReservationTable {
    fn forget_pending(&mut self, reservation: &Reservation) {
        self.pending
            .remove(&(reservation.borrower, reservation.item));
        if let Some(queue) = self.queues.get_mut(&reservation.item) {
            queue.retain(|id| *id != reservation.id);
            if queue.is_empty() {
                self.queues.remove(&reservation.item);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ReservationStore {
    table: RwLock<ReservationTable>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ReservationTable>> {
        self.table
            .read()
            .map_err(|_| LendingError::poisoned("reservation store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ReservationTable>> {
        self.table
            .write()
            .map_err(|_| LendingError::poisoned("reservation store"))
    }

    /// Appends a pending reservation to the item's queue unless the pair
    /// already has one pending.
    pub fn insert_pending(
        &self,
        item: ItemId,
        borrower: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut table = self.write()?;
        if table.pending.contains_key(&(borrower, item)) {
            return Err(LendingError::DuplicateReservation { borrower, item });
        }

        table.next_id += 1;
        let reservation = Reservation::new(table.next_id, item, borrower, created_at, expires_at);
        table.pending.insert((borrower, item), reservation.id);
        table
            .queues
            .entry(item)
            .or_default()
            .push_back(reservation.id);
        table
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    pub fn get(&self, id: ReservationId) -> Result<Reservation> {
        self.read()?
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::reservation_not_found(id))
    }

    /// Applies `change` to reservation `id` atomically; see [`LoanStore::update`].
    pub fn update<F>(&self, id: ReservationId, change: F) -> Result<Reservation>
    where
        F: FnOnce(&mut Reservation) -> Result<()>,
    {
        let mut table = self.write()?;
        let current = table
            .reservations
            .get(&id)
            .ok_or_else(|| LendingError::reservation_not_found(id))?;

        let was_pending = current.is_pending();
        let mut updated = current.clone();
        change(&mut updated)?;

        if was_pending && !updated.is_pending() {
            table.forget_pending(&updated);
        }
        table.reservations.insert(id, updated.clone());
        Ok(updated)
    }

    /// Fulfills the oldest live reservation queued for `item`, if any.
    pub fn fulfill_next(&self, item: ItemId, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let mut table = self.write()?;

        let next_id = match table.queues.get(&item) {
            Some(queue) => queue
                .iter()
                .filter_map(|id| table.reservations.get(id))
                .filter(|r| r.is_live(now))
                .min_by_key(|r| (r.created_at, r.id))
                .map(|r| r.id),
            None => None,
        };

        let Some(id) = next_id else {
            return Ok(None);
        };

        let mut fulfilled = match table.reservations.get(&id) {
            Some(reservation) => reservation.clone(),
            None => return Ok(None),
        };
        fulfilled.settle(ReservationStatus::Fulfilled);
        table.forget_pending(&fulfilled);
        table.reservations.insert(id, fulfilled.clone());
        Ok(Some(fulfilled))
    }

    /// Expires every pending reservation whose hold ended before `now`.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut table = self.write()?;
        let stale: Vec<ReservationId> = table
            .reservations
            .values()
            .filter(|r| r.is_pending() && r.expires_at < now)
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(reservation) = table.reservations.get_mut(&id) {
                reservation.settle(ReservationStatus::Expired);
                let snapshot = reservation.clone();
                table.forget_pending(&snapshot);
                expired.push(snapshot);
            }
        }
        Ok(expired)
    }

    /// Reservations matching `filter`, ordered by id.
    pub fn select<P>(&self, filter: P) -> Result<Vec<Reservation>>
    where
        P: Fn(&Reservation) -> bool,
    {
        Ok(self
            .read()?
            .reservations
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect())
    }
}
