//! The lending engine: the operations exposed to request handlers.
//!
//! Wires the inventory ledger, loan and reservation stores, fine ledger,
//! state machine and sweeper together. Every method takes `&self`; share the
//! engine across threads with `Arc`.

use crate::actor::Actor;
use crate::clock::{Clock, SystemClock};
use crate::config::LendingPolicy;
use crate::error::{LendingError, Result};
use crate::events::{DiscardEvents, EventSink, LendingEvent, Notice, NoticeKind};
use crate::fines::{FineLedger, FineSummary};
use crate::inventory::InventoryLedger;
use crate::item::Item;
use crate::lending::LendingStateMachine;
use crate::loan::{Loan, LoanStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::reservations::ReservationQueue;
use crate::store::{LoanStore, ReservationStore, Scope};
use crate::sweeper::{spawn_periodic, OverdueSweeper, SchedulerHandle};
use crate::{ItemId, LoanId, ReservationId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Loan counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoanStats {
    pub total: usize,
    pub issued: usize,
    pub overdue: usize,
    pub returned: usize,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub promoted: usize,
    pub expired: usize,
    pub reminded: usize,
}

#[derive(Debug)]
pub struct LendingEngine {
    policy: LendingPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    inventory: Arc<InventoryLedger>,
    loans: Arc<LoanStore>,
    fines: Arc<FineLedger>,
    reservations: Arc<ReservationQueue>,
    lending: LendingStateMachine,
    sweeper: OverdueSweeper,
    last_reminder_day: Mutex<Option<NaiveDate>>,
}

impl LendingEngine {
    /// Creates an engine on wall-clock time that discards its events.
    pub fn new(policy: LendingPolicy) -> Self {
        Self::with_parts(policy, Arc::new(SystemClock), Arc::new(DiscardEvents))
    }

    pub fn with_parts(
        policy: LendingPolicy,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let inventory = Arc::new(InventoryLedger::new(policy.reserve_attempts));
        let loans = Arc::new(LoanStore::new());
        let fines = Arc::new(FineLedger::new(loans.clone(), policy.fine_rate));
        let reservations = Arc::new(ReservationQueue::new(
            inventory.clone(),
            Arc::new(ReservationStore::new()),
            clock.clone(),
            events.clone(),
            policy.reservation_hold,
        ));
        let lending = LendingStateMachine::new(
            inventory.clone(),
            loans.clone(),
            fines.clone(),
            reservations.clone(),
            clock.clone(),
            events.clone(),
            policy.loan_period,
        );
        let sweeper = OverdueSweeper::new(loans.clone());

        LendingEngine {
            policy,
            clock,
            events,
            inventory,
            loans,
            fines,
            reservations,
            lending,
            sweeper,
            last_reminder_day: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Adds an item to the inventory with every copy available.
    pub fn register_item(&self, item: ItemId, copies: u32) -> Result<Item> {
        self.inventory.register(item, copies)
    }

    pub fn item(&self, item: ItemId) -> Result<Item> {
        self.inventory.item(item)
    }

    pub fn items(&self) -> Result<Vec<Item>> {
        self.inventory.items()
    }

    pub fn loan(&self, id: LoanId) -> Result<Loan> {
        self.lending.loan(id)
    }

    pub fn reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.reservations.get(id)
    }

    pub fn issue_book(
        &self,
        item: ItemId,
        borrower: UserId,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Loan> {
        self.lending.issue(item, borrower, due_at)
    }

    pub fn return_book(&self, loan: LoanId, actor: &Actor) -> Result<Loan> {
        self.lending.return_loan(loan, actor)
    }

    pub fn create_reservation(&self, item: ItemId, borrower: UserId) -> Result<Reservation> {
        self.reservations.create(item, borrower)
    }

    pub fn cancel_reservation(&self, id: ReservationId, actor: &Actor) -> Result<Reservation> {
        self.reservations.cancel(id, actor)
    }

    pub fn pay_fine(&self, loan: LoanId, actor: &Actor) -> Result<Loan> {
        let loan = self.fines.mark_paid(loan, actor)?;
        self.events.publish(LendingEvent::FinePaid(loan.clone()));
        Ok(loan)
    }

    /// Promotes issued loans past due to overdue. Returns how many moved.
    pub fn sweep_overdue(&self) -> Result<usize> {
        let promoted = self.sweeper.sweep(self.clock.now())?;
        let count = promoted.len();
        for loan in promoted {
            self.events.publish(LendingEvent::LoanOverdue(loan));
        }
        Ok(count)
    }

    pub fn expire_reservations(&self) -> Result<usize> {
        self.reservations.expire_stale()
    }

    /// Overdue loans in `scope`, soonest due first. Sweeps before reading.
    pub fn list_overdue(&self, scope: Scope) -> Result<Vec<Loan>> {
        self.sweep_overdue()?;
        self.sweeper.overdue(|loan| scope.covers(loan.borrower))
    }

    /// Loans in `scope`, optionally of one status, newest first.
    pub fn list_loans(&self, scope: Scope, status: Option<LoanStatus>) -> Result<Vec<Loan>> {
        self.sweep_overdue()?;
        let mut loans = self.loans.select(|loan| {
            scope.covers(loan.borrower) && status.map_or(true, |s| loan.status == s)
        })?;
        loans.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    /// Reservations in `scope`, newest first. Expires stale holds before reading.
    pub fn list_reservations(
        &self,
        scope: Scope,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>> {
        self.expire_reservations()?;
        self.reservations.list(scope, status)
    }

    pub fn fines(&self, scope: Scope) -> Result<Vec<Loan>> {
        self.fines.fines(scope)
    }

    pub fn fine_summary(&self, scope: Scope) -> Result<FineSummary> {
        self.fines.summary(scope)
    }

    pub fn loan_stats(&self) -> Result<LoanStats> {
        self.sweep_overdue()?;
        let loans = self.loans.select(|_| true)?;
        let count = |status: LoanStatus| loans.iter().filter(|l| l.status == status).count();
        Ok(LoanStats {
            total: loans.len(),
            issued: count(LoanStatus::Issued),
            overdue: count(LoanStatus::Overdue),
            returned: count(LoanStatus::Returned),
        })
    }

    /// Asks the notification service to remind the borrower of loan `id`.
    ///
    /// Administrators only. Overdue loans get an overdue notice, others a
    /// plain reminder.
    pub fn send_reminder(&self, id: LoanId, actor: &Actor) -> Result<Notice> {
        if !actor.is_admin() {
            return Err(LendingError::Unauthorized {
                user: actor.id,
                action: "send reminders",
            });
        }

        let loan = self.lending.loan(id)?;
        if !loan.is_active() {
            return Err(LendingError::InvalidState(format!(
                "loan {} has already been returned",
                loan.id
            )));
        }

        let kind = if loan.status == LoanStatus::Overdue {
            NoticeKind::Overdue
        } else {
            NoticeKind::Reminder
        };
        let notice = Notice::for_loan(&loan, kind);
        self.events.publish(LendingEvent::ReminderRequested(notice));
        Ok(notice)
    }

    /// Queues a reminder for every active loan due on the day
    /// `reminder_lead` from now. Returns how many were queued.
    pub fn queue_due_reminders(&self) -> Result<usize> {
        let due = self
            .sweeper
            .due_soon(self.clock.now(), self.policy.reminder_lead)?;
        let count = due.len();
        for loan in due {
            self.events.publish(LendingEvent::ReminderRequested(Notice::for_loan(
                &loan,
                NoticeKind::Reminder,
            )));
        }
        Ok(count)
    }

    /// One scheduler pass: sweep overdue, expire holds, and send the day's
    /// due-date reminders the first time a given day is seen.
    pub fn run_scheduled(&self) -> Result<SweepReport> {
        let promoted = self.sweep_overdue()?;
        let expired = self.expire_reservations()?;

        let today = self.clock.now().date_naive();
        let reminded = self.remind_once_per_day(today, || self.queue_due_reminders())?;

        let report = SweepReport {
            promoted,
            expired,
            reminded,
        };
        debug!("Scheduled pass: {:?}", report);
        Ok(report)
    }

    /// Runs `queue` unless it already succeeded for `today`. A failed run
    /// leaves the day open for the next tick.
    fn remind_once_per_day<F>(&self, today: NaiveDate, queue: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        let mut last = self
            .last_reminder_day
            .lock()
            .map_err(|_| LendingError::poisoned("reminder schedule"))?;
        if *last == Some(today) {
            return Ok(0);
        }
        let queued = queue()?;
        *last = Some(today);
        Ok(queued)
    }

    /// Starts the periodic sweep on its own thread.
    pub fn spawn_scheduler(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> Result<SchedulerHandle> {
        let engine = Arc::clone(self);
        spawn_periodic("lending-scheduler", interval, move || {
            engine.run_scheduled().map(|_| ())
        })
    }

    /// Verifies `available == total - active loans` for every item.
    pub fn audit(&self) -> Result<()> {
        let active = self.loans.active_counts()?;
        for item in self.inventory.items()? {
            let on_loan = active.get(&item.id).copied().unwrap_or(0);
            if item.available_copies > item.total_copies || item.on_loan() != on_loan
            {
                error!(
                    "CONSISTENCY VIOLATION: item {} has {}/{} available but {} active loan(s)",
                    item.id, item.available_copies, item.total_copies, on_loan
                );
                return Err(LendingError::Consistency(format!(
                    "item {} has {} of {} copies available with {} active loan(s)",
                    item.id, item.available_copies, item.total_copies, on_loan
                )));
            }
        }
        Ok(())
    }
}

impl Default for LendingEngine {
    fn default() -> Self {
        Self::new(LendingPolicy::default())
    }
}
