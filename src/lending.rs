//! Loan lifecycle: issue and return.

use crate::actor::Actor;
use crate::clock::Clock;
use crate::error::{LendingError, Result};
use crate::events::{EventSink, LendingEvent};
use crate::fines::FineLedger;
use crate::inventory::InventoryLedger;
use crate::loan::Loan;
use crate::reservations::ReservationQueue;
use crate::store::LoanStore;
use crate::{ItemId, LoanId, UserId};
use chrono::{DateTime, Duration, Utc};
use log::{debug, error};
use std::sync::Arc;

/// Drives loans through `issued -> (overdue) -> returned`.
///
/// On return the copy is released to the inventory before the reservation
/// queue is advanced, so a fulfilled reservation always has a copy behind it.
#[derive(Debug)]
pub struct LendingStateMachine {
    inventory: Arc<InventoryLedger>,
    loans: Arc<LoanStore>,
    fines: Arc<FineLedger>,
    reservations: Arc<ReservationQueue>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    loan_period: Duration,
}

impl LendingStateMachine {
    pub fn new(
        inventory: Arc<InventoryLedger>,
        loans: Arc<LoanStore>,
        fines: Arc<FineLedger>,
        reservations: Arc<ReservationQueue>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        loan_period: Duration,
    ) -> Self {
        LendingStateMachine {
            inventory,
            loans,
            fines,
            reservations,
            clock,
            events,
            loan_period,
        }
    }

    /// Lends one copy of `item` to `borrower`.
    ///
    /// `due_at` defaults to now plus the configured loan period.
    pub fn issue(
        &self,
        item: ItemId,
        borrower: UserId,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Loan> {
        let now = self.clock.now();
        let due_at = due_at.unwrap_or(now + self.loan_period);
        if due_at <= now {
            return Err(LendingError::Validation(format!(
                "due date {} is not after the issue date {}",
                due_at.to_rfc3339(),
                now.to_rfc3339()
            )));
        }

        // Fast rejection; the store re-checks under its lock below.
        if self.loans.has_active(borrower, item)? {
            return Err(LendingError::DuplicateActiveLoan { borrower, item });
        }

        let remaining = self.inventory.reserve_copy(item)?;

        let loan = match self.loans.insert_active(item, borrower, now, due_at) {
            Ok(loan) => loan,
            Err(e) => {
                // Lost the race to a concurrent issue for the same pair.
                self.inventory.release_copy(item)?;
                return Err(e);
            }
        };

        debug!(
            "Loan {}: item {} issued to borrower {} until {} ({} copies left)",
            loan.id,
            item,
            borrower,
            due_at.format("%Y-%m-%d"),
            remaining
        );
        self.events.publish(LendingEvent::LoanIssued(loan.clone()));
        Ok(loan)
    }

    /// Closes loan `id`, charging a fine if it is late.
    pub fn return_loan(&self, id: LoanId, actor: &Actor) -> Result<Loan> {
        let now = self.clock.now();

        let loan = self.loans.update(id, |loan| {
            if !loan.is_active() {
                return Err(LendingError::InvalidState(format!(
                    "loan {} has already been returned",
                    loan.id
                )));
            }
            if !actor.may_act_for(loan.borrower) {
                return Err(LendingError::Unauthorized {
                    user: actor.id,
                    action: "return this loan",
                });
            }
            let fine = self.fines.assess(loan.due_at, now);
            loan.close(now, fine);
            Ok(())
        })?;

        if let Err(e) = self.inventory.release_copy(loan.item) {
            error!(
                "Loan {} closed but its copy of item {} could not be released: {}",
                loan.id, loan.item, e
            );
            return Err(e);
        }

        debug!(
            "Loan {}: item {} returned by borrower {}, fine {}",
            loan.id, loan.item, loan.borrower, loan.fine
        );
        self.events.publish(LendingEvent::LoanReturned(loan.clone()));

        // The return is committed; a queue failure must not report it as failed.
        if let Err(e) = self.reservations.fulfill_next(loan.item) {
            error!(
                "Loan {} returned but the reservation queue for item {} was not advanced: {}",
                loan.id, loan.item, e
            );
        }
        Ok(loan)
    }

    pub fn loan(&self, id: LoanId) -> Result<Loan> {
        self.loans.get(id)
    }
}
