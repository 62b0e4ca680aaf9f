//! Loan record and its lifecycle transitions.
//!
//! `Issued -> Overdue -> Returned`, with a direct `Issued -> Returned` edge
//! for on-time returns. `Returned` is terminal.

use crate::money::Money;
use crate::{ItemId, LoanId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Issued,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Issued => "issued",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }

    /// Issued and overdue loans still hold a copy.
    pub fn is_active(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item lent to one borrower.
///
/// # Invariants
///
/// - `returned_at.is_some()` exactly when `status == Returned`
/// - `fine` is only non-zero on returned loans
/// - `fine_paid` implies a non-zero `fine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    pub id: LoanId,
    pub item: ItemId,
    pub borrower: UserId,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine: Money,
    pub fine_paid: bool,
}

impl Loan {
    pub fn new(
        id: LoanId,
        item: ItemId,
        borrower: UserId,
        issued_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Self {
        Loan {
            id,
            item,
            borrower,
            issued_at,
            due_at,
            returned_at: None,
            status: LoanStatus::Issued,
            fine: Money::ZERO,
            fine_paid: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn has_unpaid_fine(&self) -> bool {
        !self.fine.is_zero() && !self.fine_paid
    }

    /// Promotes an issued loan past its due date to overdue.
    ///
    /// Returns `false` (and changes nothing) for any other status or for a
    /// loan that is not yet due.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != LoanStatus::Issued || self.due_at >= now {
            return false;
        }
        self.status = LoanStatus::Overdue;
        true
    }

    /// Closes an active loan, attaching the fine owed for it.
    ///
    /// Returns `false` if the loan was already returned.
    pub fn close(&mut self, returned_at: DateTime<Utc>, fine: Money) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = LoanStatus::Returned;
        self.returned_at = Some(returned_at);
        self.fine = fine;
        true
    }
}
