//! Late-fee computation, settlement and totals.
//!
//! Fines live on the loan record itself (`fine`, `fine_paid`); the totals
//! here are read projections over the loan store.

use crate::actor::Actor;
use crate::error::{LendingError, Result};
use crate::loan::Loan;
use crate::money::Money;
use crate::store::{LoanStore, Scope};
use crate::LoanId;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

/// Started days between `due_at` and `returned_at`; zero when on time.
pub fn days_late(due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> u32 {
    let seconds = (returned_at - due_at).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    let days = (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// `ceil(days late) * rate`, never negative.
pub fn compute_fine(due_at: DateTime<Utc>, returned_at: DateTime<Utc>, rate: Money) -> Money {
    rate.times(days_late(due_at, returned_at))
}

/// Paid and outstanding fine totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FineSummary {
    pub unpaid: Money,
    pub paid: Money,
}

#[derive(Debug)]
pub struct FineLedger {
    loans: Arc<LoanStore>,
    rate: Money,
}

impl FineLedger {
    pub fn new(loans: Arc<LoanStore>, rate: Money) -> Self {
        FineLedger { loans, rate }
    }

    /// Fine owed for a loan due at `due_at` and returned at `returned_at`.
    pub fn assess(&self, due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> Money {
        compute_fine(due_at, returned_at, self.rate)
    }

    /// Marks the fine on `loan_id` as paid. Administrators only.
    pub fn mark_paid(&self, loan_id: LoanId, actor: &Actor) -> Result<Loan> {
        if !actor.is_admin() {
            return Err(LendingError::Unauthorized {
                user: actor.id,
                action: "settle fines",
            });
        }

        let loan = self.loans.update(loan_id, |loan| {
            if loan.fine.is_zero() {
                return Err(LendingError::NoFine { loan: loan.id });
            }
            if loan.fine_paid {
                return Err(LendingError::AlreadyPaid { loan: loan.id });
            }
            loan.fine_paid = true;
            Ok(())
        })?;

        debug!(
            "Fine of {} on loan {} settled by admin {}",
            loan.fine, loan.id, actor.id
        );
        Ok(loan)
    }

    /// Loans carrying a fine, paid or not, newest first.
    pub fn fines(&self, scope: Scope) -> Result<Vec<Loan>> {
        let mut fined = self
            .loans
            .select(|loan| scope.covers(loan.borrower) && !loan.fine.is_zero())?;
        fined.reverse();
        Ok(fined)
    }

    pub fn summary(&self, scope: Scope) -> Result<FineSummary> {
        let fined = self.fines(scope)?;
        Ok(FineSummary {
            unpaid: fined
                .iter()
                .filter(|l| !l.fine_paid)
                .map(|l| l.fine)
                .sum(),
            paid: fined.iter().filter(|l| l.fine_paid).map(|l| l.fine).sum(),
        })
    }

    pub fn total_unpaid(&self, scope: Scope) -> Result<Money> {
        Ok(self.summary(scope)?.unpaid)
    }

    pub fn total_paid(&self, scope: Scope) -> Result<Money> {
        Ok(self.summary(scope)?.paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::str::FromStr;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn ledger_with_returned_loan(fine: Money) -> (FineLedger, LoanId) {
        let loans = Arc::new(LoanStore::new());
        let loan = loans.insert_active(1, 7, day(1), day(10)).unwrap();
        loans
            .update(loan.id, |l| {
                l.close(day(15), fine);
                Ok(())
            })
            .unwrap();
        (FineLedger::new(loans, Money::units(5)), loan.id)
    }

    #[test]
    fn test_five_days_late_at_five_per_day() {
        let fine = compute_fine(day(10), day(15), Money::units(5));
        assert_eq!(fine.to_string(), "25.00");
    }

    #[test]
    fn test_partial_days_round_up() {
        let rate = Money::from_str("0.50").unwrap();
        assert_eq!(compute_fine(day(10), day(10) + Duration::minutes(1), rate).to_string(), "0.50");
        assert_eq!(compute_fine(day(10), day(11) + Duration::hours(1), rate).to_string(), "1.00");
    }

    #[test]
    fn test_on_time_or_early_is_free() {
        assert_eq!(compute_fine(day(10), day(10), Money::units(5)), Money::ZERO);
        assert_eq!(compute_fine(day(10), day(3), Money::units(5)), Money::ZERO);
    }

    #[test]
    fn test_mark_paid_requires_admin_and_a_fine() {
        let (ledger, id) = ledger_with_returned_loan(Money::units(25));

        let err = ledger.mark_paid(id, &Actor::member(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let paid = ledger.mark_paid(id, &Actor::admin(1)).unwrap();
        assert!(paid.fine_paid);

        let err = ledger.mark_paid(id, &Actor::admin(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyPaid);

        let err = ledger.mark_paid(999, &Actor::admin(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_mark_paid_without_fine() {
        let (ledger, id) = ledger_with_returned_loan(Money::ZERO);
        let err = ledger.mark_paid(id, &Actor::admin(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoFine);
    }

    #[test]
    fn test_summary_splits_paid_and_unpaid() {
        let (ledger, id) = ledger_with_returned_loan(Money::units(25));
        assert_eq!(ledger.total_unpaid(Scope::All).unwrap(), Money::units(25));
        assert_eq!(ledger.total_paid(Scope::Borrower(7)).unwrap(), Money::ZERO);

        ledger.mark_paid(id, &Actor::admin(1)).unwrap();
        let summary = ledger.summary(Scope::Borrower(7)).unwrap();
        assert_eq!(summary.unpaid, Money::ZERO);
        assert_eq!(summary.paid, Money::units(25));

        assert_eq!(ledger.summary(Scope::Borrower(8)).unwrap(), FineSummary::default());
    }

    proptest! {
        #[test]
        fn prop_fine_is_whole_days_times_rate(late_secs in 0i64..10_000_000, cents in 0i64..10_000) {
            let rate = Money::new(rust_decimal::Decimal::new(cents, 2));
            let due = day(1);
            let fine = compute_fine(due, due + Duration::seconds(late_secs), rate);
            let days = (late_secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
            prop_assert!(!fine.is_negative());
            prop_assert_eq!(fine, rate.times(days as u32));
        }

        #[test]
        fn prop_early_returns_are_free(early_secs in 0i64..10_000_000) {
            let due = day(20);
            prop_assert_eq!(compute_fine(due, due - Duration::seconds(early_secs), Money::units(3)), Money::ZERO);
        }
    }
}
