//! Lifecycle tests for the lending engine.
//!
//! Exercises the public API end to end: concurrent issuing, fines,
//! reservation hand-off, overdue sweeps and the invariants tying them together.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lending_engine::{
    Actor, ErrorKind, LendingEngine, LendingEvent, LendingPolicy, LoanStatus, ManualClock, Money,
    NoticeKind, RecordingSink, ReservationStatus, Scope,
};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn engine_with_rate(rate: i64) -> (Arc<ManualClock>, Arc<RecordingSink>, LendingEngine) {
    let clock = Arc::new(ManualClock::new(start()));
    let events = Arc::new(RecordingSink::new());
    let policy = LendingPolicy::default().with_fine_rate(Money::units(rate));
    let engine = LendingEngine::with_parts(policy, clock.clone(), events.clone());
    (clock, events, engine)
}

// ==================== CONCRETE SCENARIOS ====================

#[test]
fn test_concurrent_issue_of_last_copy() {
    let (_, _, engine) = engine_with_rate(1);
    engine.register_item(1, 1).unwrap();
    let engine = Arc::new(engine);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [7, 8]
        .into_iter()
        .map(|borrower| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.issue_book(1, borrower, None)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let issued = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::OutOfStock))
        .count();

    assert_eq!(issued, 1);
    assert_eq!(out_of_stock, 1);
    assert_eq!(engine.item(1).unwrap().available_copies, 0);
    engine.audit().unwrap();
}

fn race<T, F>(threads: usize, work: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|n| {
            let work = work.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                work(n)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_issue_for_same_pair_releases_losing_copies() {
    for _ in 0..50 {
        let (_, _, engine) = engine_with_rate(1);
        engine.register_item(1, 10).unwrap();
        let engine = Arc::new(engine);

        let shared = engine.clone();
        let results = race(8, move |_| shared.issue_book(1, 7, None));

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::DuplicateActiveLoan));
        assert_eq!(engine.item(1).unwrap().available_copies, 9);
        engine.audit().unwrap();
    }
}

#[test]
fn test_sweep_racing_return_keeps_loan_returned() {
    for _ in 0..50 {
        let (clock, _, engine) = engine_with_rate(1);
        engine.register_item(1, 1).unwrap();
        let loan = engine
            .issue_book(1, 7, Some(start() + Duration::days(1)))
            .unwrap();
        clock.advance(Duration::days(2));
        let engine = Arc::new(engine);

        let shared = engine.clone();
        let results = race(2, move |n| {
            if n == 0 {
                shared.sweep_overdue().map(|_| ())
            } else {
                shared.return_book(loan.id, &Actor::member(7)).map(|_| ())
            }
        });

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(engine.loan(loan.id).unwrap().status, LoanStatus::Returned);
        assert_eq!(engine.item(1).unwrap().available_copies, 1);
        engine.audit().unwrap();
    }
}

#[test]
fn test_concurrent_reservations_for_same_pair() {
    for _ in 0..50 {
        let (_, _, engine) = engine_with_rate(1);
        engine.register_item(1, 1).unwrap();
        engine.issue_book(1, 5, None).unwrap();
        let engine = Arc::new(engine);

        let shared = engine.clone();
        let results = race(6, move |_| shared.create_reservation(1, 7));

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::DuplicateReservation));
        let pending = engine
            .list_reservations(Scope::Borrower(7), Some(ReservationStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
    }
}

#[test]
fn test_late_return_fine() {
    let (clock, _, engine) = engine_with_rate(5);
    engine.register_item(1, 1).unwrap();

    let due = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let loan = engine.issue_book(1, 7, Some(due)).unwrap();
    clock.set(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());

    let returned = engine.return_book(loan.id, &Actor::member(7)).unwrap();
    assert_eq!(returned.fine, Money::units(25));
    assert_eq!(returned.fine.to_string(), "25.00");
    assert!(!returned.fine_paid);
}

#[test]
fn test_oldest_reservation_is_fulfilled_first() {
    let (clock, events, engine) = engine_with_rate(1);
    engine.register_item(1, 1).unwrap();
    let loan = engine.issue_book(1, 5, None).unwrap();

    clock.advance(Duration::hours(1));
    let a = engine.create_reservation(1, 7).unwrap();
    clock.advance(Duration::hours(1));
    let b = engine.create_reservation(1, 8).unwrap();
    events.take();

    clock.advance(Duration::days(1));
    engine.return_book(loan.id, &Actor::member(5)).unwrap();

    assert_eq!(
        engine.reservation(a.id).unwrap().status,
        ReservationStatus::Fulfilled
    );
    assert_eq!(
        engine.reservation(b.id).unwrap().status,
        ReservationStatus::Pending
    );
    assert_eq!(engine.item(1).unwrap().available_copies, 1);

    let fulfilled: Vec<_> = events
        .take()
        .into_iter()
        .filter_map(|e| match e {
            LendingEvent::ReservationFulfilled(r) => Some(r.borrower),
            _ => None,
        })
        .collect();
    assert_eq!(fulfilled, vec![7]);
}

#[test]
fn test_sweep_twice_promotes_once() {
    let (clock, events, engine) = engine_with_rate(1);
    engine.register_item(1, 1).unwrap();
    let loan = engine
        .issue_book(1, 7, Some(start() + Duration::days(3)))
        .unwrap();
    clock.advance(Duration::days(4));
    events.take();

    assert_eq!(engine.sweep_overdue().unwrap(), 1);
    assert_eq!(engine.loan(loan.id).unwrap().status, LoanStatus::Overdue);

    assert_eq!(engine.sweep_overdue().unwrap(), 0);
    assert_eq!(engine.loan(loan.id).unwrap().status, LoanStatus::Overdue);

    let overdue_notices = events
        .take()
        .iter()
        .filter_map(|e| e.notice())
        .filter(|n| n.kind == NoticeKind::Overdue)
        .count();
    assert_eq!(overdue_notices, 1);
}

// ==================== ROUND TRIPS ====================

#[test]
fn test_on_time_round_trip_conserves_copies() {
    let (clock, _, engine) = engine_with_rate(3);
    engine.register_item(1, 4).unwrap();
    let before = engine.item(1).unwrap().available_copies;

    let loan = engine.issue_book(1, 7, None).unwrap();
    assert_eq!(engine.item(1).unwrap().available_copies, before - 1);

    clock.set(loan.due_at);
    let returned = engine.return_book(loan.id, &Actor::member(7)).unwrap();
    assert!(returned.fine.is_zero());
    assert_eq!(engine.item(1).unwrap().available_copies, before);
}

#[test]
fn test_overdue_loan_can_still_be_returned() {
    let (clock, _, engine) = engine_with_rate(2);
    engine.register_item(1, 1).unwrap();
    let loan = engine.issue_book(1, 7, None).unwrap();

    clock.advance(Duration::days(20));
    engine.sweep_overdue().unwrap();

    let returned = engine.return_book(loan.id, &Actor::admin(1)).unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.fine, Money::units(12));
    assert_eq!(engine.item(1).unwrap().available_copies, 1);
}

// ==================== BUSINESS RULES ====================

#[test]
fn test_reservation_rules() {
    let (_, _, engine) = engine_with_rate(1);
    engine.register_item(1, 1).unwrap();

    let err = engine.create_reservation(1, 7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemAvailable);

    let err = engine.create_reservation(99, 7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    engine.issue_book(1, 5, None).unwrap();
    engine.create_reservation(1, 7).unwrap();
    let err = engine.create_reservation(1, 7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReservation);
}

#[test]
fn test_fine_payment_rules() {
    let (clock, _, engine) = engine_with_rate(1);
    engine.register_item(1, 2).unwrap();
    let on_time = engine.issue_book(1, 7, None).unwrap();
    let late = engine
        .issue_book(1, 8, Some(start() + Duration::days(1)))
        .unwrap();
    clock.advance(Duration::days(2));
    engine.return_book(on_time.id, &Actor::member(7)).unwrap();
    engine.return_book(late.id, &Actor::member(8)).unwrap();

    let admin = Actor::admin(1);
    assert_eq!(
        engine.pay_fine(on_time.id, &admin).unwrap_err().kind(),
        ErrorKind::NoFine
    );
    assert_eq!(engine.pay_fine(99, &admin).unwrap_err().kind(), ErrorKind::NotFound);

    engine.pay_fine(late.id, &admin).unwrap();
    assert_eq!(
        engine.pay_fine(late.id, &admin).unwrap_err().kind(),
        ErrorKind::AlreadyPaid
    );

    let summary = engine.fine_summary(Scope::All).unwrap();
    assert!(summary.unpaid.is_zero());
    assert_eq!(summary.paid, Money::units(1));
}

#[test]
fn test_returned_pair_may_borrow_again() {
    let (_, _, engine) = engine_with_rate(1);
    engine.register_item(1, 2).unwrap();
    let first = engine.issue_book(1, 7, None).unwrap();
    engine.return_book(first.id, &Actor::member(7)).unwrap();

    let second = engine.issue_book(1, 7, None).unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(engine.item(1).unwrap().available_copies, 1);
}

#[test]
fn test_stale_reservations_expire_on_read() {
    let (clock, _, engine) = engine_with_rate(1);
    engine.register_item(1, 1).unwrap();
    engine.issue_book(1, 5, None).unwrap();
    engine.create_reservation(1, 7).unwrap();

    clock.advance(engine.policy().reservation_hold + Duration::minutes(1));
    let listed = engine.list_reservations(Scope::Borrower(7), None).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ReservationStatus::Expired);

    // An expired hold no longer blocks a fresh one.
    engine.create_reservation(1, 7).unwrap();
}

// ==================== INVARIANTS ====================

#[derive(Debug, Clone)]
enum Op {
    Issue { item: u32, borrower: u32 },
    Return { loan: u32, borrower: u32 },
    Reserve { item: u32, borrower: u32 },
    Advance { hours: i64 },
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..4, 1u32..5).prop_map(|(item, borrower)| Op::Issue { item, borrower }),
        (1u32..12, 1u32..5).prop_map(|(loan, borrower)| Op::Return { loan, borrower }),
        (1u32..4, 1u32..5).prop_map(|(item, borrower)| Op::Reserve { item, borrower }),
        (1i64..240).prop_map(|hours| Op::Advance { hours }),
        Just(Op::Sweep),
    ]
}

proptest! {
    #[test]
    fn prop_copy_counts_match_active_loans(ops in prop::collection::vec(op(), 1..60)) {
        let (clock, _, engine) = engine_with_rate(1);
        for item in 1..4 {
            engine.register_item(item, item).unwrap();
        }

        for op in ops {
            // Business-rule rejections are expected; only invariants matter here.
            let _ = match op {
                Op::Issue { item, borrower } => engine.issue_book(item, borrower, None).map(|_| ()),
                Op::Return { loan, borrower } => {
                    engine.return_book(loan, &Actor::member(borrower)).map(|_| ())
                }
                Op::Reserve { item, borrower } => {
                    engine.create_reservation(item, borrower).map(|_| ())
                }
                Op::Advance { hours } => {
                    clock.advance(Duration::hours(hours));
                    Ok(())
                }
                Op::Sweep => engine.sweep_overdue().map(|_| ()),
            };

            prop_assert!(engine.audit().is_ok());
            for item in engine.items().unwrap() {
                prop_assert!(item.available_copies <= item.total_copies);
            }

            let active = engine
                .list_loans(Scope::All, None)
                .unwrap()
                .into_iter()
                .filter(|l| l.is_active())
                .map(|l| (l.borrower, l.item))
                .collect::<Vec<_>>();
            let mut unique = active.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), active.len());

            let pending = engine
                .list_reservations(Scope::All, Some(ReservationStatus::Pending))
                .unwrap()
                .into_iter()
                .map(|r| (r.borrower, r.item))
                .collect::<Vec<_>>();
            let mut unique = pending.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), pending.len());
        }
    }
}
