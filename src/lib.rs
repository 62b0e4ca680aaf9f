//! # Lending Engine
//!
//! The lending lifecycle core of a library: copy inventory, loans,
//! reservations, overdue fines and the periodic sweep that keeps them honest.
//!
//! ## Design Principles
//!
//! - **No overselling**: copy counts move through a bounded compare-and-swap
//!   loop, so `0 <= available <= total` holds under any interleaving
//! - **One active loan per borrower and item**: enforced by a uniqueness index
//!   inside the loan store, not by a read-then-write check
//! - **Fixed-point money**: fines use `rust_decimal` at 2 decimal places
//! - **Injected time**: every component reads a [`Clock`], so tests and replays
//!   are deterministic
//! - **Fire-and-forget notices**: events go to an [`EventSink`]; delivery
//!   failures never undo a committed transition
//!
//! ## Example
//!
//! ```no_run
//! use lending_engine::{Actor, LendingEngine, LendingPolicy};
//!
//! let engine = LendingEngine::new(LendingPolicy::default());
//! engine.register_item(1, 2).unwrap();
//! let loan = engine.issue_book(1, 42, None).unwrap();
//! engine.return_book(loan.id, &Actor::member(42)).unwrap();
//! ```

pub mod actor;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fines;
pub mod inventory;
pub mod item;
pub mod lending;
pub mod loan;
pub mod money;
pub mod replay;
pub mod reservation;
pub mod reservations;
pub mod store;
pub mod sweeper;

pub type ItemId = u32;
pub type UserId = u32;
pub type LoanId = u32;
pub type ReservationId = u32;

pub use actor::{Actor, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{CommandKind, CommandRecord, ParsedCommand};
pub use config::{ConfigError, LendingPolicy};
pub use engine::{LendingEngine, LoanStats, SweepReport};
pub use error::{ErrorKind, LendingError, Result};
pub use events::{
    ChannelSink, DispatcherHandle, EventSink, LendingEvent, LogNotifier, Notice, NoticeKind,
    NotificationDispatcher, Notifier, RecordingSink,
};
pub use fines::{compute_fine, FineSummary};
pub use item::Item;
pub use loan::{Loan, LoanStatus};
pub use money::Money;
pub use replay::{Replay, ReplaySummary, Report};
pub use reservation::{Reservation, ReservationStatus};
pub use store::Scope;
pub use sweeper::SchedulerHandle;
