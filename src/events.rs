//! Lifecycle events and borrower notifications.
//!
//! Components publish a [`LendingEvent`] after a transition has been
//! committed. Delivery to borrowers happens on a separate dispatcher thread,
//! so a failing [`Notifier`] can never undo or block the transition.

use crate::error::Result;
use crate::loan::Loan;
use crate::reservation::Reservation;
use crate::{ItemId, UserId};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt::{self, Debug};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LendingEvent {
    LoanIssued(Loan),
    LoanReturned(Loan),
    LoanOverdue(Loan),
    FinePaid(Loan),
    ReservationCreated(Reservation),
    ReservationFulfilled(Reservation),
    ReservationCancelled(Reservation),
    ReservationExpired(Reservation),
    ReminderRequested(Notice),
}

impl LendingEvent {
    /// The borrower notice this event calls for, if any.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            LendingEvent::LoanOverdue(loan) => Some(Notice::for_loan(loan, NoticeKind::Overdue)),
            LendingEvent::ReminderRequested(notice) => Some(*notice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Reminder,
    Overdue,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::Reminder => f.write_str("reminder"),
            NoticeKind::Overdue => f.write_str("overdue"),
        }
    }
}

/// What the notification collaborator needs to reach a borrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub borrower: UserId,
    pub item: ItemId,
    pub due_at: DateTime<Utc>,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn for_loan(loan: &Loan, kind: NoticeKind) -> Self {
        Notice {
            borrower: loan.borrower,
            item: loan.item,
            due_at: loan.due_at,
            kind,
        }
    }
}

/// Receives events after the transition that produced them has committed.
pub trait EventSink: Debug + Send + Sync {
    fn publish(&self, event: LendingEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEvents;

impl EventSink for DiscardEvents {
    fn publish(&self, _event: LendingEvent) {}
}

/// Keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LendingEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything recorded so far.
    pub fn take(&self) -> Vec<LendingEvent> {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *events)
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: LendingEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

/// Forwards events to a [`NotificationDispatcher`] thread.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Mutex<mpsc::Sender<LendingEvent>>,
}

impl EventSink for ChannelSink {
    fn publish(&self, event: LendingEvent) {
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        if tx.send(event).is_err() {
            warn!("Notification dispatcher has stopped; event dropped");
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery of borrower notices (email and friends).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice) -> std::result::Result<(), NotifyError>;
}

/// Writes notices to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) -> std::result::Result<(), NotifyError> {
        info!(
            "Notice ({}) to borrower {}: item {} due {}",
            notice.kind,
            notice.borrower,
            notice.item,
            notice.due_at.format("%Y-%m-%d")
        );
        Ok(())
    }
}

/// Handle to stop the dispatcher thread.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<usize>>,
}

impl DispatcherHandle {
    /// Delivers whatever is already queued, stops the thread and returns the
    /// number of notices delivered over its lifetime.
    pub fn shutdown(mut self) -> usize {
        let _ = self.shutdown.send(());
        self.join
            .take()
            .and_then(|j| j.join().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// Spawns the delivery thread and returns the sink that feeds it.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Result<(ChannelSink, DispatcherHandle)> {
        let (event_tx, event_rx) = mpsc::channel::<LendingEvent>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("notification-dispatcher".to_string())
            .spawn(move || dispatch_loop(event_rx, shutdown_rx, notifier.as_ref()))?;

        Ok((
            ChannelSink {
                tx: Mutex::new(event_tx),
            },
            DispatcherHandle {
                shutdown: shutdown_tx,
                join: Some(join),
            },
        ))
    }
}

fn dispatch_loop(
    events: mpsc::Receiver<LendingEvent>,
    shutdown: mpsc::Receiver<()>,
    notifier: &dyn Notifier,
) -> usize {
    let tick = Duration::from_millis(100);
    let mut delivered = 0;

    loop {
        if shutdown.try_recv().is_ok() {
            while let Ok(event) = events.try_recv() {
                delivered += deliver(notifier, &event);
            }
            break;
        }

        match events.recv_timeout(tick) {
            Ok(event) => delivered += deliver(notifier, &event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    delivered
}

fn deliver(notifier: &dyn Notifier, event: &LendingEvent) -> usize {
    let Some(notice) = event.notice() else {
        debug!("Event without notice: {:?}", event);
        return 0;
    };

    match notifier.notify(&notice) {
        Ok(()) => 1,
        Err(e) => {
            warn!(
                "Failed to notify borrower {} about item {}: {}",
                notice.borrower, notice.item, e
            );
            0
        }
    }
}
