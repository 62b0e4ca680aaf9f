//! Overdue promotion and the periodic task that drives it.

use crate::error::Result;
use crate::loan::{Loan, LoanStatus};
use crate::store::LoanStore;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

/// Promotes issued loans past their due date to overdue.
///
/// Touches nothing but loan status: no inventory, no fines, no notifications.
/// The promotion is conditioned on the loan still being issued inside the
/// store's write lock, so a loan returned concurrently stays returned.
#[derive(Debug)]
pub struct OverdueSweeper {
    loans: Arc<LoanStore>,
}

impl OverdueSweeper {
    pub fn new(loans: Arc<LoanStore>) -> Self {
        OverdueSweeper { loans }
    }

    /// Returns the loans promoted by this pass; empty when re-run with no
    /// intervening activity.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Loan>> {
        let promoted = self.loans.promote_overdue(now)?;
        if !promoted.is_empty() {
            debug!("Sweep at {} promoted {} loan(s) to overdue", now, promoted.len());
        }
        Ok(promoted)
    }

    /// Active loans due on the calendar day `lead` after `now`.
    pub fn due_soon(&self, now: DateTime<Utc>, lead: Duration) -> Result<Vec<Loan>> {
        let target = (now + lead).date_naive();
        self.loans
            .select(|loan| loan.is_active() && loan.due_at.date_naive() == target)
    }

    /// Overdue loans, soonest due first.
    pub fn overdue(&self, filter: impl Fn(&Loan) -> bool) -> Result<Vec<Loan>> {
        let mut overdue = self
            .loans
            .select(|loan| loan.status == LoanStatus::Overdue && filter(loan))?;
        overdue.sort_by_key(|loan| (loan.due_at, loan.id));
        Ok(overdue)
    }
}

/// Handle to a running periodic task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<u64>>,
}

impl SchedulerHandle {
    /// Stops the task and waits for the tick in progress, if any. Returns the
    /// number of ticks run.
    pub fn shutdown(mut self) -> u64 {
        let _ = self.shutdown.send(());
        self.join
            .take()
            .and_then(|j| j.join().ok())
            .unwrap_or(0)
    }
}

/// Runs `tick` every `interval` on its own thread until shut down.
///
/// A failed tick is logged and retried wholesale on the next interval.
pub fn spawn_periodic<F>(
    name: &str,
    interval: std::time::Duration,
    mut tick: F,
) -> Result<SchedulerHandle>
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let task = name.to_string();

    let join = thread::Builder::new().name(task.clone()).spawn(move || {
        info!("{} started, interval {:?}", task, interval);
        let mut ticks = 0u64;
        loop {
            match shutdown_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    ticks += 1;
                    if let Err(e) = tick() {
                        warn!("{} tick {} failed: {}", task, ticks, e);
                    }
                }
            }
        }
        info!("{} stopped after {} tick(s)", task, ticks);
        ticks
    })?;

    Ok(SchedulerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
    })
}
