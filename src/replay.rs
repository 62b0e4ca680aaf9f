//! CSV replay of timestamped lending commands.
//!
//! Drives a [`LendingEngine`] on a [`ManualClock`] that is moved to each
//! row's timestamp before the command runs, so a replay is deterministic no
//! matter when it executes.

use crate::clock::{Clock, ManualClock};
use crate::command::{CommandKind, CommandRecord, ParsedCommand};
use crate::config::LendingPolicy;
use crate::engine::LendingEngine;
use crate::error::{LendingError, Result};
use crate::events::{DiscardEvents, EventSink};
use crate::store::Scope;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Which table the replay writes once the input is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Report {
    #[default]
    Loans,
    Items,
    Reservations,
}

impl FromStr for Report {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "loans" => Ok(Report::Loans),
            "items" => Ok(Report::Items),
            "reservations" => Ok(Report::Reservations),
            other => Err(LendingError::Validation(format!(
                "unknown report '{other}', expected loans, items or reservations"
            ))),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Loans => f.write_str("loans"),
            Report::Items => f.write_str("items"),
            Report::Reservations => f.write_str("reservations"),
        }
    }
}

/// Row counts from one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

#[derive(Debug)]
pub struct Replay {
    clock: Arc<ManualClock>,
    engine: LendingEngine,
}

impl Replay {
    pub fn new(policy: LendingPolicy) -> Self {
        Self::with_events(policy, Arc::new(DiscardEvents))
    }

    /// Creates a replay whose engine publishes to `events`.
    pub fn with_events(policy: LendingPolicy, events: Arc<dyn EventSink>) -> Self {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::default()));
        let engine = LendingEngine::with_parts(policy, clock.clone(), events);
        Replay { clock, engine }
    }

    pub fn engine(&self) -> &LendingEngine {
        &self.engine
    }

    /// Processes commands from a CSV reader in streaming fashion.
    ///
    /// Rows that fail to parse or that the engine rejects are logged at warn
    /// level and skipped.
    pub fn process_csv<R: Read>(&self, reader: R) -> Result<ReplaySummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = ReplaySummary::default();
        for (row_idx, result) in csv_reader.deserialize::<CommandRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = match result {
                Ok(record) => record
                    .parse()
                    .map_err(|message| LendingError::InvalidRecord {
                        row: row_num,
                        message,
                    })
                    .and_then(|cmd| self.apply(cmd, row_num)),
                Err(e) => Err(LendingError::Csv(e)),
            };

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!("Row {}: {}", row_num, e);
                    summary.rejected += 1;
                }
            }
        }

        debug!(
            "Replay finished: {} applied, {} rejected",
            summary.applied, summary.rejected
        );
        Ok(summary)
    }

    fn apply(&self, cmd: ParsedCommand, row: usize) -> Result<()> {
        if cmd.at < self.clock.now() {
            warn!(
                "Row {}: timestamp {} is earlier than the previous row",
                row,
                cmd.at.format(TIMESTAMP_FORMAT)
            );
        }
        self.clock.set(cmd.at);

        match cmd.kind {
            CommandKind::Stock { item, copies } => {
                self.engine.register_item(item, copies)?;
            }
            CommandKind::Issue {
                item,
                borrower,
                due,
            } => {
                self.engine.issue_book(item, borrower, due)?;
            }
            CommandKind::Return { loan, actor } => {
                self.engine.return_book(loan, &actor)?;
            }
            CommandKind::Reserve { item, borrower } => {
                self.engine.create_reservation(item, borrower)?;
            }
            CommandKind::Cancel { reservation, actor } => {
                self.engine.cancel_reservation(reservation, &actor)?;
            }
            CommandKind::PayFine { loan, actor } => {
                self.engine.pay_fine(loan, &actor)?;
            }
            CommandKind::Sweep => {
                let promoted = self.engine.sweep_overdue()?;
                debug!("Row {}: {} loan(s) now overdue", row, promoted);
            }
            CommandKind::Expire => {
                let expired = self.engine.expire_reservations()?;
                debug!("Row {}: {} reservation(s) expired", row, expired);
            }
            CommandKind::Remind { loan, actor } => {
                self.engine.send_reminder(loan, &actor)?;
            }
            CommandKind::RemindDue => {
                let queued = self.engine.queue_due_reminders()?;
                debug!("Row {}: {} reminder(s) queued", row, queued);
            }
        }
        Ok(())
    }

    pub fn write_report<W: Write>(&self, report: Report, writer: W) -> Result<()> {
        match report {
            Report::Loans => self.write_loans(writer),
            Report::Items => self.write_items(writer),
            Report::Reservations => self.write_reservations(writer),
        }
    }

    /// Writes every loan as CSV, sorted by loan id.
    ///
    /// Loans past due are promoted first, as at any other read.
    pub fn write_loans<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "loan", "item", "borrower", "status", "issued", "due", "returned", "fine",
            "fine_paid",
        ])?;

        let mut loans = self.engine.list_loans(Scope::All, None)?;
        loans.sort_by_key(|l| l.id);

        for loan in loans {
            csv_writer.write_record([
                loan.id.to_string(),
                loan.item.to_string(),
                loan.borrower.to_string(),
                loan.status.to_string(),
                timestamp(loan.issued_at),
                timestamp(loan.due_at),
                loan.returned_at.map(timestamp).unwrap_or_default(),
                loan.fine.to_string(),
                loan.fine_paid.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_items<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["item", "total", "available"])?;
        for item in self.engine.items()? {
            csv_writer.write_record([
                item.id.to_string(),
                item.total_copies.to_string(),
                item.available_copies.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes every reservation as CSV, sorted by reservation id. Stale holds
    /// are expired first.
    pub fn write_reservations<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "reservation",
            "item",
            "borrower",
            "status",
            "created",
            "expires",
        ])?;

        let mut reservations = self.engine.list_reservations(Scope::All, None)?;
        reservations.sort_by_key(|r| r.id);

        for r in reservations {
            csv_writer.write_record([
                r.id.to_string(),
                r.item.to_string(),
                r.borrower.to_string(),
                r.status.to_string(),
                timestamp(r.created_at),
                timestamp(r.expires_at),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
