//! Lending Engine CLI
//!
//! Replays a CSV of timestamped lending commands and writes the resulting
//! loans, items or reservations as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > loans.csv
//! cargo run -- commands.csv items > items.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `LENDING_LOAN_DAYS`, `LENDING_HOLD_DAYS`, `LENDING_FINE_RATE`,
//!   `LENDING_RESERVE_ATTEMPTS`, `LENDING_REMINDER_DAYS`: lending policy

use lending_engine::{
    LendingError, LendingPolicy, LogNotifier, NotificationDispatcher, Replay, Report, Result,
};
use log::info;
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(LendingError::MissingArgument);
    }

    let input_path = &args[1];
    let report = match args.get(2) {
        Some(name) => name.parse::<Report>()?,
        None => Report::default(),
    };
    let policy = LendingPolicy::from_env()?;

    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let (sink, dispatcher) = NotificationDispatcher::spawn(Arc::new(LogNotifier))?;
    let replay = Replay::with_events(policy, Arc::new(sink));
    let summary = replay.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    replay.write_report(report, handle)?;

    let notices = dispatcher.shutdown();
    info!(
        "{} row(s) applied, {} rejected, {} notice(s) sent",
        summary.applied, summary.rejected, notices
    );
    Ok(())
}
