//! Lending policy knobs and their environment overrides.

use crate::money::Money;
use chrono::Duration;
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LOAN_DAYS: i64 = 14;
pub const DEFAULT_HOLD_DAYS: i64 = 7;
pub const DEFAULT_REMINDER_DAYS: i64 = 2;
pub const DEFAULT_RESERVE_ATTEMPTS: u32 = 5;
pub const DEFAULT_FINE_RATE: &str = "1.00";

/// Policy applied by every component of the engine.
#[derive(Debug, Clone)]
pub struct LendingPolicy {
    /// Loan length used when `issue` is called without a due date.
    pub loan_period: Duration,
    /// How long a pending reservation stays claimable.
    pub reservation_hold: Duration,
    /// Fine charged per (started) day late.
    pub fine_rate: Money,
    /// Compare-and-swap attempts on a contended copy counter before giving up.
    pub reserve_attempts: u32,
    /// How far ahead of the due date the scheduled reminder goes out.
    pub reminder_lead: Duration,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period: Duration::days(DEFAULT_LOAN_DAYS),
            reservation_hold: Duration::days(DEFAULT_HOLD_DAYS),
            fine_rate: Money::units(1),
            reserve_attempts: DEFAULT_RESERVE_ATTEMPTS,
            reminder_lead: Duration::days(DEFAULT_REMINDER_DAYS),
        }
    }
}

impl LendingPolicy {
    /// Defaults overridden by any `LENDING_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a policy from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::default();

        if let Some(days) = parse_var::<i64, _>(&lookup, "LENDING_LOAN_DAYS")? {
            policy.loan_period = positive_days("LENDING_LOAN_DAYS", days)?;
        }
        if let Some(days) = parse_var::<i64, _>(&lookup, "LENDING_HOLD_DAYS")? {
            policy.reservation_hold = positive_days("LENDING_HOLD_DAYS", days)?;
        }
        if let Some(days) = parse_var::<i64, _>(&lookup, "LENDING_REMINDER_DAYS")? {
            if days < 0 {
                return Err(invalid("LENDING_REMINDER_DAYS", days, "must not be negative"));
            }
            policy.reminder_lead = Duration::days(days);
        }
        if let Some(rate) = parse_var::<Money, _>(&lookup, "LENDING_FINE_RATE")? {
            if rate.is_negative() {
                return Err(invalid("LENDING_FINE_RATE", rate, "must not be negative"));
            }
            policy.fine_rate = rate;
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "LENDING_RESERVE_ATTEMPTS")? {
            if attempts == 0 {
                return Err(invalid("LENDING_RESERVE_ATTEMPTS", attempts, "must be at least 1"));
            }
            policy.reserve_attempts = attempts;
        }

        Ok(policy)
    }

    pub fn with_fine_rate(mut self, rate: Money) -> Self {
        self.fine_rate = rate;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn positive_days(key: &str, days: i64) -> Result<Duration, ConfigError> {
    if days <= 0 {
        return Err(invalid(key, days, "must be at least 1 day"));
    }
    Ok(Duration::days(days))
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
