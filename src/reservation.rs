//! Reservation record: a queued claim on the next freed copy of an item.

use crate::{ItemId, ReservationId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item: ItemId,
    pub borrower: UserId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        item: ItemId,
        borrower: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Reservation {
            id,
            item,
            borrower,
            status: ReservationStatus::Pending,
            created_at,
            expires_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    /// Still claimable at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at > now
    }

    /// Moves a pending reservation to `to`. Returns `false` if it was not pending.
    pub fn settle(&mut self, to: ReservationStatus) -> bool {
        if !self.is_pending() || to == ReservationStatus::Pending {
            return false;
        }
        self.status = to;
        true
    }
}
