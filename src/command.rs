//! Command models for CSV parsing and internal representation.

use crate::actor::{Actor, Role};
use crate::{ItemId, LoanId, ReservationId, UserId};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::str::FromStr;

/// Raw command record as read from CSV.
///
/// Every column except `type` and `at` is optional; which ones a command
/// needs depends on its type.
#[derive(Debug, Deserialize)]
pub struct CommandRecord {
    /// Command type: stock, issue, return, reserve, cancel, pay, sweep,
    /// expire, remind, remind_due
    #[serde(rename = "type")]
    pub cmd_type: String,

    /// When the command happens (RFC 3339 or YYYY-MM-DD)
    pub at: String,

    /// Acting user
    pub actor: Option<UserId>,

    /// Acting user's role: member (default) or admin
    pub role: Option<String>,

    pub item: Option<ItemId>,

    /// Borrower for issue/reserve; defaults to the actor
    pub borrower: Option<UserId>,

    /// Loan id for return/pay/remind, reservation id for cancel
    pub id: Option<u32>,

    /// Copy count for stock
    pub copies: Option<u32>,

    /// Optional due date for issue
    pub due: Option<String>,
}

impl CommandRecord {
    /// Parses the raw CSV record into a typed command.
    pub fn parse(&self) -> Result<ParsedCommand, String> {
        let at = parse_timestamp(&self.at)?;
        let cmd_type = self.cmd_type.trim().to_lowercase();

        let kind = match cmd_type.as_str() {
            "stock" => CommandKind::Stock {
                item: self.require(self.item, "item")?,
                copies: self.require(self.copies, "copies")?,
            },
            "issue" => CommandKind::Issue {
                item: self.require(self.item, "item")?,
                borrower: self.borrower_or_actor()?,
                due: self.parse_due()?,
            },
            "return" => CommandKind::Return {
                loan: self.require(self.id, "id")?,
                actor: self.actor()?,
            },
            "reserve" => CommandKind::Reserve {
                item: self.require(self.item, "item")?,
                borrower: self.borrower_or_actor()?,
            },
            "cancel" => CommandKind::Cancel {
                reservation: self.require(self.id, "id")?,
                actor: self.actor()?,
            },
            "pay" => CommandKind::PayFine {
                loan: self.require(self.id, "id")?,
                actor: self.actor()?,
            },
            "remind" => CommandKind::Remind {
                loan: self.require(self.id, "id")?,
                actor: self.actor()?,
            },
            "sweep" => CommandKind::Sweep,
            "expire" => CommandKind::Expire,
            "remind_due" => CommandKind::RemindDue,
            other => return Err(format!("unknown command type '{other}'")),
        };

        Ok(ParsedCommand { at, kind })
    }

    fn require<T: Copy>(&self, value: Option<T>, column: &str) -> Result<T, String> {
        value.ok_or_else(|| format!("'{}' needs the '{}' column", self.cmd_type.trim(), column))
    }

    fn actor(&self) -> Result<Actor, String> {
        let id = self.require(self.actor, "actor")?;
        let role = match &self.role {
            Some(role) => Role::from_str(role)?,
            None => Role::Member,
        };
        Ok(Actor { id, role })
    }

    fn borrower_or_actor(&self) -> Result<UserId, String> {
        self.borrower
            .or(self.actor)
            .ok_or_else(|| format!("'{}' needs a borrower or actor", self.cmd_type.trim()))
    }

    fn parse_due(&self) -> Result<Option<DateTime<Utc>>, String> {
        match self.due.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some),
        }
    }
}

/// Accepts RFC 3339 timestamps or bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("invalid timestamp '{trimmed}'"))
}

/// A parsed and validated command ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub at: DateTime<Utc>,
    pub kind: CommandKind,
}

/// Command variants with associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Register an item and its copy count.
    Stock { item: ItemId, copies: u32 },

    /// Lend a copy of `item` to `borrower`.
    Issue {
        item: ItemId,
        borrower: UserId,
        due: Option<DateTime<Utc>>,
    },

    Return { loan: LoanId, actor: Actor },

    /// Queue `borrower` for an unavailable item.
    Reserve { item: ItemId, borrower: UserId },

    Cancel {
        reservation: ReservationId,
        actor: Actor,
    },

    PayFine { loan: LoanId, actor: Actor },

    /// Promote loans past due to overdue.
    Sweep,

    /// Expire stale pending reservations.
    Expire,

    /// Manual reminder for one loan.
    Remind { loan: LoanId, actor: Actor },

    /// Scheduled reminders for loans due soon.
    RemindDue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cmd_type: &str) -> CommandRecord {
        CommandRecord {
            cmd_type: cmd_type.to_string(),
            at: "2024-01-10".to_string(),
            actor: None,
            role: None,
            item: None,
            borrower: None,
            id: None,
            copies: None,
            due: None,
        }
    }

    #[test]
    fn test_parse_stock() {
        let mut r = record("stock");
        r.item = Some(3);
        r.copies = Some(2);

        let parsed = r.parse().unwrap();
        assert_eq!(parsed.at, Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(parsed.kind, CommandKind::Stock { item: 3, copies: 2 });
    }

    #[test]
    fn test_issue_borrower_defaults_to_actor() {
        let mut r = record("issue");
        r.item = Some(3);
        r.actor = Some(9);
        r.due = Some(" 2024-01-20T12:00:00Z ".to_string());

        match r.parse().unwrap().kind {
            CommandKind::Issue {
                item,
                borrower,
                due,
            } => {
                assert_eq!(item, 3);
                assert_eq!(borrower, 9);
                assert_eq!(due, Some(Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()));
            }
            other => panic!("Expected Issue, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_return_with_admin_role() {
        let mut r = record("  Return ");
        r.id = Some(4);
        r.actor = Some(1);
        r.role = Some("admin".to_string());

        assert_eq!(
            r.parse().unwrap().kind,
            CommandKind::Return {
                loan: 4,
                actor: Actor::admin(1)
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_columns() {
        let mut r = record("return");
        r.actor = Some(1);
        assert!(r.parse().unwrap_err().contains("'id'"));

        let r = record("reserve");
        assert!(r.parse().is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_type_and_bad_time() {
        assert!(record("renew").parse().is_err());

        let mut r = record("sweep");
        r.at = "yesterday".to_string();
        assert!(r.parse().unwrap_err().contains("invalid timestamp"));
    }

    #[test]
    fn test_timestamp_with_offset_is_normalized() {
        let ts = parse_timestamp("2024-01-10T02:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
    }
}
