//! Error types for the lending engine.

use crate::config::ConfigError;
use crate::{ItemId, LoanId, ReservationId, UserId};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, LendingError>;

/// The kind of record a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Item,
    Loan,
    Reservation,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Item => "item",
            Entity::Loan => "loan",
            Entity::Reservation => "reservation",
        }
    }
}

/// Errors that can occur during engine operation.
///
/// Business-rule failures are returned to the caller as-is and never retried.
/// `Consistency` means an invariant was already broken upstream.
#[derive(Error, Debug)]
pub enum LendingError {
    #[error("{} {id} not found", entity.as_str())]
    NotFound { entity: Entity, id: u32 },

    #[error("no available copies of item {item}")]
    OutOfStock { item: ItemId },

    #[error("borrower {borrower} already has item {item} on loan")]
    DuplicateActiveLoan { borrower: UserId, item: ItemId },

    #[error("borrower {borrower} already has a pending reservation for item {item}")]
    DuplicateReservation { borrower: UserId, item: ItemId },

    #[error("item {item} is currently available, borrow it directly")]
    ItemAvailable { item: ItemId },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("user {user} is not authorized to {action}")]
    Unauthorized { user: UserId, action: &'static str },

    #[error("loan {loan} has no fine to pay")]
    NoFine { loan: LoanId },

    #[error("fine on loan {loan} is already paid")]
    AlreadyPaid { loan: LoanId },

    #[error("validation error: {0}")]
    Validation(String),

    /// A defensive invariant check failed.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid command record
    #[error("Invalid command at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Missing input file argument
    #[error("Missing input file argument. Usage: lending-engine <commands.csv> [loans|items|reservations]")]
    MissingArgument,
}

/// Stable, machine-readable classification of a [`LendingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    OutOfStock,
    DuplicateActiveLoan,
    DuplicateReservation,
    ItemAvailable,
    InvalidState,
    Unauthorized,
    NoFine,
    AlreadyPaid,
    ValidationError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::OutOfStock => "out_of_stock",
            ErrorKind::DuplicateActiveLoan => "duplicate_active_loan",
            ErrorKind::DuplicateReservation => "duplicate_reservation",
            ErrorKind::ItemAvailable => "item_available",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NoFine => "no_fine",
            ErrorKind::AlreadyPaid => "already_paid",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::NotFound { .. } => ErrorKind::NotFound,
            LendingError::OutOfStock { .. } => ErrorKind::OutOfStock,
            LendingError::DuplicateActiveLoan { .. } => ErrorKind::DuplicateActiveLoan,
            LendingError::DuplicateReservation { .. } => ErrorKind::DuplicateReservation,
            LendingError::ItemAvailable { .. } => ErrorKind::ItemAvailable,
            LendingError::InvalidState(_) => ErrorKind::InvalidState,
            LendingError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LendingError::NoFine { .. } => ErrorKind::NoFine,
            LendingError::AlreadyPaid { .. } => ErrorKind::AlreadyPaid,
            LendingError::Validation(_)
            | LendingError::InvalidRecord { .. }
            | LendingError::MissingArgument
            | LendingError::Config(_) => ErrorKind::ValidationError,
            LendingError::Consistency(_) | LendingError::Io(_) | LendingError::Csv(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn loan_not_found(id: LoanId) -> Self {
        LendingError::NotFound {
            entity: Entity::Loan,
            id,
        }
    }

    pub(crate) fn item_not_found(id: ItemId) -> Self {
        LendingError::NotFound {
            entity: Entity::Item,
            id,
        }
    }

    pub(crate) fn reservation_not_found(id: ReservationId) -> Self {
        LendingError::NotFound {
            entity: Entity::Reservation,
            id,
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        LendingError::Consistency(format!("{what} lock poisoned"))
    }
}
