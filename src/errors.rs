//! Unified error types for the card ledger.
//!
//! Every failure the crate can produce is a variant of [`Error`]. Callers that
//! need to decide how to surface a failure (HTTP status, retry, log level) use
//! [`Error::kind`], and [`Error::public_message`] for the text that is safe to
//! hand back to a client.

use crate::core::denial::Denial;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A card, company or transaction lookup missed
    NotFound,
    /// The caller does not own the resource it asked for
    Forbidden,
    /// A usability, sufficiency, limit or control-policy check refused the purchase
    Denied,
    /// The authoritative balance check rejected a purchase that passed pre-screening
    Conflict,
    /// The caller sent something malformed
    InvalidInput,
    /// Storage, configuration or control-payload failure
    Internal,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Card not found: {card_id}")]
    CardNotFound { card_id: Uuid },

    #[error("Company not found: {company_id}")]
    CompanyNotFound { company_id: Uuid },

    #[error("Transaction not found: {transaction_id}")]
    TransactionNotFound { transaction_id: Uuid },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Transaction denied: {}", .0.message())]
    Denied(Denial),

    /// Raised by the ledger when the locked balance cannot cover a debit.
    #[error("Insufficient balance on card {card_id}: available {available}, required {required}")]
    InsufficientBalance {
        card_id: Uuid,
        available: f64,
        required: f64,
    },

    /// The debit failed at commit time even though pre-screening passed.
    #[error("Balance changed before commit on card {card_id}: available {available}, required {required}")]
    CommitConflict {
        card_id: Uuid,
        available: f64,
        required: f64,
    },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Company already exists: {email}")]
    CompanyExists { email: String },

    #[error("Company {company_id} is not active")]
    CompanyInactive { company_id: Uuid },

    #[error("No pending cards to issue for company {company_id}")]
    NothingToIssue { company_id: Uuid },

    #[error("Invalid spending control configuration: {message}")]
    ControlConfig { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps the error onto the authorization failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CardNotFound { .. }
            | Self::CompanyNotFound { .. }
            | Self::TransactionNotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Denied(_) => ErrorKind::Denied,
            Self::CommitConflict { .. } => ErrorKind::Conflict,
            Self::InvalidAmount { .. }
            | Self::InvalidInput { .. }
            | Self::CompanyExists { .. }
            | Self::CompanyInactive { .. }
            | Self::NothingToIssue { .. } => ErrorKind::InvalidInput,
            Self::InsufficientBalance { .. }
            | Self::ControlConfig { .. }
            | Self::Config { .. }
            | Self::Timeout { .. }
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Text that may be shown to the end user.
    ///
    /// Conflicts and internal failures never leak their details; they are
    /// expected to be logged server-side by whoever handles the error.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Conflict | ErrorKind::Internal => {
                "The transaction could not be processed, please try again".to_string()
            }
            ErrorKind::Denied => match self {
                Self::Denied(denial) => denial.message(),
                _ => self.to_string(),
            },
            ErrorKind::NotFound | ErrorKind::Forbidden | ErrorKind::InvalidInput => {
                self.to_string()
            }
        }
    }

    /// The structured denial, if this error is an advisory denial.
    #[must_use]
    pub const fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Denied(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<Denial> for Error {
    fn from(denial: Denial) -> Self {
        Self::Denied(denial)
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
