//! Structured advisory denials.
//!
//! A [`Denial`] is produced by the pre-screening stages of the authorization
//! pipeline (usability, sufficiency, caps, spending controls). Each variant
//! carries the figures a client needs to explain the refusal; serializing a
//! [`DenialResponse`] yields `{reason_category, message, ...context}`.

use crate::core::policy::ControlType;
use chrono::NaiveDate;
use serde::Serialize;

/// Spend figures reported when a daily or monthly cap would be exceeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitBreach {
    /// The configured cap
    pub limit: f64,
    /// Completed purchases so far in the period
    pub current_spending: f64,
    /// Amount of the refused purchase
    pub transaction_amount: f64,
    /// `current_spending + transaction_amount`
    pub total_would_be: f64,
    /// `limit - current_spending`
    pub remaining_limit: f64,
}

impl LimitBreach {
    pub(crate) fn new(limit: f64, current_spending: f64, transaction_amount: f64) -> Self {
        Self {
            limit,
            current_spending,
            transaction_amount,
            total_would_be: current_spending + transaction_amount,
            remaining_limit: limit - current_spending,
        }
    }
}

/// Why a purchase was refused before any money moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason_category", rename_all = "snake_case")]
pub enum Denial {
    /// Card status is not `active`
    CardInactive {
        /// The stored status
        status: String,
        /// Status-specific explanation, including the block reason if any
        detail: String,
    },
    /// Card is past its expiry date
    CardExpired {
        /// The card's expiry date
        expiry_date: NaiveDate,
    },
    /// Balance does not cover the purchase
    InsufficientBalance {
        /// Current balance
        available_balance: f64,
        /// Requested amount
        required_amount: f64,
        /// `required_amount - available_balance`
        shortage: f64,
    },
    /// Purchase exceeds the per-transaction limit
    SpendingLimitExceeded {
        /// Per-transaction limit
        spending_limit: f64,
        /// Requested amount
        amount: f64,
    },
    /// Purchase would exceed the daily cap
    DailyLimitExceeded(LimitBreach),
    /// Purchase would exceed the monthly cap
    MonthlyLimitExceeded(LimitBreach),
    /// A spending control refused the purchase
    ControlViolation {
        /// The refusing control
        control_type: ControlType,
        /// Human-readable reason
        reason: String,
        /// Category of the refused purchase
        merchant_category: String,
        /// Time of day the purchase was evaluated at, `HH:MM`
        current_time: String,
        /// Business timezone the time is expressed in
        timezone: String,
    },
}

impl Denial {
    /// Machine-readable reason, identical to the serialized `reason_category`.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::CardInactive { .. } => "card_inactive",
            Self::CardExpired { .. } => "card_expired",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::SpendingLimitExceeded { .. } => "spending_limit_exceeded",
            Self::DailyLimitExceeded(_) => "daily_limit_exceeded",
            Self::MonthlyLimitExceeded(_) => "monthly_limit_exceeded",
            Self::ControlViolation { .. } => "control_violation",
        }
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::CardInactive { detail, .. } => detail.clone(),
            Self::CardExpired { .. } => "Card has expired".to_string(),
            Self::InsufficientBalance { .. } => "Insufficient balance".to_string(),
            Self::SpendingLimitExceeded { .. } => "Transaction exceeds spending limit".to_string(),
            Self::DailyLimitExceeded(_) => "Transaction would exceed daily limit".to_string(),
            Self::MonthlyLimitExceeded(_) => "Transaction would exceed monthly limit".to_string(),
            Self::ControlViolation { reason, .. } => reason.clone(),
        }
    }

    /// Wraps the denial for serialization to a client.
    #[must_use]
    pub fn to_response(&self) -> DenialResponse<'_> {
        DenialResponse {
            message: self.message(),
            denial: self,
        }
    }
}

/// Client-facing view of a [`Denial`].
#[derive(Debug, Serialize)]
pub struct DenialResponse<'a> {
    /// Human-readable message
    pub message: String,
    /// Category tag and context figures
    #[serde(flatten)]
    pub denial: &'a Denial,
}
