//! Card entity - a virtual corporate payment card.
//!
//! The card row owns the balance and all per-card limits. It is the single
//! point of write contention in the system: every completed purchase
//! decrements `balance` under a row lock.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a card. Cards are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Usable for purchases
    Active,
    /// Blocked by an administrator, see `blocked_reason`
    Blocked,
    /// Marked expired
    Expired,
    /// Permanently cancelled
    Cancelled,
}

impl CardStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the database representation, `None` for unknown values.
    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Only virtual cards are issued.
pub const CARD_TYPE_VIRTUAL: &str = "virtual";

/// Card database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    /// Unique identifier for the card
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning company
    pub company_id: Uuid,
    /// 16-digit card number
    pub card_number: String,
    /// Name printed on the card
    pub card_holder_name: String,
    /// Employee identifier supplied at issuance
    pub employee_id: String,
    /// Employee email supplied at issuance
    pub employee_email: String,
    /// Always `"virtual"` for now
    pub card_type: String,
    /// One of `"active"`, `"blocked"`, `"expired"`, `"cancelled"`
    pub status: String,
    /// Available funds, never negative
    pub balance: f64,
    /// Maximum amount of a single purchase
    pub spending_limit: Option<f64>,
    /// Maximum completed purchase volume per business day
    pub daily_limit: Option<f64>,
    /// Maximum completed purchase volume per business month
    pub monthly_limit: Option<f64>,
    /// The card is unusable from this instant on
    pub expiry_date: DateTimeUtc,
    /// SHA-256 hex digest of the CVV; the raw CVV is never stored
    pub cvv_hash: String,
    /// Last four digits of `card_number`
    pub last_four: String,
    /// When the card was issued
    pub created_at: DateTimeUtc,
    /// Last modification time
    pub updated_at: DateTimeUtc,
    /// When the card was blocked, if it is
    pub blocked_at: Option<DateTimeUtc>,
    /// Why the card was blocked, if it is
    pub blocked_reason: Option<String>,
}

impl Model {
    /// Parsed status, `None` if the stored value is unknown.
    #[must_use]
    pub fn card_status(&self) -> Option<CardStatus> {
        CardStatus::from_db(&self.status)
    }
}

/// Defines relationships between Card and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each card belongs to one company
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
    /// One card has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
    /// One card has many spending controls
    #[sea_orm(has_many = "super::spending_control::Entity")]
    SpendingControls,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::spending_control::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SpendingControls.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
