//! Transaction entity - the append-only audit trail of card activity.
//!
//! Once inserted, `amount`, `card_id` and `company_id` never change; only
//! `status`, `processed_at` and `updated_at` transition. Rows are never deleted.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Card-present purchase, debits the card
    Purchase,
    /// Funds loaded onto the card, credits it
    Charge,
}

impl TransactionType {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Charge => "charge",
        }
    }
}

/// Processing state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Inserted, not yet settled against the balance
    Pending,
    /// Balance updated and committed
    Completed,
    /// Abandoned
    Failed,
}

impl TransactionStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Card the transaction was made with
    pub card_id: Uuid,
    /// Owning company, denormalized for company-wide queries
    pub company_id: Uuid,
    /// `"purchase"` or `"charge"`
    pub transaction_type: String,
    /// Always positive
    pub amount: f64,
    /// Optional merchant name
    pub merchant_name: Option<String>,
    /// Merchant category the purchase was made in
    pub merchant_category: Option<String>,
    /// Human-readable description
    pub description: String,
    /// `"pending"`, `"completed"` or `"failed"`
    pub status: String,
    /// When the status last transitioned
    pub processed_at: Option<DateTimeUtc>,
    /// When the transaction was recorded
    pub created_at: DateTimeUtc,
    /// Last modification time
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one card
    #[sea_orm(
        belongs_to = "super::card::Entity",
        from = "Column::CardId",
        to = "super::card::Column::Id"
    )]
    Card,
}

impl Related<super::card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Card.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
