//! Company entity - the tenant that owns cards, transactions and controls.
//!
//! Every card lookup is scoped by the owning company, so the company ID is
//! the authorization boundary for the whole ledger.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a company account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// May queue and issue cards
    Active,
    /// Temporarily barred from issuing cards
    Suspended,
    /// Closed account
    Inactive,
}

impl CompanyStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Inactive => "inactive",
        }
    }
}

/// Company database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "companies")]
pub struct Model {
    /// Unique identifier for the company
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Registered company name
    pub name: String,
    /// Contact email, unique across companies
    #[sea_orm(unique)]
    pub email: String,
    /// Optional postal address
    pub address: Option<String>,
    /// Optional phone number
    pub phone: Option<String>,
    /// One of `"active"`, `"suspended"`, `"inactive"`
    pub status: String,
    /// When the company was registered
    pub created_at: DateTimeUtc,
    /// Last modification time
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Whether the company may currently queue and issue cards.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CompanyStatus::Active.as_str()
    }
}

/// Defines relationships between Company and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One company owns many cards
    #[sea_orm(has_many = "super::card::Entity")]
    Cards,
    /// One company has many queued card issuance rows
    #[sea_orm(has_many = "super::card_to_issue::Entity")]
    CardsToIssue,
}

impl Related<super::card::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cards.def()
    }
}

impl Related<super::card_to_issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CardsToIssue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
