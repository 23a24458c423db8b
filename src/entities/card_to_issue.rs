//! Card-to-issue entity - an employee row queued for bulk issuance.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Row waiting for `issue_pending_cards`
pub const STATUS_PENDING: &str = "pending";
/// Row whose card has been created
pub const STATUS_GENERATED: &str = "generated";

/// Card-to-issue database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cards_to_issue")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Company the card will belong to
    pub company_id: Uuid,
    /// Pre-generated ID the issued card will carry
    pub card_id: Uuid,
    /// Employee the card is for
    pub employee_id: Uuid,
    /// Employee email
    pub employee_email: String,
    /// `"pending"` or `"generated"`
    pub status: String,
    /// When the row was queued
    pub created_at: DateTimeUtc,
    /// Last modification time
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `CardToIssue` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each row belongs to one company
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
