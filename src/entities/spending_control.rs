//! Spending control entity - a per-card policy row.
//!
//! `control_value` is stored as JSON and only interpreted through
//! [`crate::core::policy::ControlValue`]. At most one active row per
//! `(card_id, control_type)` is maintained by the upsert in
//! [`crate::core::spending_control`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Spending control database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spending_controls")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Card the control applies to
    pub card_id: Uuid,
    /// `"merchant_category"`, `"time_based"`, `"merchant_name"` or `"location"`
    pub control_type: String,
    /// Type-specific JSON payload
    pub control_value: Json,
    /// Inactive rows are kept but never evaluated
    pub is_active: bool,
    /// When the control was first set
    pub created_at: DateTimeUtc,
    /// When the control was last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `SpendingControl` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each control belongs to one card
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
