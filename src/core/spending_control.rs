//! Spending control persistence.
//!
//! A card keeps at most one active control per control type. Setting a
//! control of a type the card already has overwrites the payload of the
//! existing row; rows are never deleted, only deactivated.
//!
//! The lookup-then-insert in [`upsert_spending_control`] runs while holding
//! the card row lock, so concurrent upserts for the same card serialise on the
//! same lock purchases use.

use crate::{
    core::{
        card::get_card,
        policy::{ControlType, ControlValue},
    },
    entities::{Card, SpendingControl, card, spending_control},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};

async fn find_active<C>(
    db: &C,
    card_id: Uuid,
    control_type: ControlType,
) -> Result<Option<spending_control::Model>>
where
    C: ConnectionTrait,
{
    SpendingControl::find()
        .filter(spending_control::Column::CardId.eq(card_id))
        .filter(spending_control::Column::ControlType.eq(control_type.as_str()))
        .filter(spending_control::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Inserts or overwrites the active control of `value`'s type, using the
/// caller's transaction. The card row must already be locked by the caller.
pub(crate) async fn upsert_in<C>(
    db: &C,
    card_id: Uuid,
    value: &ControlValue,
) -> Result<spending_control::Model>
where
    C: ConnectionTrait,
{
    value.validate()?;
    let payload = value.to_payload()?;
    let control_type = value.control_type();
    let now = Utc::now();

    let model = if let Some(existing) = find_active(db, card_id, control_type).await? {
        let mut active_model: spending_control::ActiveModel = existing.into();
        active_model.control_value = Set(payload);
        active_model.updated_at = Set(now);
        active_model.update(db).await?
    } else {
        spending_control::ActiveModel {
            id: Set(Uuid::new_v4()),
            card_id: Set(card_id),
            control_type: Set(control_type.as_str().to_string()),
            control_value: Set(payload),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?
    };

    Ok(model)
}

/// Sets a spending control on a card.
///
/// If the card already has an active control of the same type its payload is
/// replaced, otherwise a new active row is created.
///
/// # Errors
/// * `CardNotFound` - no card with this ID in the company
/// * `ControlConfig` - the payload does not validate (e.g. a malformed `HH:MM`)
pub async fn upsert_spending_control(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    value: ControlValue,
) -> Result<spending_control::Model> {
    value.validate()?;

    let txn = db.begin().await?;

    Card::find_by_id(card_id)
        .filter(card::Column::CompanyId.eq(company_id))
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(Error::CardNotFound { card_id })?;

    let model = upsert_in(&txn, card_id, &value).await?;
    txn.commit().await?;

    tracing::info!(%card_id, control_type = %value.control_type(), "Spending control set");
    Ok(model)
}

/// Active control rows of a card, oldest first.
pub async fn active_controls<C>(db: &C, card_id: Uuid) -> Result<Vec<spending_control::Model>>
where
    C: ConnectionTrait,
{
    SpendingControl::find()
        .filter(spending_control::Column::CardId.eq(card_id))
        .filter(spending_control::Column::IsActive.eq(true))
        .order_by_asc(spending_control::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active controls of a card decoded into typed values.
///
/// # Errors
/// `ControlConfig` if any stored row cannot be decoded; evaluation must then
/// fail closed rather than skip the row.
pub async fn active_control_values<C>(db: &C, card_id: Uuid) -> Result<Vec<ControlValue>>
where
    C: ConnectionTrait,
{
    active_controls(db, card_id)
        .await?
        .iter()
        .map(|row| ControlValue::from_stored(&row.control_type, &row.control_value))
        .collect()
}

/// Deactivates the card's active control of `control_type`.
///
/// # Returns
/// `true` if a row was deactivated.
///
/// # Errors
/// `CardNotFound` if the card is not one of the company's.
pub async fn deactivate_control(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    control_type: ControlType,
) -> Result<bool> {
    get_card(db, company_id, card_id).await?;

    let result = SpendingControl::update_many()
        .col_expr(spending_control::Column::IsActive, Expr::value(false))
        .col_expr(spending_control::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(spending_control::Column::CardId.eq(card_id))
        .filter(spending_control::Column::ControlType.eq(control_type.as_str()))
        .filter(spending_control::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::policy::{MerchantCategoryRule, TimeWindowRule};
    use crate::test_utils::*;
    use serde_json::json;

    fn allow_only(category: &str) -> ControlValue {
        ControlValue::MerchantCategory(MerchantCategoryRule {
            allowed_categories: vec![category.to_string()],
            blocked_categories: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        let first = upsert_spending_control(&db, company.id, card.id, allow_only("food")).await?;
        assert!(first.is_active);
        assert_eq!(first.control_type, "merchant_category");

        let second = upsert_spending_control(&db, company.id, card.id, allow_only("travel")).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(
            second.control_value,
            json!({"allowed_categories": ["travel"], "blocked_categories": []})
        );

        let rows = active_controls(&db, card.id).await?;
        assert_eq!(rows.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_one_active_row_per_type() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        upsert_spending_control(&db, company.id, card.id, allow_only("food")).await?;
        upsert_spending_control(
            &db,
            company.id,
            card.id,
            ControlValue::TimeBased(TimeWindowRule {
                start_time: "09:00".to_string(),
                end_time: "18:00".to_string(),
            }),
        )
        .await?;
        upsert_spending_control(&db, company.id, card.id, allow_only("travel")).await?;

        let values = active_control_values(&db, card.id).await?;
        assert_eq!(values.len(), 2);
        assert!(values.contains(&allow_only("travel")));

        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_rejects_malformed_window() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        let result = upsert_spending_control(
            &db,
            company.id,
            card.id,
            ControlValue::TimeBased(TimeWindowRule {
                start_time: "9am".to_string(),
                end_time: "18:00".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(Error::ControlConfig { .. })));
        assert!(active_controls(&db, card.id).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_control_admin_is_company_scoped() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;
        let other = create_test_company(&db, "Other Co", "other@example.test").await?;

        let result = upsert_spending_control(&db, company.id, Uuid::new_v4(), allow_only("food")).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));

        let result = upsert_spending_control(&db, other.id, card.id, allow_only("food")).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));
        assert!(active_controls(&db, card.id).await?.is_empty());

        upsert_spending_control(&db, company.id, card.id, allow_only("food")).await?;
        let result = deactivate_control(&db, other.id, card.id, ControlType::MerchantCategory).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));
        assert_eq!(active_controls(&db, card.id).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_deactivate_then_upsert_creates_new_row() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        let original = upsert_spending_control(&db, company.id, card.id, allow_only("food")).await?;
        assert!(deactivate_control(&db, company.id, card.id, ControlType::MerchantCategory).await?);
        assert!(!deactivate_control(&db, company.id, card.id, ControlType::MerchantCategory).await?);
        assert!(active_controls(&db, card.id).await?.is_empty());

        let replacement = upsert_spending_control(&db, company.id, card.id, allow_only("food")).await?;
        assert_ne!(replacement.id, original.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_stored_payload_fails_closed() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;
        insert_raw_control(&db, card.id, "time_based", json!({"start_time": 9})).await?;

        let result = active_control_values(&db, card.id).await;
        assert!(matches!(result, Err(Error::ControlConfig { .. })));

        Ok(())
    }
}
