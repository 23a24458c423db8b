//! Card ledger - owns card balances, limits and status.
//!
//! Every lookup is scoped by company: a card that belongs to another company
//! is indistinguishable from a missing one. The balance is only ever lowered
//! by [`debit`], which must run inside the caller's database transaction and
//! is the single authoritative "sufficient funds" check.

use crate::{
    core::transaction::{self as store, NewTransaction},
    entities::{
        Card, card,
        card::CardStatus,
        transaction::{TransactionStatus, TransactionType},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

fn validate_optional_limit(limit: Option<f64>) -> Result<()> {
    limit.map_or(Ok(()), validate_amount)
}

/// Finds a card by ID within a company, returning None if it is missing or
/// owned by someone else.
pub async fn find_card<C>(db: &C, company_id: Uuid, card_id: Uuid) -> Result<Option<card::Model>>
where
    C: ConnectionTrait,
{
    Card::find_by_id(card_id)
        .filter(card::Column::CompanyId.eq(company_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a card by `(company_id, card_id)`.
///
/// # Errors
/// `CardNotFound` if the card does not exist or belongs to a different company.
pub async fn get_card<C>(db: &C, company_id: Uuid, card_id: Uuid) -> Result<card::Model>
where
    C: ConnectionTrait,
{
    find_card(db, company_id, card_id)
        .await?
        .ok_or(Error::CardNotFound { card_id })
}

/// Lists all cards of a company, newest first.
pub async fn list_cards(db: &DatabaseConnection, company_id: Uuid) -> Result<Vec<card::Model>> {
    Card::find()
        .filter(card::Column::CompanyId.eq(company_id))
        .order_by_desc(card::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lowers a card's balance by `amount` inside the caller's transaction.
///
/// The card row is read with an exclusive lock, then decremented with a guarded
/// `UPDATE ... WHERE balance >= amount`. Under concurrency this is the only check
/// that can be trusted; upstream balance checks are advisory.
///
/// # Returns
/// The card as it is after the debit.
///
/// # Errors
/// * `CardNotFound` - no card with this ID
/// * `InsufficientBalance` - the locked balance is lower than `amount`
pub async fn debit<C>(txn: &C, card_id: Uuid, amount: f64) -> Result<card::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let locked = Card::find_by_id(card_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or(Error::CardNotFound { card_id })?;

    if locked.balance < amount {
        return Err(Error::InsufficientBalance {
            card_id,
            available: locked.balance,
            required: amount,
        });
    }

    let result = Card::update_many()
        .col_expr(
            card::Column::Balance,
            Expr::col(card::Column::Balance).sub(amount),
        )
        .col_expr(card::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(card::Column::Id.eq(card_id))
        .filter(card::Column::Balance.gte(amount))
        .exec(txn)
        .await?;

    if result.rows_affected != 1 {
        return Err(Error::InsufficientBalance {
            card_id,
            available: locked.balance,
            required: amount,
        });
    }

    Card::find_by_id(card_id)
        .one(txn)
        .await?
        .ok_or(Error::CardNotFound { card_id })
}

/// Raises a card's balance by `amount` inside the caller's transaction.
pub async fn credit<C>(txn: &C, card_id: Uuid, amount: f64) -> Result<card::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    let result = Card::update_many()
        .col_expr(
            card::Column::Balance,
            Expr::col(card::Column::Balance).add(amount),
        )
        .col_expr(card::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(card::Column::Id.eq(card_id))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::CardNotFound { card_id });
    }

    Card::find_by_id(card_id)
        .one(txn)
        .await?
        .ok_or(Error::CardNotFound { card_id })
}

/// Loads funds onto a card, recording a completed `charge` transaction.
///
/// Charges are part of the audit trail but never count toward daily or
/// monthly spend.
pub async fn fund_card(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    amount: f64,
) -> Result<card::Model> {
    validate_amount(amount)?;
    get_card(db, company_id, card_id).await?;

    let txn = db.begin().await?;

    let record = store::create_transaction(
        &txn,
        NewTransaction {
            card_id,
            company_id,
            transaction_type: TransactionType::Charge,
            amount,
            merchant_name: None,
            merchant_category: None,
            description: "Card top-up".to_string(),
        },
    )
    .await?;
    let card = credit(&txn, card_id, amount).await?;
    store::update_transaction_status(&txn, record.id, TransactionStatus::Completed).await?;

    txn.commit().await?;

    tracing::info!(%card_id, amount, balance = card.balance, "Card funded");
    Ok(card)
}

/// Overwrites the per-transaction spending limit and returns the refreshed card.
pub async fn set_spending_limit(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    spending_limit: f64,
) -> Result<card::Model> {
    validate_amount(spending_limit)?;

    let card = get_card(db, company_id, card_id).await?;

    let mut active_model: card::ActiveModel = card.into();
    active_model.spending_limit = Set(Some(spending_limit));
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map_err(Into::into)
}

/// Overwrites the daily and monthly caps. `None` removes a cap.
pub async fn set_period_limits(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    daily_limit: Option<f64>,
    monthly_limit: Option<f64>,
) -> Result<card::Model> {
    validate_optional_limit(daily_limit)?;
    validate_optional_limit(monthly_limit)?;

    let card = get_card(db, company_id, card_id).await?;

    let mut active_model: card::ActiveModel = card.into();
    active_model.daily_limit = Set(daily_limit);
    active_model.monthly_limit = Set(monthly_limit);
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map_err(Into::into)
}

/// Blocks a card. Blocked cards are refused at the usability stage with the
/// given reason.
pub async fn block_card(
    db: &DatabaseConnection,
    company_id: Uuid,
    card_id: Uuid,
    reason: Option<String>,
) -> Result<card::Model> {
    let card = get_card(db, company_id, card_id).await?;
    let now = Utc::now();

    let mut active_model: card::ActiveModel = card.into();
    active_model.status = Set(CardStatus::Blocked.as_str().to_string());
    active_model.blocked_at = Set(Some(now));
    active_model.blocked_reason = Set(reason);
    active_model.updated_at = Set(now);
    let card = active_model.update(db).await?;

    tracing::info!(%card_id, "Card blocked");
    Ok(card)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_get_card_scoped_by_company() -> Result<()> {
        let (db, company, card) = setup_with_card(100.0).await?;
        let other = create_test_company(&db, "Other Co", "other@example.test").await?;

        let found = get_card(&db, company.id, card.id).await?;
        assert_eq!(found.id, card.id);

        let result = get_card(&db, other.id, card.id).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));

        let result = get_card(&db, company.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_debit_lowers_balance() -> Result<()> {
        let (db, _company, card) = setup_with_card(150.0).await?;

        let txn = db.begin().await?;
        let debited = debit(&txn, card.id, 100.0).await?;
        txn.commit().await?;

        assert_eq!(debited.balance, 50.0);
        let reloaded = Card::find_by_id(card.id).one(&db).await?.unwrap();
        assert_eq!(reloaded.balance, 50.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_debit_rejects_overdraft() -> Result<()> {
        let (db, _company, card) = setup_with_card(50.0).await?;

        let txn = db.begin().await?;
        let result = debit(&txn, card.id, 50.01).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance {
                available: 50.0,
                required: 50.01,
                ..
            })
        ));
        txn.rollback().await?;

        let reloaded = Card::find_by_id(card.id).one(&db).await?.unwrap();
        assert_eq!(reloaded.balance, 50.0);

        Ok(())
    }

    #[tokio::test]
    async fn test_debit_exact_balance_reaches_zero() -> Result<()> {
        let (db, _company, card) = setup_with_card(75.0).await?;

        let txn = db.begin().await?;
        let debited = debit(&txn, card.id, 75.0).await?;
        txn.commit().await?;

        assert_eq!(debited.balance, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_missing_card() -> Result<()> {
        let db = setup_test_db().await?;
        let txn = db.begin().await?;
        let result = debit(&txn, Uuid::new_v4(), 10.0).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_spending_limit_round_trip() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        let updated = set_spending_limit(&db, company.id, card.id, 2000.0).await?;
        assert_eq!(updated.spending_limit, Some(2000.0));

        let reloaded = get_card(&db, company.id, card.id).await?;
        assert_eq!(reloaded.spending_limit, Some(2000.0));

        let result = set_spending_limit(&db, company.id, card.id, -5.0).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: -5.0 })));

        Ok(())
    }

    #[tokio::test]
    async fn test_set_period_limits() -> Result<()> {
        let (db, company, card) = setup_with_card(0.0).await?;

        let updated = set_period_limits(&db, company.id, card.id, Some(500.0), Some(3000.0)).await?;
        assert_eq!(updated.daily_limit, Some(500.0));
        assert_eq!(updated.monthly_limit, Some(3000.0));

        let cleared = set_period_limits(&db, company.id, card.id, None, Some(3000.0)).await?;
        assert_eq!(cleared.daily_limit, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_limit_updates_are_company_scoped() -> Result<()> {
        let (db, _company, card) = setup_with_card(0.0).await?;
        let other = create_test_company(&db, "Other Co", "other@example.test").await?;

        let result = set_spending_limit(&db, other.id, card.id, 10.0).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));

        let result = set_period_limits(&db, other.id, card.id, Some(10.0), None).await;
        assert!(matches!(result, Err(Error::CardNotFound { .. })));

        let unchanged = Card::find_by_id(card.id).one(&db).await?.unwrap();
        assert_eq!(unchanged.spending_limit, None);
        assert_eq!(unchanged.daily_limit, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_fund_card_records_charge() -> Result<()> {
        let (db, company, card) = setup_with_card(10.0).await?;

        let funded = fund_card(&db, company.id, card.id, 90.0).await?;
        assert_eq!(funded.balance, 100.0);

        let history = store::list_by_card(&db, card.id, 10, 0).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_type, "charge");
        assert_eq!(history[0].status, "completed");

        Ok(())
    }

    #[tokio::test]
    async fn test_block_card() -> Result<()> {
        let (db, company, card) = setup_with_card(10.0).await?;

        let blocked = block_card(&db, company.id, card.id, Some("lost".to_string())).await?;
        assert_eq!(blocked.card_status(), Some(CardStatus::Blocked));
        assert_eq!(blocked.blocked_reason.as_deref(), Some("lost"));
        assert!(blocked.blocked_at.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_list_cards_only_returns_company_cards() -> Result<()> {
        let (db, company, card) = setup_with_card(10.0).await?;
        let other = create_test_company(&db, "Other Co", "other@example.test").await?;
        TestCard::new(other.id).insert(&db).await?;

        let cards = list_cards(&db, company.id).await?;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, card.id);

        Ok(())
    }
}
