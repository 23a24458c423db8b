//! Transaction store - the append-only record of card activity.
//!
//! Records are inserted as `pending` and only their status moves afterwards.
//! Spend-to-date aggregation counts completed purchases inside the current
//! business day or month, where "day" and "month" are taken in the single
//! canonical business timezone also used for time-of-day controls.

use crate::{
    entities::{
        Transaction, transaction,
        transaction::{TransactionStatus, TransactionType},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr};

/// Fields of a transaction supplied by the caller; the store fills in the
/// identity, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Card the transaction is made with
    pub card_id: Uuid,
    /// Owning company
    pub company_id: Uuid,
    /// Purchase or charge
    pub transaction_type: TransactionType,
    /// Positive amount
    pub amount: f64,
    /// Optional merchant name
    pub merchant_name: Option<String>,
    /// Optional merchant category
    pub merchant_category: Option<String>,
    /// Human-readable description
    pub description: String,
}

/// Inserts a new `pending` transaction stamped with the current time.
pub async fn create_transaction<C>(db: &C, new: NewTransaction) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    create_transaction_at(db, new, Utc::now()).await
}

/// Inserts a new `pending` transaction with `created_at = now`.
///
/// Spend-to-date windows are matched against `created_at`, so a record made
/// while evaluating at `now` counts toward the business day of `now`.
pub async fn create_transaction_at<C>(
    db: &C,
    new: NewTransaction,
    now: DateTime<Utc>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    if !new.amount.is_finite() || new.amount <= 0.0 {
        return Err(Error::InvalidAmount { amount: new.amount });
    }

    let record = transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        card_id: Set(new.card_id),
        company_id: Set(new.company_id),
        transaction_type: Set(new.transaction_type.as_str().to_string()),
        amount: Set(new.amount),
        merchant_name: Set(new.merchant_name),
        merchant_category: Set(new.merchant_category),
        description: Set(new.description),
        status: Set(TransactionStatus::Pending.as_str().to_string()),
        processed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    record.insert(db).await.map_err(Into::into)
}

/// Moves a transaction to `status` and stamps `processed_at`.
///
/// Updating an ID that does not exist is not an error; callers must not use
/// this to detect missing records.
pub async fn update_transaction_status<C>(
    db: &C,
    transaction_id: Uuid,
    status: TransactionStatus,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    Transaction::update_many()
        .col_expr(transaction::Column::Status, Expr::value(status.as_str()))
        .col_expr(transaction::Column::ProcessedAt, Expr::value(Some(now)))
        .col_expr(transaction::Column::UpdatedAt, Expr::value(now))
        .filter(transaction::Column::Id.eq(transaction_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Retrieves a transaction by its ID.
pub async fn get_transaction_by_id(
    db: &DatabaseConnection,
    transaction_id: Uuid,
) -> Result<Option<transaction::Model>> {
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

fn local_midnight(tz: &FixedOffset, date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).single())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::Config {
            message: format!("cannot resolve midnight of {date} in {tz}"),
        })
}

/// UTC bounds `[start, end)` of the business day containing `now`.
pub fn day_bounds(now: DateTime<Utc>, tz: &FixedOffset) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now.with_timezone(tz).date_naive();
    let tomorrow = today.succ_opt().ok_or_else(|| Error::Config {
        message: format!("no day after {today}"),
    })?;
    Ok((local_midnight(tz, today)?, local_midnight(tz, tomorrow)?))
}

/// UTC bounds `[start, end)` of the business month containing `now`.
pub fn month_bounds(
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now.with_timezone(tz).date_naive();
    let first = today.with_day(1).ok_or_else(|| Error::Config {
        message: format!("no first day of month for {today}"),
    })?;
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(|| Error::Config {
        message: format!("no month after {first}"),
    })?;
    Ok((local_midnight(tz, first)?, local_midnight(tz, next_first)?))
}

async fn completed_purchases_between<C>(
    db: &C,
    card_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<f64>
where
    C: ConnectionTrait,
{
    let total: Option<Option<f64>> = Transaction::find()
        .select_only()
        .column_as(Expr::col(transaction::Column::Amount).sum(), "total")
        .filter(transaction::Column::CardId.eq(card_id))
        .filter(transaction::Column::TransactionType.eq(TransactionType::Purchase.as_str()))
        .filter(transaction::Column::Status.eq(TransactionStatus::Completed.as_str()))
        .filter(transaction::Column::CreatedAt.gte(start))
        .filter(transaction::Column::CreatedAt.lt(end))
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(0.0))
}

/// Sum of completed purchases on the card during the business day of `now`.
/// Returns 0 when there are none.
pub async fn spent_today<C>(db: &C, card_id: Uuid, now: DateTime<Utc>, tz: &FixedOffset) -> Result<f64>
where
    C: ConnectionTrait,
{
    let (start, end) = day_bounds(now, tz)?;
    completed_purchases_between(db, card_id, start, end).await
}

/// Sum of completed purchases on the card during the business month of `now`.
/// Returns 0 when there are none.
pub async fn spent_this_month<C>(
    db: &C,
    card_id: Uuid,
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Result<f64>
where
    C: ConnectionTrait,
{
    let (start, end) = month_bounds(now, tz)?;
    completed_purchases_between(db, card_id, start, end).await
}

/// Transactions of a card, newest first. `limit` and `offset` are used as given.
pub async fn list_by_card(
    db: &DatabaseConnection,
    card_id: Uuid,
    limit: u64,
    offset: u64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::CardId.eq(card_id))
        .order_by_desc(transaction::Column::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Transactions of a company, newest first. `limit` and `offset` are used as given.
pub async fn list_by_company(
    db: &DatabaseConnection,
    company_id: Uuid,
    limit: u64,
    offset: u64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::CompanyId.eq(company_id))
        .order_by_desc(transaction::Column::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of transactions recorded for a card.
pub async fn count_by_card(db: &DatabaseConnection, card_id: Uuid) -> Result<u64> {
    Transaction::find()
        .filter(transaction::Column::CardId.eq(card_id))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Number of transactions recorded for a company.
pub async fn count_by_company(db: &DatabaseConnection, company_id: Uuid) -> Result<u64> {
    Transaction::find()
        .filter(transaction::Column::CompanyId.eq(company_id))
        .count(db)
        .await
        .map_err(Into::into)
}
