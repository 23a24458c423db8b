//! Paged transaction history, scoped by company.

use crate::{
    core::{card::get_card, transaction as store},
    entities::transaction,
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use uuid::Uuid;

/// Page size used when the caller asks for less than one row.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// Largest page a caller can request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// A history query. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Restrict to one card of the company
    pub card_id: Option<Uuid>,
    /// Requested page, clamped to at least 1
    pub page: i64,
    /// Requested page size, clamped to `1..=MAX_PAGE_SIZE`
    pub page_size: i64,
}

/// One page of transactions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    /// Rows on this page
    pub transactions: Vec<transaction::Model>,
    /// Rows across all pages
    pub total: u64,
    /// Effective page
    pub page: u64,
    /// Effective page size
    pub page_size: u64,
}

/// Clamps a requested page and page size to the values actually served.
#[must_use]
pub fn clamp_paging(page: i64, page_size: i64) -> (u64, u64) {
    let page = u64::try_from(page.max(1)).unwrap_or(1);
    let page_size = if page_size < 1 {
        DEFAULT_PAGE_SIZE
    } else {
        u64::try_from(page_size).map_or(MAX_PAGE_SIZE, |size| size.min(MAX_PAGE_SIZE))
    };
    (page, page_size)
}

/// Lists a company's transactions, optionally for a single card.
///
/// # Errors
/// `CardNotFound` if `card_id` is given but is not a card of the company.
pub async fn transaction_history(
    db: &DatabaseConnection,
    company_id: Uuid,
    query: HistoryQuery,
) -> Result<HistoryPage> {
    let (page, page_size) = clamp_paging(query.page, query.page_size);
    let offset = (page - 1).saturating_mul(page_size);

    let (transactions, total) = if let Some(card_id) = query.card_id {
        get_card(db, company_id, card_id).await?;
        (
            store::list_by_card(db, card_id, page_size, offset).await?,
            store::count_by_card(db, card_id).await?,
        )
    } else {
        (
            store::list_by_company(db, company_id, page_size, offset).await?,
            store::count_by_company(db, company_id).await?,
        )
    };

    Ok(HistoryPage {
        transactions,
        total,
        page,
        page_size,
    })
}

/// Loads one transaction of the company.
///
/// # Errors
/// * `TransactionNotFound` - no transaction with this ID
/// * `Forbidden` - the transaction belongs to another company
pub async fn get_transaction(
    db: &DatabaseConnection,
    company_id: Uuid,
    transaction_id: Uuid,
) -> Result<transaction::Model> {
    let record = store::get_transaction_by_id(db, transaction_id)
        .await?
        .ok_or(Error::TransactionNotFound { transaction_id })?;

    if record.company_id != company_id {
        return Err(Error::Forbidden {
            message: "Transaction belongs to another company".to_string(),
        });
    }

    Ok(record)
}
