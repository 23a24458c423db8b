//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    config::settings::DatabaseSettings,
    core::transaction::{self as store, NewTransaction},
    entities::{
        Transaction, card,
        card::{CARD_TYPE_VIRTUAL, CardStatus},
        company,
        company::CompanyStatus,
        spending_control,
        transaction::{TransactionStatus, TransactionType},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::path::PathBuf;
use uuid::Uuid;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A file-backed `SQLite` database in the temp directory, for tests that need
/// several pooled connections. The files are removed on drop.
pub struct FileTestDb {
    /// Pooled connection to the database
    pub db: DatabaseConnection,
    path: PathBuf,
}

impl Drop for FileTestDb {
    fn drop(&mut self) {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Creates a file-backed database with all tables and a pool of
/// `max_connections` connections.
pub async fn setup_file_test_db(max_connections: u32) -> Result<FileTestDb> {
    let path = std::env::temp_dir().join(format!("corpcards-test-{}.sqlite", Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = crate::config::database::connect(&url, &DatabaseSettings { max_connections }).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(FileTestDb { db, path })
}

/// Inserts an active company directly, bypassing registration validation.
pub async fn create_test_company(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
) -> Result<company::Model> {
    let now = Utc::now();
    company::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        address: Set(None),
        phone: Set(None),
        status: Set(CompanyStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Builder for cards inserted straight into the database.
///
/// # Defaults
/// * status: active
/// * balance: 0.0
/// * no spending, daily or monthly limit
/// * expiry: three years from now
pub struct TestCard {
    company_id: Uuid,
    balance: f64,
    status: CardStatus,
    spending_limit: Option<f64>,
    daily_limit: Option<f64>,
    monthly_limit: Option<f64>,
    expiry_date: DateTime<Utc>,
    blocked_reason: Option<String>,
}

impl TestCard {
    /// Starts a card for `company_id` with the defaults above.
    pub fn new(company_id: Uuid) -> Self {
        Self {
            company_id,
            balance: 0.0,
            status: CardStatus::Active,
            spending_limit: None,
            daily_limit: None,
            monthly_limit: None,
            expiry_date: Utc::now() + Duration::days(3 * 365),
            blocked_reason: None,
        }
    }

    pub const fn balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub const fn status(mut self, status: CardStatus) -> Self {
        self.status = status;
        self
    }

    pub const fn spending_limit(mut self, limit: f64) -> Self {
        self.spending_limit = Some(limit);
        self
    }

    pub const fn daily_limit(mut self, limit: f64) -> Self {
        self.daily_limit = Some(limit);
        self
    }

    pub const fn monthly_limit(mut self, limit: f64) -> Self {
        self.monthly_limit = Some(limit);
        self
    }

    pub const fn expiry_date(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = expiry_date;
        self
    }

    pub fn blocked_reason(mut self, reason: &str) -> Self {
        self.blocked_reason = Some(reason.to_string());
        self
    }

    /// Inserts the card with a fixed test card number.
    pub async fn insert(self, db: &DatabaseConnection) -> Result<card::Model> {
        let now = Utc::now();
        let blocked_at = (self.status == CardStatus::Blocked).then_some(now);
        card::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(self.company_id),
            card_number: Set("4111111111111111".to_string()),
            card_holder_name: Set("Employee - test@example.test".to_string()),
            employee_id: Set(Uuid::new_v4().to_string()),
            employee_email: Set("test@example.test".to_string()),
            card_type: Set(CARD_TYPE_VIRTUAL.to_string()),
            status: Set(self.status.as_str().to_string()),
            balance: Set(self.balance),
            spending_limit: Set(self.spending_limit),
            daily_limit: Set(self.daily_limit),
            monthly_limit: Set(self.monthly_limit),
            expiry_date: Set(self.expiry_date),
            cvv_hash: Set(crate::core::issuance::hash_cvv("123")),
            last_four: Set("1111".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            blocked_at: Set(blocked_at),
            blocked_reason: Set(self.blocked_reason),
        }
        .insert(db)
        .await
        .map_err(Into::into)
    }
}

/// Sets up a database with one company and one active card.
/// Returns (db, company, card) for common test scenarios.
pub async fn setup_with_card(
    balance: f64,
) -> Result<(DatabaseConnection, company::Model, card::Model)> {
    let db = setup_test_db().await?;
    let company = create_test_company(&db, "Test Company", "test@company.test").await?;
    let card = TestCard::new(company.id).balance(balance).insert(&db).await?;
    Ok((db, company, card))
}

/// A purchase on `card` in the "food" category.
pub fn test_purchase(company: &company::Model, card: &card::Model, amount: f64) -> NewTransaction {
    NewTransaction {
        card_id: card.id,
        company_id: company.id,
        transaction_type: TransactionType::Purchase,
        amount,
        merchant_name: Some("Test Merchant".to_string()),
        merchant_category: Some("food".to_string()),
        description: "Test purchase".to_string(),
    }
}

/// Records a completed purchase without touching the card balance.
/// Use this to set up spend-to-date.
pub async fn record_completed_purchase(
    db: &DatabaseConnection,
    company: &company::Model,
    card: &card::Model,
    amount: f64,
) -> Result<crate::entities::transaction::Model> {
    let record = store::create_transaction(db, test_purchase(company, card, amount)).await?;
    store::update_transaction_status(db, record.id, TransactionStatus::Completed).await?;
    Transaction::find_by_id(record.id)
        .one(db)
        .await?
        .ok_or(Error::TransactionNotFound {
            transaction_id: record.id,
        })
}

/// Inserts an active control row with an arbitrary type and payload, skipping
/// validation. Use this to simulate rows written by older or buggy code.
pub async fn insert_raw_control(
    db: &DatabaseConnection,
    card_id: Uuid,
    control_type: &str,
    control_value: serde_json::Value,
) -> Result<spending_control::Model> {
    let now = Utc::now();
    spending_control::ActiveModel {
        id: Set(Uuid::new_v4()),
        card_id: Set(card_id),
        control_type: Set(control_type.to_string()),
        control_value: Set(control_value),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
