//! Bulk card issuance.
//!
//! Issuance is two-phase. Employee rows (already parsed from whatever upload
//! format the caller accepts) are queued as pending cards-to-issue, each with a
//! pre-generated card ID. [`issue_pending_cards`] then turns every pending row
//! of a company into an active virtual card in a single database transaction.

use crate::{
    config::settings::IssuanceSettings,
    core::{company::get_company, spending_control},
    entities::{
        CardToIssue, card,
        card::{CARD_TYPE_VIRTUAL, CardStatus},
        card_to_issue,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Months, Utc};
use rand::Rng;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use sha2::{Digest, Sha256};

/// One employee to issue a card for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    /// Employee identifier
    pub employee_id: Uuid,
    /// Employee email
    pub employee_email: String,
}

/// Computes the Luhn check digit for a string of decimal digits.
#[must_use]
pub fn luhn_check_digit(digits: &str) -> u32 {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, digit)| {
            if i % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    (10 - sum % 10) % 10
}

/// Whether a full card number passes the Luhn check.
#[must_use]
pub fn is_luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (body, check) = number.split_at(number.len() - 1);
    check.parse::<u32>().is_ok_and(|check| check == luhn_check_digit(body))
}

/// Generates a 16-digit, Luhn-valid card number starting with 4.
#[must_use]
pub fn generate_card_number() -> String {
    let mut rng = rand::thread_rng();
    let mut number = String::with_capacity(16);
    number.push('4');
    for _ in 0..14 {
        number.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    let check = luhn_check_digit(&number);
    number.push_str(&check.to_string());
    number
}

/// SHA-256 hex digest of a CVV.
#[must_use]
pub fn hash_cvv(cvv: &str) -> String {
    hex::encode(Sha256::digest(cvv.as_bytes()))
}

/// Generates a random 3-digit CVV and returns only its hash.
#[must_use]
pub fn generate_cvv_hash() -> String {
    let cvv = format!("{:03}", rand::thread_rng().gen_range(0..1000u16));
    hash_cvv(&cvv)
}

fn expiry_from(now: DateTime<Utc>, validity_years: u32) -> Result<DateTime<Utc>> {
    now.checked_add_months(Months::new(validity_years * 12))
        .ok_or_else(|| Error::Config {
            message: format!("card validity of {validity_years} years overflows"),
        })
}

async fn ensure_active_company(db: &DatabaseConnection, company_id: Uuid) -> Result<()> {
    let company = get_company(db, company_id).await?;
    if !company.is_active() {
        return Err(Error::CompanyInactive { company_id });
    }
    Ok(())
}

/// Queues employees for card issuance.
///
/// # Errors
/// * `CompanyNotFound` / `CompanyInactive` - the company cannot receive cards
/// * `InvalidInput` - no rows, or a row with an empty email
pub async fn enqueue_cards_to_issue(
    db: &DatabaseConnection,
    company_id: Uuid,
    records: Vec<EmployeeRecord>,
) -> Result<Vec<card_to_issue::Model>> {
    if records.is_empty() {
        return Err(Error::InvalidInput {
            message: "No employee records to queue".to_string(),
        });
    }
    if let Some(position) = records
        .iter()
        .position(|record| record.employee_email.trim().is_empty())
    {
        return Err(Error::InvalidInput {
            message: format!("Empty employee email in record {}", position + 1),
        });
    }
    ensure_active_company(db, company_id).await?;

    let txn = db.begin().await?;
    let now = Utc::now();
    let mut queued = Vec::with_capacity(records.len());
    for record in records {
        let row = card_to_issue::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            card_id: Set(Uuid::new_v4()),
            employee_id: Set(record.employee_id),
            employee_email: Set(record.employee_email.trim().to_string()),
            status: Set(card_to_issue::STATUS_PENDING.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        queued.push(row);
    }
    txn.commit().await?;

    tracing::info!(%company_id, count = queued.len(), "Queued cards for issuance");
    Ok(queued)
}

/// Pending cards-to-issue of a company, in queue order.
pub async fn pending_cards_to_issue(
    db: &DatabaseConnection,
    company_id: Uuid,
) -> Result<Vec<card_to_issue::Model>> {
    CardToIssue::find()
        .filter(card_to_issue::Column::CompanyId.eq(company_id))
        .filter(card_to_issue::Column::Status.eq(card_to_issue::STATUS_PENDING))
        .order_by_asc(card_to_issue::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Issues a card for every pending row of the company.
///
/// Cards, the row status changes and the configured default controls are
/// written in one transaction: either every pending row becomes a card or
/// none does.
///
/// # Errors
/// * `CompanyNotFound` / `CompanyInactive` - the company cannot receive cards
/// * `NothingToIssue` - there are no pending rows
pub async fn issue_pending_cards(
    db: &DatabaseConnection,
    company_id: Uuid,
    settings: &IssuanceSettings,
) -> Result<Vec<card::Model>> {
    ensure_active_company(db, company_id).await?;
    for control in &settings.default_controls {
        control.validate()?;
    }

    let pending = pending_cards_to_issue(db, company_id).await?;
    if pending.is_empty() {
        return Err(Error::NothingToIssue { company_id });
    }

    let now = Utc::now();
    let expiry_date = expiry_from(now, settings.validity_years)?;

    let txn = db.begin().await?;
    let mut issued = Vec::with_capacity(pending.len());
    for row in &pending {
        let card_number = generate_card_number();
        let last_four = card_number[card_number.len() - 4..].to_string();

        let card = card::ActiveModel {
            id: Set(row.card_id),
            company_id: Set(company_id),
            card_number: Set(card_number),
            card_holder_name: Set(format!("Employee - {}", row.employee_email)),
            employee_id: Set(row.employee_id.to_string()),
            employee_email: Set(row.employee_email.clone()),
            card_type: Set(CARD_TYPE_VIRTUAL.to_string()),
            status: Set(CardStatus::Active.as_str().to_string()),
            balance: Set(0.0),
            spending_limit: Set(None),
            daily_limit: Set(None),
            monthly_limit: Set(None),
            expiry_date: Set(expiry_date),
            cvv_hash: Set(generate_cvv_hash()),
            last_four: Set(last_four),
            created_at: Set(now),
            updated_at: Set(now),
            blocked_at: Set(None),
            blocked_reason: Set(None),
        }
        .insert(&txn)
        .await?;

        for control in &settings.default_controls {
            spending_control::upsert_in(&txn, card.id, control).await?;
        }

        issued.push(card);
    }

    let row_ids: Vec<Uuid> = pending.iter().map(|row| row.id).collect();
    CardToIssue::update_many()
        .col_expr(
            card_to_issue::Column::Status,
            Expr::value(card_to_issue::STATUS_GENERATED),
        )
        .col_expr(card_to_issue::Column::UpdatedAt, Expr::value(now))
        .filter(card_to_issue::Column::Id.is_in(row_ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(%company_id, count = issued.len(), "Issued cards");
    Ok(issued)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::company::set_company_status;
    use crate::core::policy::{ControlValue, MerchantCategoryRule};
    use crate::core::spending_control::active_control_values;
    use crate::entities::company::CompanyStatus;
    use crate::test_utils::*;

    fn employees(count: usize) -> Vec<EmployeeRecord> {
        (0..count)
            .map(|i| EmployeeRecord {
                employee_id: Uuid::new_v4(),
                employee_email: format!("employee{i}@acme.test"),
            })
            .collect()
    }

    #[test]
    fn test_luhn_known_numbers() {
        assert!(is_luhn_valid("4111111111111111"));
        assert!(is_luhn_valid("79927398713"));
        assert!(!is_luhn_valid("4111111111111112"));
        assert!(!is_luhn_valid("4111-1111"));
        assert_eq!(luhn_check_digit("7992739871"), 3);
    }

    #[test]
    fn test_generated_card_numbers_are_valid() {
        for _ in 0..50 {
            let number = generate_card_number();
            assert_eq!(number.len(), 16);
            assert!(number.starts_with('4'));
            assert!(is_luhn_valid(&number), "{number}");
        }
    }

    #[test]
    fn test_cvv_hash_is_sha256_hex() {
        assert_eq!(
            hash_cvv("123"),
            "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        );
        let hash = generate_cvv_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_enqueue_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let company = create_test_company(&db, "Acme", "ops@acme.test").await?;

        let result = enqueue_cards_to_issue(&db, company.id, Vec::new()).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let mut records = employees(2);
        records[1].employee_email = " ".to_string();
        let result = enqueue_cards_to_issue(&db, company.id, records).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));

        let result = enqueue_cards_to_issue(&db, Uuid::new_v4(), employees(1)).await;
        assert!(matches!(result, Err(Error::CompanyNotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_issue_pending_cards() -> Result<()> {
        let db = setup_test_db().await?;
        let company = create_test_company(&db, "Acme", "ops@acme.test").await?;

        let queued = enqueue_cards_to_issue(&db, company.id, employees(3)).await?;
        assert_eq!(pending_cards_to_issue(&db, company.id).await?.len(), 3);

        let cards = issue_pending_cards(&db, company.id, &IssuanceSettings::default()).await?;
        assert_eq!(cards.len(), 3);
        for (card, row) in cards.iter().zip(&queued) {
            assert_eq!(card.id, row.card_id);
            assert_eq!(card.status, "active");
            assert_eq!(card.card_type, "virtual");
            assert_eq!(card.balance, 0.0);
            assert_eq!(card.last_four, &card.card_number[12..]);
            assert!(is_luhn_valid(&card.card_number));
            assert_eq!(card.card_holder_name, format!("Employee - {}", row.employee_email));
            assert!(card.expiry_date > Utc::now() + chrono::Duration::days(365 * 2));
        }

        assert!(pending_cards_to_issue(&db, company.id).await?.is_empty());
        let result = issue_pending_cards(&db, company.id, &IssuanceSettings::default()).await;
        assert!(matches!(result, Err(Error::NothingToIssue { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_issue_attaches_default_controls() -> Result<()> {
        let db = setup_test_db().await?;
        let company = create_test_company(&db, "Acme", "ops@acme.test").await?;
        enqueue_cards_to_issue(&db, company.id, employees(1)).await?;

        let control = ControlValue::MerchantCategory(MerchantCategoryRule {
            allowed_categories: vec!["food".to_string()],
            blocked_categories: Vec::new(),
        });
        let settings = IssuanceSettings {
            validity_years: 1,
            default_controls: vec![control.clone()],
        };

        let cards = issue_pending_cards(&db, company.id, &settings).await?;
        let values = active_control_values(&db, cards[0].id).await?;
        assert_eq!(values, vec![control]);

        Ok(())
    }

    #[tokio::test]
    async fn test_suspended_company_cannot_issue() -> Result<()> {
        let db = setup_test_db().await?;
        let company = create_test_company(&db, "Acme", "ops@acme.test").await?;
        enqueue_cards_to_issue(&db, company.id, employees(1)).await?;
        set_company_status(&db, company.id, CompanyStatus::Suspended).await?;

        let result = issue_pending_cards(&db, company.id, &IssuanceSettings::default()).await;
        assert!(matches!(result, Err(Error::CompanyInactive { .. })));

        Ok(())
    }
}
