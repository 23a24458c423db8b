//! Purchase authorization pipeline.
//!
//! A purchase request runs through strictly ordered stages and stops at the
//! first failure:
//!
//! 1. card resolution, scoped to the authenticated company
//! 2. usability (status, expiry)
//! 3. sufficiency (balance, per-transaction limit)
//! 4. daily and monthly caps
//! 5. spending controls
//! 6. commit: pending record, locked debit, completion, all in one transaction
//!
//! Stages 2 to 5 read without locks and only produce advisory [`Denial`]s.
//! The debit in stage 6 is the authoritative balance check; when it refuses,
//! the whole transaction rolls back and the caller sees
//! [`Error::CommitConflict`] instead of a denial.
//!
//! Retried requests are not deduplicated: submitting the same purchase twice
//! records and debits it twice.

use crate::{
    config::settings::AuthorizationSettings,
    core::{
        card as ledger,
        denial::{Denial, LimitBreach},
        policy::evaluate_controls,
        spending_control::active_control_values,
        transaction::{self as store, NewTransaction},
    },
    entities::{
        Transaction, card,
        card::CardStatus,
        transaction,
        transaction::{TransactionStatus, TransactionType},
    },
    errors::{Error, ErrorKind, Result},
};
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, TransactionTrait};
use serde::Serialize;
use uuid::Uuid;

/// A card-present purchase as delivered by the caller.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Company named in the request body; must match the authenticated company
    pub company_id: Uuid,
    /// Card to charge
    pub card_id: Uuid,
    /// Positive amount
    pub amount: f64,
    /// Merchant category, matched case-insensitively by controls
    pub merchant_category: String,
    /// Optional merchant name, recorded on the transaction
    pub merchant_name: Option<String>,
}

/// Non-blocking notes attached to a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "advisory", rename_all = "snake_case")]
pub enum Advisory {
    /// The card expires within the warning period
    ExpiringSoon {
        /// Whole days left before expiry
        days_until_expiry: i64,
    },
}

/// Spend-to-date after the purchase, in the business timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendSnapshot {
    /// Completed purchases today, this one included
    pub today_spending: f64,
    /// `daily_limit - today_spending`, if a daily limit is set
    pub remaining_daily_limit: Option<f64>,
    /// Completed purchases this month, this one included
    pub monthly_spending: f64,
    /// `monthly_limit - monthly_spending`, if a monthly limit is set
    pub remaining_monthly_limit: Option<f64>,
}

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizedPurchase {
    /// The completed purchase record
    pub transaction: transaction::Model,
    /// Card balance after the debit
    pub remaining_balance: f64,
    /// Last four digits of the card number
    pub card_last_four: String,
    /// Spend-to-date figures
    pub spend: SpendSnapshot,
    /// Non-blocking advisories
    pub advisories: Vec<Advisory>,
}

/// Runs purchase authorizations against a database.
///
/// Holds no mutable state; clones share the connection pool and can run on
/// separate tasks. All coordination between concurrent requests happens
/// through the card row lock taken by the debit.
#[derive(Debug, Clone)]
pub struct PurchaseAuthorizer {
    db: DatabaseConnection,
    settings: AuthorizationSettings,
    timezone: FixedOffset,
}

fn validate_request(request: &PurchaseRequest) -> Result<()> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: request.amount,
        });
    }
    if request.merchant_category.trim().is_empty() {
        return Err(Error::InvalidInput {
            message: "Merchant category is required".to_string(),
        });
    }
    Ok(())
}

fn inactive_detail(card: &card::Model) -> String {
    match card.card_status() {
        Some(CardStatus::Blocked) => match card.blocked_reason.as_deref() {
            Some(reason) if !reason.is_empty() => format!("Card is blocked: {reason}"),
            _ => "Card is blocked".to_string(),
        },
        Some(CardStatus::Expired) => "Card has expired".to_string(),
        Some(CardStatus::Cancelled) => "Card has been cancelled".to_string(),
        Some(CardStatus::Active) | None => "Card is not active".to_string(),
    }
}

/// Stage 2. Status and expiry are checked separately: an `active` card can
/// still be past its expiry date.
fn check_usability(
    card: &card::Model,
    now: DateTime<Utc>,
    timezone: &FixedOffset,
    expiry_warning_days: i64,
) -> std::result::Result<Vec<Advisory>, Denial> {
    if card.card_status() != Some(CardStatus::Active) {
        return Err(Denial::CardInactive {
            status: card.status.clone(),
            detail: inactive_detail(card),
        });
    }

    if card.expiry_date <= now {
        return Err(Denial::CardExpired {
            expiry_date: card.expiry_date.with_timezone(timezone).date_naive(),
        });
    }

    let days_until_expiry = (card.expiry_date - now).num_days();
    if days_until_expiry <= expiry_warning_days {
        return Ok(vec![Advisory::ExpiringSoon { days_until_expiry }]);
    }

    Ok(Vec::new())
}

/// Stage 3. Advisory only; the debit re-checks the balance under lock.
fn check_sufficiency(card: &card::Model, amount: f64) -> std::result::Result<(), Denial> {
    if card.balance < amount {
        return Err(Denial::InsufficientBalance {
            available_balance: card.balance,
            required_amount: amount,
            shortage: amount - card.balance,
        });
    }

    if let Some(spending_limit) = card.spending_limit {
        if amount > spending_limit {
            return Err(Denial::SpendingLimitExceeded {
                spending_limit,
                amount,
            });
        }
    }

    Ok(())
}

impl PurchaseAuthorizer {
    /// Creates an authorizer.
    ///
    /// # Errors
    /// `Config` if the configured UTC offset is out of range.
    pub fn new(db: DatabaseConnection, settings: AuthorizationSettings) -> Result<Self> {
        let timezone = settings.timezone()?;
        Ok(Self {
            db,
            settings,
            timezone,
        })
    }

    /// The canonical business timezone used for spend windows and controls.
    #[must_use]
    pub const fn timezone(&self) -> &FixedOffset {
        &self.timezone
    }

    /// Authorizes a purchase at the current time.
    ///
    /// # Errors
    /// * `InvalidAmount` / `InvalidInput` - malformed request
    /// * `Forbidden` - the request names a different company than the caller
    /// * `CardNotFound` - no such card in the caller's company
    /// * `Denied` - an advisory stage refused the purchase
    /// * `CommitConflict` - the locked debit refused despite passing the advisory checks
    /// * `Timeout` - the configured deadline elapsed; nothing was committed
    pub async fn authorize(
        &self,
        authenticated_company_id: Uuid,
        request: PurchaseRequest,
    ) -> Result<AuthorizedPurchase> {
        self.authorize_at(authenticated_company_id, request, Utc::now())
            .await
    }

    /// Authorizes a purchase as if it happened at `now`.
    ///
    /// `now` drives expiry, spend windows and time-of-day controls, and is
    /// stored as the record's `created_at`.
    #[tracing::instrument(
        skip(self, request, now),
        fields(company_id = %authenticated_company_id, card_id = %request.card_id, amount = request.amount)
    )]
    pub async fn authorize_at(
        &self,
        authenticated_company_id: Uuid,
        request: PurchaseRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthorizedPurchase> {
        let timeout = self.settings.timeout();
        let result = match tokio::time::timeout(
            timeout,
            self.run(authenticated_company_id, request, now),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                timeout_ms: self.settings.timeout_ms,
            }),
        };

        match &result {
            Ok(authorized) => tracing::info!(
                transaction_id = %authorized.transaction.id,
                remaining_balance = authorized.remaining_balance,
                "Purchase authorized"
            ),
            Err(Error::Denied(denial)) => tracing::warn!(
                reason_category = denial.category(),
                reason = %denial.message(),
                "Purchase denied"
            ),
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::Internal) => {
                tracing::error!(error = %e, "Purchase authorization failed");
            }
            Err(e) => tracing::warn!(error = %e, "Purchase rejected"),
        }

        result
    }

    async fn run(
        &self,
        authenticated_company_id: Uuid,
        request: PurchaseRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthorizedPurchase> {
        validate_request(&request)?;

        if request.company_id != authenticated_company_id {
            return Err(Error::Forbidden {
                message: "Company ID does not match the authenticated company".to_string(),
            });
        }

        let card = ledger::get_card(&self.db, authenticated_company_id, request.card_id).await?;

        let advisories = check_usability(
            &card,
            now,
            &self.timezone,
            self.settings.expiry_warning_days,
        )?;
        check_sufficiency(&card, request.amount)?;
        self.check_caps(&card, request.amount, now).await?;
        self.check_controls(&card, &request.merchant_category, now)
            .await?;

        self.commit(&card, request, now, advisories).await
    }

    /// Stage 4. A cap that is not set is not checked.
    async fn check_caps(&self, card: &card::Model, amount: f64, now: DateTime<Utc>) -> Result<()> {
        if let Some(daily_limit) = card.daily_limit {
            let spent = store::spent_today(&self.db, card.id, now, &self.timezone).await?;
            if spent + amount > daily_limit {
                return Err(Denial::DailyLimitExceeded(LimitBreach::new(daily_limit, spent, amount)).into());
            }
        }

        if let Some(monthly_limit) = card.monthly_limit {
            let spent = store::spent_this_month(&self.db, card.id, now, &self.timezone).await?;
            if spent + amount > monthly_limit {
                return Err(
                    Denial::MonthlyLimitExceeded(LimitBreach::new(monthly_limit, spent, amount)).into(),
                );
            }
        }

        Ok(())
    }

    /// Stage 5. A stored control that cannot be decoded fails the request.
    async fn check_controls(
        &self,
        card: &card::Model,
        merchant_category: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let controls = active_control_values(&self.db, card.id).await?;
        if controls.is_empty() {
            return Ok(());
        }

        let local_now = now.with_timezone(&self.timezone);
        if let Some(violation) = evaluate_controls(&controls, merchant_category, local_now.time())? {
            return Err(Denial::ControlViolation {
                control_type: violation.control_type,
                reason: violation.reason,
                merchant_category: merchant_category.trim().to_lowercase(),
                current_time: local_now.format("%H:%M").to_string(),
                timezone: self.timezone.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Stage 6. Everything runs on one database transaction; returning early
    /// drops it, which rolls it back.
    async fn commit(
        &self,
        card: &card::Model,
        request: PurchaseRequest,
        now: DateTime<Utc>,
        advisories: Vec<Advisory>,
    ) -> Result<AuthorizedPurchase> {
        let txn = self.db.begin().await?;

        let description = request.merchant_name.as_deref().map_or_else(
            || "Card purchase".to_string(),
            |merchant| format!("Purchase at {merchant}"),
        );
        let record = store::create_transaction_at(
            &txn,
            NewTransaction {
                card_id: card.id,
                company_id: card.company_id,
                transaction_type: TransactionType::Purchase,
                amount: request.amount,
                merchant_name: request.merchant_name,
                merchant_category: Some(request.merchant_category.trim().to_lowercase()),
                description,
            },
            now,
        )
        .await?;

        let debited = match ledger::debit(&txn, card.id, request.amount).await {
            Ok(debited) => debited,
            Err(Error::InsufficientBalance {
                card_id,
                available,
                required,
            }) => {
                txn.rollback().await?;
                return Err(Error::CommitConflict {
                    card_id,
                    available,
                    required,
                });
            }
            Err(e) => return Err(e),
        };

        store::update_transaction_status(&txn, record.id, TransactionStatus::Completed).await?;
        let transaction = Transaction::find_by_id(record.id)
            .one(&txn)
            .await?
            .ok_or(Error::TransactionNotFound {
                transaction_id: record.id,
            })?;

        let today_spending = store::spent_today(&txn, card.id, now, &self.timezone).await?;
        let monthly_spending = store::spent_this_month(&txn, card.id, now, &self.timezone).await?;

        txn.commit().await?;

        Ok(AuthorizedPurchase {
            transaction,
            remaining_balance: debited.balance,
            card_last_four: debited.last_four,
            spend: SpendSnapshot {
                today_spending,
                remaining_daily_limit: debited.daily_limit.map(|limit| limit - today_spending),
                monthly_spending,
                remaining_monthly_limit: debited
                    .monthly_limit
                    .map(|limit| limit - monthly_spending),
            },
            advisories,
        })
    }
}
