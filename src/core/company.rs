//! Company onboarding.

use crate::{
    entities::{Company, company, company::CompanyStatus},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};

/// Registration details for a new company.
#[derive(Debug, Clone)]
pub struct NewCompany {
    /// Company name, 2 to 255 characters
    pub name: String,
    /// Contact email, unique
    pub email: String,
    /// Optional postal address
    pub address: Option<String>,
    /// Optional phone number
    pub phone: Option<String>,
}

fn validate(new: &NewCompany) -> Result<()> {
    let name_len = new.name.trim().chars().count();
    if !(2..=255).contains(&name_len) {
        return Err(Error::InvalidInput {
            message: "Company name must be between 2 and 255 characters".to_string(),
        });
    }

    let email = new.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(Error::InvalidInput {
            message: format!("Invalid email address: {email}"),
        });
    }

    Ok(())
}

/// Finds a company by its contact email.
pub async fn get_company_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<company::Model>> {
    Company::find()
        .filter(company::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a company by ID.
///
/// # Errors
/// `CompanyNotFound` if no such company exists.
pub async fn get_company(db: &DatabaseConnection, company_id: Uuid) -> Result<company::Model> {
    Company::find_by_id(company_id)
        .one(db)
        .await?
        .ok_or(Error::CompanyNotFound { company_id })
}

/// Registers a new, active company.
///
/// # Errors
/// * `InvalidInput` - name or email fails validation
/// * `CompanyExists` - a company with this email is already registered
pub async fn register_company(db: &DatabaseConnection, new: NewCompany) -> Result<company::Model> {
    validate(&new)?;

    let email = new.email.trim().to_lowercase();
    if get_company_by_email(db, &email).await?.is_some() {
        return Err(Error::CompanyExists { email });
    }

    let now = Utc::now();
    let company = company::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(new.name.trim().to_string()),
        email: Set(email),
        address: Set(new.address),
        phone: Set(new.phone),
        status: Set(CompanyStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!(company_id = %company.id, "Company registered");
    Ok(company)
}

/// Changes a company's status.
pub async fn set_company_status(
    db: &DatabaseConnection,
    company_id: Uuid,
    status: CompanyStatus,
) -> Result<company::Model> {
    let company = get_company(db, company_id).await?;
    let mut active_model: company::ActiveModel = company.into();
    active_model.status = Set(status.as_str().to_string());
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map_err(Into::into)
}
