use corpcards::{
    config::{
        database,
        settings::{self, CompanySeed, Settings},
    },
    core::{
        authorization::PurchaseAuthorizer,
        company::{self, NewCompany},
        issuance::{self, EmployeeRecord},
    },
    errors::Result,
};
use dotenvy::dotenv;
use sea_orm::DatabaseConnection;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Creates the directory of a file-backed `SQLite` URL so `mode=rwc` can create the file.
fn ensure_sqlite_dir(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Onboards a seed company that is not registered yet and issues its cards.
async fn seed_company(db: &DatabaseConnection, settings: &Settings, seed: &CompanySeed) -> Result<()> {
    if company::get_company_by_email(db, &seed.email).await?.is_some() {
        info!("Company {} already onboarded, skipping", seed.email);
        return Ok(());
    }

    let registered = company::register_company(
        db,
        NewCompany {
            name: seed.name.clone(),
            email: seed.email.clone(),
            address: seed.address.clone(),
            phone: seed.phone.clone(),
        },
    )
    .await?;

    if seed.employees.is_empty() {
        return Ok(());
    }

    let records = seed
        .employees
        .iter()
        .map(|employee| EmployeeRecord {
            employee_id: employee.employee_id,
            employee_email: employee.employee_email.clone(),
        })
        .collect();
    issuance::enqueue_cards_to_issue(db, registered.id, records).await?;
    let cards = issuance::issue_pending_cards(db, registered.id, &settings.issuance).await?;
    info!("Issued {} cards for {}", cards.len(), registered.name);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();

    // 3. Load settings
    let app_settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    // 4. Connect and create tables
    ensure_sqlite_dir(&database::get_database_url())?;
    let db = database::create_connection(&app_settings.database)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed companies and their cards
    for seed in &app_settings.companies {
        seed_company(&db, &app_settings, seed)
            .await
            .inspect_err(|e| error!("Failed to seed company {}: {}", seed.email, e))?;
    }

    // 6. Build the authorizer; request transport is supplied by the embedding service
    let authorizer = PurchaseAuthorizer::new(db, app_settings.authorization.clone())?;
    info!(
        timezone = %authorizer.timezone(),
        timeout_ms = app_settings.authorization.timeout_ms,
        "Purchase authorization ready"
    );

    Ok(())
}
