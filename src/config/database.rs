//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! It provides functions for establishing database connections and creating all necessary tables
//! based on the entity definitions. The module uses `SeaORM`'s `Schema::create_table_from_entity`
//! method to generate SQL statements from the entity models, so the database schema always
//! matches the Rust struct definitions without requiring manual SQL.

use crate::config::settings::DatabaseSettings;
use crate::entities::{Card, CardToIssue, Company, SpendingControl, Transaction};
use crate::errors::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/corpcards.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns
/// the default local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Pool options for `database_url`.
///
/// File-backed databases get `settings.max_connections` connections so that
/// requests for different cards do not queue behind one open commit. An
/// in-memory database keeps a single connection.
#[must_use]
pub fn connect_options(database_url: &str, settings: &DatabaseSettings) -> ConnectOptions {
    let max_connections = if is_in_memory(database_url) {
        1
    } else {
        settings.max_connections.max(1)
    };
    let mut options = ConnectOptions::new(database_url.to_string());
    options.max_connections(max_connections);
    options
}

/// Connects to `database_url` with a pool sized by [`connect_options`].
pub async fn connect(database_url: &str, settings: &DatabaseSettings) -> Result<DatabaseConnection> {
    tracing::debug!("Connecting to database at {}", database_url);
    Database::connect(connect_options(database_url, settings))
        .await
        .map_err(Into::into)
}

/// Establishes a connection to the database named by [`get_database_url`].
///
/// The returned handle is cheap to clone and is passed explicitly to every
/// component; there is no process-wide connection.
pub async fn create_connection(settings: &DatabaseSettings) -> Result<DatabaseConnection> {
    connect(&get_database_url(), settings).await
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables that do not exist yet.
///
/// Referenced tables are created before the tables pointing at them:
/// companies, cards, cards to issue, transactions, spending controls.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Company).await?;
    create_table(db, &schema, Card).await?;
    create_table(db, &schema, CardToIssue).await?;
    create_table(db, &schema, Transaction).await?;
    create_table(db, &schema, SpendingControl).await?;

    Ok(())
}
