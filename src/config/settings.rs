//! Application settings loaded from config.toml
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below. Companies listed under `[[companies]]` are onboarded and
//! their cards issued by the binary on startup if they do not exist yet.

use crate::core::policy::ControlValue;
use crate::errors::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Asia/Tokyo. Japan observes no daylight saving time, so a fixed offset is exact.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Connection pool tuning
    pub database: DatabaseSettings,
    /// Purchase authorization tuning
    pub authorization: AuthorizationSettings,
    /// Bulk issuance tuning
    pub issuance: IssuanceSettings,
    /// Companies to onboard on startup
    pub companies: Vec<CompanySeed>,
}

/// Connection pool size used for file-backed databases when not configured.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Settings for the database connection pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Pool size for file-backed databases. In-memory databases always use a
    /// single connection, since each connection would open its own database.
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Settings for the purchase authorization pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    /// Offset of the canonical business timezone from UTC. Used for both
    /// the daily/monthly spend windows and time-of-day controls.
    pub utc_offset_minutes: i32,
    /// Cards expiring within this many days get an advisory on success
    pub expiry_warning_days: i64,
    /// Deadline for one authorization, storage calls included
    pub timeout_ms: u64,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            expiry_warning_days: 30,
            timeout_ms: 5_000,
        }
    }
}

impl AuthorizationSettings {
    /// The canonical business timezone.
    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| Error::Config {
            message: format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes),
        })
    }

    /// The per-authorization deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for bulk card issuance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuanceSettings {
    /// Card validity from the moment of issuance
    pub validity_years: u32,
    /// Controls attached to every newly issued card
    pub default_controls: Vec<ControlValue>,
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            validity_years: 3,
            default_controls: Vec::new(),
        }
    }
}

/// A company to onboard, with the employees to issue cards for.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanySeed {
    /// Company name
    pub name: String,
    /// Contact email; used to detect already-onboarded companies
    pub email: String,
    /// Optional postal address
    #[serde(default)]
    pub address: Option<String>,
    /// Optional phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Employees to issue cards for
    #[serde(default)]
    pub employees: Vec<EmployeeSeed>,
}

/// One employee row of a [`CompanySeed`].
#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeSeed {
    /// Employee identifier
    pub employee_id: Uuid,
    /// Employee email
    pub employee_email: String,
}

impl Settings {
    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(Error::Config {
                message: "database.max_connections must be positive".to_string(),
            });
        }
        self.authorization.timezone()?;
        if self.authorization.timeout_ms == 0 {
            return Err(Error::Config {
                message: "authorization.timeout_ms must be positive".to_string(),
            });
        }
        if self.issuance.validity_years == 0 {
            return Err(Error::Config {
                message: "issuance.validity_years must be positive".to_string(),
            });
        }
        for control in &self.issuance.default_controls {
            control.validate()?;
        }
        Ok(())
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value is out of range
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_settings(&contents)
}

/// Parses and validates settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from `CORPCARDS_CONFIG` (default `./config.toml`).
///
/// A missing file is not an error: defaults are used.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("CORPCARDS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        tracing::info!("No config file at {}, using defaults", path);
        Ok(Settings::default())
    }
}
