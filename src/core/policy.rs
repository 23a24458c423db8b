//! Spending control evaluation.
//!
//! Controls are stored as a `control_type` string plus an untyped JSON
//! payload. This module is the only place that payload is interpreted: it is
//! decoded into a [`ControlValue`] at the storage boundary and everything else
//! works on the typed variants.
//!
//! Evaluation is pure. The caller supplies the merchant category and the
//! current time of day in the business timezone.

use crate::errors::{Error, Result};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of spending control a card can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    /// Merchant category allow/block lists
    MerchantCategory,
    /// Time-of-day purchase window
    TimeBased,
    /// Reserved, never denies
    MerchantName,
    /// Reserved, never denies
    Location,
}

impl ControlType {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MerchantCategory => "merchant_category",
            Self::TimeBased => "time_based",
            Self::MerchantName => "merchant_name",
            Self::Location => "location",
        }
    }

    /// Parses the database representation, `None` for unknown values.
    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "merchant_category" => Some(Self::MerchantCategory),
            "time_based" => Some(Self::TimeBased),
            "merchant_name" => Some(Self::MerchantName),
            "location" => Some(Self::Location),
            _ => None,
        }
    }

    // Merchant category is checked before the time window.
    const fn evaluation_rank(self) -> u8 {
        match self {
            Self::MerchantCategory => 0,
            Self::TimeBased => 1,
            Self::MerchantName => 2,
            Self::Location => 3,
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow/block lists of merchant categories. Matching ignores case and
/// surrounding whitespace. An empty allow list means "no allow-list restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantCategoryRule {
    /// If non-empty, only these categories may be used
    #[serde(default)]
    pub allowed_categories: Vec<String>,
    /// These categories are always refused
    #[serde(default)]
    pub blocked_categories: Vec<String>,
}

/// Daily purchase window, `HH:MM` in the business timezone, both ends
/// inclusive. A window whose start is after its end wraps midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowRule {
    /// Window opens, `HH:MM`
    pub start_time: String,
    /// Window closes, `HH:MM`
    pub end_time: String,
}

/// A typed spending control payload, keyed by control type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "control_type", rename_all = "snake_case")]
pub enum ControlValue {
    /// See [`MerchantCategoryRule`]
    MerchantCategory(MerchantCategoryRule),
    /// See [`TimeWindowRule`]
    TimeBased(TimeWindowRule),
    /// Reserved for merchant-name policies; payload kept verbatim
    MerchantName(serde_json::Value),
    /// Reserved for location policies; payload kept verbatim
    Location(serde_json::Value),
}

impl ControlValue {
    /// The control type this value belongs to.
    #[must_use]
    pub const fn control_type(&self) -> ControlType {
        match self {
            Self::MerchantCategory(_) => ControlType::MerchantCategory,
            Self::TimeBased(_) => ControlType::TimeBased,
            Self::MerchantName(_) => ControlType::MerchantName,
            Self::Location(_) => ControlType::Location,
        }
    }

    /// Encodes the payload for the `control_value` column.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let payload = match self {
            Self::MerchantCategory(rule) => serde_json::to_value(rule)?,
            Self::TimeBased(rule) => serde_json::to_value(rule)?,
            Self::MerchantName(value) | Self::Location(value) => value.clone(),
        };
        Ok(payload)
    }

    /// Decodes a stored `(control_type, control_value)` pair.
    ///
    /// Unknown types and payloads of the wrong shape are configuration
    /// errors, never a silent pass.
    pub fn from_stored(control_type: &str, payload: &serde_json::Value) -> Result<Self> {
        let kind = ControlType::from_db(control_type).ok_or_else(|| Error::ControlConfig {
            message: format!("unknown control type '{control_type}'"),
        })?;
        let decode_error = |e: serde_json::Error| Error::ControlConfig {
            message: format!("invalid {kind} control payload: {e}"),
        };
        let value = match kind {
            ControlType::MerchantCategory => {
                Self::MerchantCategory(serde_json::from_value(payload.clone()).map_err(decode_error)?)
            }
            ControlType::TimeBased => {
                Self::TimeBased(serde_json::from_value(payload.clone()).map_err(decode_error)?)
            }
            ControlType::MerchantName => Self::MerchantName(payload.clone()),
            ControlType::Location => Self::Location(payload.clone()),
        };
        Ok(value)
    }

    /// Checks the payload before it is stored.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::MerchantCategory(_) => Ok(()),
            Self::TimeBased(rule) => {
                parse_time_of_day(&rule.start_time)?;
                parse_time_of_day(&rule.end_time)?;
                Ok(())
            }
            Self::MerchantName(value) | Self::Location(value) => {
                if value.is_object() {
                    Ok(())
                } else {
                    Err(Error::ControlConfig {
                        message: format!("{} payload must be a JSON object", self.control_type()),
                    })
                }
            }
        }
    }
}

/// The first control that refused a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlViolation {
    /// Which control refused
    pub control_type: ControlType,
    /// Human-readable reason
    pub reason: String,
}

fn normalize(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Parses `HH:MM` into minutes since midnight.
pub fn parse_time_of_day(value: &str) -> Result<u32> {
    let invalid = |detail: &str| Error::ControlConfig {
        message: format!("invalid time '{value}': {detail}"),
    };
    let (hour, minute) = value
        .split_once(':')
        .ok_or_else(|| invalid("expected HH:MM"))?;
    let parse_part = |part: &str| -> Result<u32> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected HH:MM"));
        }
        part.parse::<u32>().map_err(|_| invalid("expected HH:MM"))
    };
    let hour = parse_part(hour)?;
    let minute = parse_part(minute)?;
    if hour > 23 {
        return Err(invalid("hour must be between 0 and 23"));
    }
    if minute > 59 {
        return Err(invalid("minute must be between 0 and 59"));
    }
    Ok(hour * 60 + minute)
}

/// Applies a merchant category rule. Returns the denial reason, if any.
#[must_use]
pub fn check_merchant_category(rule: &MerchantCategoryRule, merchant_category: &str) -> Option<String> {
    let category = normalize(merchant_category);

    if rule
        .blocked_categories
        .iter()
        .any(|blocked| normalize(blocked) == category)
    {
        return Some(format!(
            "Transaction blocked: merchant category '{category}' is not allowed"
        ));
    }

    if !rule.allowed_categories.is_empty()
        && !rule
            .allowed_categories
            .iter()
            .any(|allowed| normalize(allowed) == category)
    {
        return Some(format!(
            "Transaction blocked: merchant category '{category}' is not in allowed list"
        ));
    }

    None
}

/// Applies a time window rule at `local_time`. Returns the denial reason, if any.
///
/// Only hours and minutes of `local_time` are considered.
pub fn check_time_window(rule: &TimeWindowRule, local_time: NaiveTime) -> Result<Option<String>> {
    let start = parse_time_of_day(&rule.start_time)?;
    let end = parse_time_of_day(&rule.end_time)?;
    let now = local_time.hour() * 60 + local_time.minute();

    let allowed = if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    };

    if allowed {
        Ok(None)
    } else {
        Ok(Some(format!(
            "Transaction blocked: outside allowed time window ({} - {})",
            rule.start_time, rule.end_time
        )))
    }
}

/// Evaluates `controls` in policy order and returns the first violation.
///
/// Merchant category controls run before time windows; evaluation stops at
/// the first violation. Reserved control types never deny.
pub fn evaluate_controls(
    controls: &[ControlValue],
    merchant_category: &str,
    local_time: NaiveTime,
) -> Result<Option<ControlViolation>> {
    let mut ordered: Vec<&ControlValue> = controls.iter().collect();
    ordered.sort_by_key(|control| control.control_type().evaluation_rank());

    for control in ordered {
        let reason = match control {
            ControlValue::MerchantCategory(rule) => check_merchant_category(rule, merchant_category),
            ControlValue::TimeBased(rule) => check_time_window(rule, local_time)?,
            ControlValue::MerchantName(_) | ControlValue::Location(_) => None,
        };
        if let Some(reason) = reason {
            return Ok(Some(ControlViolation {
                control_type: control.control_type(),
                reason,
            }));
        }
    }

    Ok(None)
}
