// crates/link-locker-core/src/runtime/rates.rs
// ============================================================================
// Module: Link Locker Bulk Rate Import
// Description: Validation and merge of bulk CPM rows into targeting overrides.
// Purpose: Reject a whole batch on any bad row and merge valid batches.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! Rate rows arrive already decoded from CSV by the caller. The batch is
//! validated in full before anything is merged, so a bad row never leaves a
//! partially applied import behind. Merging keys overrides by
//! `(device, COUNTRY_CODE)` and keeps each slot's existing task and ad URL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::CountryCode;
use crate::core::Device;
use crate::core::DeviceTargetingOverride;
use crate::core::Money;
use crate::core::OverrideKey;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One decoded upload row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    /// Country name or code.
    #[serde(default)]
    pub country: String,
    /// CPM as a JSON number or string.
    #[serde(default)]
    pub cpm: Value,
    /// Explicit two-letter code.
    #[serde(default)]
    pub country_code: Option<String>,
}

/// A validated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRate {
    /// Resolved country code.
    pub country_code: CountryCode,
    /// Parsed CPM.
    pub cpm: Money,
}

/// One row-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based row number.
    pub row: usize,
    /// Human-readable reason.
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

/// Batch rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateImportError {
    /// The upload carried no rows.
    #[error("rate upload is empty")]
    Empty,
    /// One or more rows failed validation.
    #[error("rate upload rejected: {}", render_rows(.0))]
    InvalidRows(Vec<RowError>),
}

/// Renders row errors for the error message.
fn render_rows(rows: &[RowError]) -> String {
    rows.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates every row, failing the batch when any row is invalid.
///
/// # Errors
///
/// Returns [`RateImportError`] listing every invalid row.
pub fn validate_rows(rows: &[RateRow]) -> Result<Vec<ValidRate>, RateImportError> {
    if rows.is_empty() {
        return Err(RateImportError::Empty);
    }
    let mut valid = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match validate_row(row) {
            Ok(rate) => valid.push(rate),
            Err(message) => errors.push(RowError {
                row: index + 1,
                message,
            }),
        }
    }
    if errors.is_empty() { Ok(valid) } else { Err(RateImportError::InvalidRows(errors)) }
}

/// Validates one row.
fn validate_row(row: &RateRow) -> Result<ValidRate, String> {
    let country = row.country.trim();
    if country.is_empty() {
        return Err("country is required".to_string());
    }
    let cpm_text = match &row.cpm {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Null => return Err("cpm is required".to_string()),
        _ => return Err("cpm must be a number".to_string()),
    };
    let cpm = Money::parse_non_negative(&cpm_text).map_err(|err| err.to_string())?;
    let explicit = row.country_code.as_deref().map(str::trim).filter(|code| !code.is_empty());
    let country_code = match explicit {
        Some(code) => CountryCode::parse(code).map_err(|err| err.to_string())?,
        None => CountryCode::parse(country)
            .map_err(|_| format!("country_code is required for country {country}"))?,
    };
    Ok(ValidRate {
        country_code,
        cpm,
    })
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges validated rates into a device's existing overrides.
///
/// Later rows for the same country win. Returns the overrides to save.
#[must_use]
pub fn merge_rates(
    device: Device,
    existing: &[DeviceTargetingOverride],
    rates: Vec<ValidRate>,
) -> Vec<DeviceTargetingOverride> {
    let mut merged: BTreeMap<OverrideKey, DeviceTargetingOverride> = BTreeMap::new();
    for rate in rates {
        let key = OverrideKey {
            device,
            country_code: rate.country_code.clone(),
        };
        let entry = merged.entry(key.clone()).or_insert_with(|| {
            existing
                .iter()
                .find(|current| current.key() == key)
                .cloned()
                .unwrap_or_else(|| DeviceTargetingOverride::new(device, rate.country_code))
        });
        entry.cpm = Some(rate.cpm);
    }
    merged.into_values().collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use serde_json::json;

    use super::*;
    use crate::core::TaskId;

    fn row(country: &str, cpm: Value, code: Option<&str>) -> RateRow {
        RateRow {
            country: country.to_string(),
            cpm,
            country_code: code.map(str::to_string),
        }
    }

    #[test]
    fn validates_numbers_strings_and_codes() {
        let rows = vec![
            row("United States", json!(4.5), Some("us")),
            row("DE", json!("2.10"), None),
        ];
        let valid = validate_rows(&rows).unwrap();
        assert_eq!(valid[0].country_code.as_str(), "US");
        assert_eq!(valid[0].cpm.to_string(), "4.5");
        assert_eq!(valid[1].country_code.as_str(), "DE");
        assert_eq!(valid[1].cpm.to_string(), "2.1");
    }

    #[test]
    fn one_bad_row_rejects_the_batch_with_row_numbers() {
        let rows = vec![
            row("US", json!(1), None),
            row("France", json!(1), None),
            row("GB", json!(-1), None),
            row("", json!(1), None),
            row("CA", json!(true), None),
        ];
        let Err(RateImportError::InvalidRows(errors)) = validate_rows(&rows) else {
            panic!("expected invalid rows");
        };
        let numbers: Vec<usize> = errors.iter().map(|err| err.row).collect();
        assert_eq!(numbers, vec![2, 3, 4, 5]);
        assert_eq!(validate_rows(&[]), Err(RateImportError::Empty));
    }

    #[test]
    fn out_of_range_cpm_rows_are_rejected() {
        let rows = vec![
            row("US", json!(1e300), None),
            row("DE", json!("1e400000"), None),
            row("FR", json!("0.5"), None),
        ];
        let Err(RateImportError::InvalidRows(errors)) = validate_rows(&rows) else {
            panic!("expected invalid rows");
        };
        let numbers: Vec<usize> = errors.iter().map(|err| err.row).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(errors[0].message.contains("invalid decimal amount"));
    }

    #[test]
    fn merge_preserves_task_and_url_and_last_row_wins() {
        let mut current = DeviceTargetingOverride::new(Device::Mobile, CountryCode::us());
        current.task_id = Some(TaskId::new("t1"));
        current.ad_url = Some("https://ads.example/us".to_string());
        current.cpm = Some(Money::parse("1").unwrap());
        let rates = validate_rows(&[
            row("US", json!("3"), None),
            row("FR", json!("2"), None),
            row("US", json!("5"), None),
        ])
        .unwrap();
        let merged = merge_rates(Device::Mobile, &[current], rates);
        assert_eq!(merged.len(), 2);
        let us = merged.iter().find(|item| item.country_code.as_str() == "US").unwrap();
        assert_eq!(us.task_id, Some(TaskId::new("t1")));
        assert_eq!(us.ad_url.as_deref(), Some("https://ads.example/us"));
        assert_eq!(us.cpm.as_ref().unwrap().to_string(), "5");
        let fr = merged.iter().find(|item| item.country_code.as_str() == "FR").unwrap();
        assert_eq!(fr.device, Device::Mobile);
        assert!(fr.task_id.is_none());
    }
}
