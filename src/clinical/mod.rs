//! Clinical evaluation: pure functions over one lab result.
//!
//! Nothing in here touches the notification store or the outbound
//! channels. The only persistence is catalog seeding in `reference`.

pub mod deviation;
pub mod egfr;
pub mod reference;
pub mod staging;
pub mod workflow_rules;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClinicalError {
    #[error("Failed to load reference data from {0}: {1}")]
    ReferenceDataLoad(String, String),

    #[error("Failed to parse reference data {0}: {1}")]
    ReferenceDataParse(String, String),
}

/// Parses a locale-formatted decimal ("1,5", " 2.0 ").
///
/// The first comma becomes the decimal point, then the remainder must be a
/// plain finite number. Thousands separators are not supported.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replacen(',', ".", 1);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
