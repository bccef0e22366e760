//! Intake normalisation: raw submission in, typed submission out.
//! Runs before any pipeline step, so nothing here touches the database.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clinical::parse_decimal;

#[derive(Error, Debug, PartialEq)]
pub enum IntakeError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid identifier for {field}: {value}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Result value must be a valid number, got: {0}")]
    InvalidValue(String),

    #[error("Invalid result date: {0}")]
    InvalidDate(String),

    #[error("Creatinine must be strictly positive, got: {0}")]
    NonPositiveCreatinine(f64),
}

/// Numeric value as sent by the client: a JSON number or a locale string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn normalize(&self) -> Result<f64, IntakeError> {
        let value = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_decimal(s),
        };
        value
            .filter(|v| v.is_finite())
            .ok_or_else(|| IntakeError::InvalidValue(self.to_string()))
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A lab result submission as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub lab_test_id: Option<String>,
    pub result_value: Option<RawValue>,
    pub result_date: Option<String>,
}

/// A submission whose fields all parsed. Identifiers are not yet resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabSubmission {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub lab_test_id: Uuid,
    pub value: f64,
    pub result_date: NaiveDate,
}

impl IntakeRequest {
    pub fn validate(&self) -> Result<LabSubmission, IntakeError> {
        let patient_id = required_uuid("patientId", self.patient_id.as_deref())?;
        let doctor_id = required_uuid("doctorId", self.doctor_id.as_deref())?;
        let lab_test_id = required_uuid("labTestId", self.lab_test_id.as_deref())?;

        let value = self
            .result_value
            .as_ref()
            .ok_or(IntakeError::MissingField("resultValue"))?
            .normalize()?;

        let raw_date = self
            .result_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(IntakeError::MissingField("resultDate"))?;
        let result_date = parse_result_date(raw_date)?;

        Ok(LabSubmission {
            patient_id,
            doctor_id,
            lab_test_id,
            value,
            result_date,
        })
    }
}

fn required_uuid(field: &'static str, raw: Option<&str>) -> Result<Uuid, IntakeError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(IntakeError::MissingField(field))?;
    Uuid::parse_str(raw).map_err(|_| IntakeError::InvalidIdentifier {
        field,
        value: raw.to_string(),
    })
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive ISO timestamps.
/// Timestamps keep the calendar date as written.
fn parse_result_date(raw: &str) -> Result<NaiveDate, IntakeError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|ts| ts.date())
        .map_err(|_| IntakeError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(value: serde_json::Value) -> IntakeRequest {
        serde_json::from_value(serde_json::json!({
            "patientId": "6f1c2b8e-8a4e-4c7a-9a55-2f0d7b1e3c11",
            "doctorId": "0b7e6a52-4f0e-4d8b-b1a3-5d2c9e8f7a10",
            "labTestId": "a3d5c7e9-1b2f-4a6c-8e0d-9f1b3c5d7e20",
            "resultValue": value,
            "resultDate": "2024-03-01",
        }))
        .unwrap()
    }

    #[test]
    fn numeric_and_locale_values_normalize() {
        assert_eq!(request(serde_json::json!(1.8)).validate().unwrap().value, 1.8);
        assert_eq!(request(serde_json::json!("1,8")).validate().unwrap().value, 1.8);
        assert_eq!(request(serde_json::json!(" 2.5 ")).validate().unwrap().value, 2.5);
        assert_eq!(request(serde_json::json!(7)).validate().unwrap().value, 7.0);
    }

    #[test]
    fn non_numeric_value_rejected() {
        let err = request(serde_json::json!("élevé")).validate().unwrap_err();
        assert!(matches!(err, IntakeError::InvalidValue(_)));
    }

    #[test]
    fn missing_fields_named() {
        let mut req = request(serde_json::json!(1.0));
        req.patient_id = None;
        assert_eq!(req.validate().unwrap_err(), IntakeError::MissingField("patientId"));

        let mut req = request(serde_json::json!(1.0));
        req.result_value = None;
        assert_eq!(req.validate().unwrap_err(), IntakeError::MissingField("resultValue"));

        let mut req = request(serde_json::json!(1.0));
        req.result_date = Some("  ".into());
        assert_eq!(req.validate().unwrap_err(), IntakeError::MissingField("resultDate"));
    }

    #[test]
    fn malformed_identifier_rejected() {
        let mut req = request(serde_json::json!(1.0));
        req.lab_test_id = Some("42".into());
        assert!(matches!(
            req.validate().unwrap_err(),
            IntakeError::InvalidIdentifier { field: "labTestId", .. }
        ));
    }

    #[test]
    fn date_formats() {
        let mut req = request(serde_json::json!(1.0));
        req.result_date = Some("2024-03-01T23:30:00+02:00".into());
        assert_eq!(
            req.validate().unwrap().result_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );

        req.result_date = Some("2024-03-01T08:00:00.000".into());
        assert_eq!(
            req.validate().unwrap().result_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );

        req.result_date = Some("01/03/2024".into());
        assert!(matches!(req.validate().unwrap_err(), IntakeError::InvalidDate(_)));
    }
}
