use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TestKind;

/// Reference definition of a lab test. Never written by the evaluation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTestDefinition {
    pub id: Uuid,
    pub test_name: String,
    pub description: Option<String>,
    pub unit: String,
    pub normal_min: f64,
    pub normal_max: f64,
    pub category: Option<String>,
    pub kind: TestKind,
}

impl LabTestDefinition {
    pub fn normal_mid(&self) -> f64 {
        (self.normal_min + self.normal_max) / 2.0
    }
}

/// One recorded (or derived) lab value. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResult {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub lab_test_id: Uuid,
    pub value: f64,
    pub result_date: NaiveDate,
    /// Source result when this value was computed rather than measured.
    pub derived_from: Option<Uuid>,
    pub recorded_at: NaiveDateTime,
}
