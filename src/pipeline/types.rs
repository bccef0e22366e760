use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::alerting::DeliveryWarning;
use crate::clinical::deviation::DeviationResult;
use crate::clinical::workflow_rules::FiredRequirement;
use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::models::enums::CkdStage;
use crate::models::{LabResult, Notification};

use super::intake::IntakeError;

/// Side effects applied for one submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub lab_result: LabResult,
    pub derived_result: Option<LabResult>,
    /// Computed eGFR, present for creatinine results.
    pub egfr: Option<u32>,
    pub deviation: DeviationResult,
    pub stage_before: Option<CkdStage>,
    pub stage: Option<CkdStage>,
    pub stage_changed: bool,
    pub fired_requirements: Vec<FiredRequirement>,
    /// Notifications written by this submission.
    pub notifications: Vec<Notification>,
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineOutcome {
    /// True when some optional step did not complete.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_delivery_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::Delivery(_)))
    }
}

/// Result of registering a new workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRegistration {
    pub workflow_id: Uuid,
    /// Patients of the author currently in the workflow's stage.
    pub patients_covered: usize,
    pub warnings: Vec<DeliveryWarning>,
}

/// Non-fatal problems, attached to an otherwise successful outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// No catalog entry to file the computed eGFR under.
    EgfrDefinitionMissing { test_name: String },
    DerivedResultFailed { reason: String },
    WorkflowsUnavailable { reason: String },
    NotificationsNotPersisted { reason: String },
    Delivery(DeliveryWarning),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid submission: {0}")]
    Intake(#[from] IntakeError),

    #[error("Unknown {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Stage update and its notification could not be applied together.
    /// The primary result stays recorded.
    #[error("Stage update failed for lab result {lab_result_id}: {reason}")]
    Consistency { lab_result_id: Uuid, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    /// The caller sent something unusable; nothing was written.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Intake(_) | Self::NotFound { .. })
    }

    /// Server-side failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    /// Primary result id when it was stored before the failure.
    pub fn recorded_result(&self) -> Option<Uuid> {
        match self {
            Self::Consistency { lab_result_id, .. } => Some(*lab_result_id),
            _ => None,
        }
    }
}
