use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertDirection, CkdStage, RequirementAction};

/// Doctor-authored monitoring protocol for one CKD stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub ckd_stage: CkdStage,
    pub requirements: Vec<WorkflowRequirement>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRequirement {
    pub id: Uuid,
    /// Exact, case-sensitive test name this rule watches.
    pub test_name: String,
    /// Informational only ("monthly", "every 3 months").
    pub frequency: String,
    pub alert: AlertCondition,
    pub action: RequirementAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertCondition {
    pub direction: AlertDirection,
    /// Threshold as entered by the doctor; may use a decimal comma.
    pub threshold: String,
    pub unit: Option<String>,
}
