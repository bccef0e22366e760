use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{AlertDirection, CkdStage, RequirementAction};
use crate::models::{Workflow, WorkflowRequirement};

use super::parse_decimal;

/// A workflow requirement whose alert condition held for the incoming value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredRequirement {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub requirement: WorkflowRequirement,
    pub threshold: f64,
    pub value: f64,
}

impl FiredRequirement {
    pub fn action(&self) -> RequirementAction {
        self.requirement.action
    }

    pub fn direction(&self) -> AlertDirection {
        self.requirement.alert.direction
    }

    pub fn test_name(&self) -> &str {
        &self.requirement.test_name
    }
}

/// Finds the requirements that fire for one result.
///
/// `snapshot_stage` is the stage the patient held when the result arrived,
/// never the stage this same result may produce. A patient with no stage
/// yet is covered by no workflow. Test names match exactly, case included.
pub fn match_rules(
    snapshot_stage: Option<CkdStage>,
    doctor_id: &Uuid,
    test_name: &str,
    value: f64,
    workflows: &[Workflow],
) -> Vec<FiredRequirement> {
    let Some(stage) = snapshot_stage else {
        return Vec::new();
    };

    let mut fired = Vec::new();

    for workflow in workflows
        .iter()
        .filter(|w| w.doctor_id == *doctor_id && w.ckd_stage == stage)
    {
        for requirement in workflow
            .requirements
            .iter()
            .filter(|r| r.test_name == test_name)
        {
            let Some(threshold) = parse_decimal(&requirement.alert.threshold) else {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    requirement_id = %requirement.id,
                    threshold = %requirement.alert.threshold,
                    "Unparseable workflow threshold, requirement skipped"
                );
                continue;
            };

            if requirement.alert.direction.fires(value, threshold) {
                fired.push(FiredRequirement {
                    workflow_id: workflow.id,
                    workflow_name: workflow.name.clone(),
                    requirement: requirement.clone(),
                    threshold,
                    value,
                });
            }
        }
    }

    fired
}
