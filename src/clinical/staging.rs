use serde::{Deserialize, Serialize};

use crate::models::enums::CkdStage;

/// Inclusive lower eGFR bounds, checked in descending order.
const STAGE_THRESHOLDS: [(f64, CkdStage); 5] = [
    (90.0, CkdStage::Stage1),
    (60.0, CkdStage::Stage2),
    (45.0, CkdStage::Stage3A),
    (30.0, CkdStage::Stage3B),
    (15.0, CkdStage::Stage4),
];

/// Maps an eGFR value to its CKD stage. Total: anything below 15,
/// including negative or NaN input, is Stage 5.
pub fn classify_stage(egfr: f64) -> CkdStage {
    STAGE_THRESHOLDS
        .iter()
        .find(|(lower, _)| egfr >= *lower)
        .map(|(_, stage)| *stage)
        .unwrap_or(CkdStage::Stage5)
}

/// A transition between the stored stage and a freshly classified one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub previous: Option<CkdStage>,
    pub current: CkdStage,
    pub egfr: u32,
}

impl StageChange {
    pub fn is_worsening(&self) -> bool {
        self.previous.map_or(false, |p| self.current > p)
    }
}

/// Returns the change implied by `egfr`, or None when the stage holds.
pub fn detect_stage_change(previous: Option<CkdStage>, egfr: u32) -> Option<StageChange> {
    let current = classify_stage(f64::from(egfr));
    if previous == Some(current) {
        return None;
    }
    Some(StageChange {
        previous,
        current,
        egfr,
    })
}
