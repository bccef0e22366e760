use serde::{Deserialize, Serialize};

use crate::models::LabTestDefinition;

/// Relative distance from the range midpoint beyond which a result is
/// treated as dangerous, whether or not it is inside the range.
pub const DANGER_DEVIATION: f64 = 0.30;

/// Severity tier of a result relative to its normal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationTier {
    Info,
    Warning,
    Error,
}

impl DeviationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Which side of the range midpoint the value sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationDirection {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    pub is_abnormal: bool,
    pub tier: DeviationTier,
    /// |value - mid| / mid, 0 when the midpoint is 0.
    pub deviation: f64,
    pub direction: DeviationDirection,
}

/// Classifies `value` against the test's normal range.
pub fn evaluate(value: f64, test: &LabTestDefinition) -> DeviationResult {
    let mid = test.normal_mid();
    let deviation = if mid == 0.0 {
        0.0
    } else {
        ((value - mid) / mid).abs()
    };
    let is_abnormal = value < test.normal_min || value > test.normal_max;

    let tier = if deviation > DANGER_DEVIATION {
        DeviationTier::Error
    } else if is_abnormal {
        DeviationTier::Warning
    } else {
        DeviationTier::Info
    };

    let direction = if value < mid {
        DeviationDirection::Low
    } else {
        DeviationDirection::High
    };

    DeviationResult {
        is_abnormal,
        tier,
        deviation,
        direction,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::enums::TestKind;

    fn creatinine() -> LabTestDefinition {
        LabTestDefinition {
            id: Uuid::new_v4(),
            test_name: "Créatinine sanguine".into(),
            description: None,
            unit: "mg/dL".into(),
            normal_min: 0.5,
            normal_max: 1.2,
            category: Some("Sanguin".into()),
            kind: TestKind::Creatinine,
        }
    }

    #[test]
    fn far_above_range_is_error() {
        let result = evaluate(2.0, &creatinine());
        assert!(result.is_abnormal);
        assert_eq!(result.tier, DeviationTier::Error);
        assert!((result.deviation - 1.15 / 0.85).abs() < 1e-9);
        assert_eq!(result.direction, DeviationDirection::High);
    }

    #[test]
    fn inside_range_is_info() {
        let result = evaluate(1.0, &creatinine());
        assert!(!result.is_abnormal);
        assert_eq!(result.tier, DeviationTier::Info);
    }

    #[test]
    fn narrow_range_escalates_any_excursion() {
        // On [0.5, 1.2] the 30% band around 0.85 lies inside the range,
        // so every abnormal creatinine is already an error
        let result = evaluate(1.3, &creatinine());
        assert!(result.is_abnormal);
        assert!((result.deviation - 0.45 / 0.85).abs() < 1e-9);
        assert_eq!(result.tier, DeviationTier::Error);
    }

    #[test]
    fn slightly_out_of_range_is_warning() {
        let mut potassium = creatinine();
        potassium.test_name = "Potassium".into();
        potassium.normal_min = 3.5;
        potassium.normal_max = 5.0;
        let result = evaluate(5.2, &potassium);
        assert!(result.is_abnormal);
        assert!(result.deviation < DANGER_DEVIATION);
        assert_eq!(result.tier, DeviationTier::Warning);
    }

    #[test]
    fn deviation_alone_drives_error_tier() {
        // Wide range: 0.2 is inside [0.1, 2.0] but 80% below the midpoint
        let mut test = creatinine();
        test.normal_min = 0.1;
        test.normal_max = 2.0;
        let result = evaluate(0.2, &test);
        assert!(!result.is_abnormal);
        assert_eq!(result.tier, DeviationTier::Error);
        assert_eq!(result.direction, DeviationDirection::Low);
    }

    #[test]
    fn zero_midpoint_has_no_deviation() {
        let mut test = creatinine();
        test.normal_min = 0.0;
        test.normal_max = 0.0;
        let result = evaluate(0.5, &test);
        assert_eq!(result.deviation, 0.0);
        assert!(result.is_abnormal);
        assert_eq!(result.tier, DeviationTier::Warning);
    }
}
