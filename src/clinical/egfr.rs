//! eGFR (DFG) estimation from serum creatinine, MDRD form.

use serde::{Deserialize, Serialize};

const MDRD_BASE: f64 = 186.0;
const CREATININE_EXPONENT: f64 = -1.154;
const AGE_EXPONENT: f64 = -0.203;
const FEMALE_FACTOR: f64 = 0.742;

/// Population adjustment applied by the reference deployment.
pub const DEFAULT_ETHNICITY_FACTOR: f64 = 1.212;

/// Clinical plausibility ceiling. Values above are clamped, not rejected.
pub const EGFR_CEILING: f64 = 200.0;

/// Overridable policy inputs of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgfrParams {
    pub ethnicity_factor: f64,
}

impl Default for EgfrParams {
    fn default() -> Self {
        Self {
            ethnicity_factor: DEFAULT_ETHNICITY_FACTOR,
        }
    }
}

impl EgfrParams {
    pub fn without_ethnicity_adjustment() -> Self {
        Self {
            ethnicity_factor: 1.0,
        }
    }
}

/// Estimated GFR in mL/min/1.73m², rounded and clamped to [0, 200].
///
/// `creatinine_mg_dl` must be strictly positive; callers reject anything
/// else before getting here.
pub fn compute_egfr(creatinine_mg_dl: f64, age_years: u32, is_female: bool, params: &EgfrParams) -> u32 {
    debug_assert!(creatinine_mg_dl > 0.0);

    let sex_factor = if is_female { FEMALE_FACTOR } else { 1.0 };
    let raw = MDRD_BASE
        * creatinine_mg_dl.powf(CREATININE_EXPONENT)
        * f64::from(age_years).powf(AGE_EXPONENT)
        * sex_factor
        * params.ethnicity_factor;

    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, EGFR_CEILING) as u32
}
