//! Lab result pipeline: intake validation, per-patient ordering,
//! orchestration of the clinical and alerting steps.

pub mod intake;
pub mod lines;
pub mod locks;
pub mod orchestrator;
pub mod types;

pub use intake::{IntakeError, IntakeRequest, LabSubmission, RawValue};
pub use lines::{serve_lines, LineStats};
pub use orchestrator::ResultPipeline;
pub use types::{PipelineError, PipelineOutcome, PipelineWarning, WorkflowRegistration};
