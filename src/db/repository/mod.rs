//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table family; all public functions are re-exported
//! here so callers write `repository::insert_lab_result(..)`.

mod lab_result;
mod notification;
mod patient;
mod workflow;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::DatabaseError;

pub use lab_result::*;
pub use lab_test::*;
pub use notification::*;
pub use patient::*;
pub use workflow::*;

/// Fixed-width nanoseconds: lossless for `chrono::Local::now()` and
/// lexically ordered for `ORDER BY`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("timestamp {s}: {e}")))
}
