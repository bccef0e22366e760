use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::LabResult;

const LAB_RESULT_COLUMNS: &str =
    "id, patient_id, doctor_id, lab_test_id, value, result_date, derived_from, recorded_at";

pub fn insert_lab_result(conn: &Connection, lab: &LabResult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO lab_results (id, patient_id, doctor_id, lab_test_id, value,
         result_date, derived_from, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            lab.id.to_string(),
            lab.patient_id.to_string(),
            lab.doctor_id.to_string(),
            lab.lab_test_id.to_string(),
            lab.value,
            lab.result_date.to_string(),
            lab.derived_from.map(|id| id.to_string()),
            super::format_timestamp(&lab.recorded_at),
        ],
    )?;
    Ok(())
}

pub fn get_lab_result(conn: &Connection, id: &Uuid) -> Result<Option<LabResult>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {LAB_RESULT_COLUMNS} FROM lab_results WHERE id = ?1"),
            params![id.to_string()],
            lab_row_from_rusqlite,
        )
        .optional()?;
    row.map(lab_from_row).transpose()
}

/// All results for a patient, most recent result date first.
pub fn get_lab_results_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<LabResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAB_RESULT_COLUMNS} FROM lab_results WHERE patient_id = ?1
         ORDER BY result_date DESC, recorded_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], lab_row_from_rusqlite)?;

    let mut labs = Vec::new();
    for row in rows {
        labs.push(lab_from_row(row?)?);
    }
    Ok(labs)
}

/// Results computed from `source_id` (e.g. the eGFR derived from a creatinine).
pub fn get_derived_results(
    conn: &Connection,
    source_id: &Uuid,
) -> Result<Vec<LabResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAB_RESULT_COLUMNS} FROM lab_results WHERE derived_from = ?1 ORDER BY rowid"
    ))?;
    let rows = stmt.query_map(params![source_id.to_string()], lab_row_from_rusqlite)?;

    let mut labs = Vec::new();
    for row in rows {
        labs.push(lab_from_row(row?)?);
    }
    Ok(labs)
}

// Internal row type for LabResult mapping
struct LabRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    lab_test_id: String,
    value: f64,
    result_date: String,
    derived_from: Option<String>,
    recorded_at: String,
}

fn lab_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<LabRow, rusqlite::Error> {
    Ok(LabRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        lab_test_id: row.get(3)?,
        value: row.get(4)?,
        result_date: row.get(5)?,
        derived_from: row.get(6)?,
        recorded_at: row.get(7)?,
    })
}

fn lab_from_row(row: LabRow) -> Result<LabResult, DatabaseError> {
    Ok(LabResult {
        id: super::parse_uuid(&row.id)?,
        patient_id: super::parse_uuid(&row.patient_id)?,
        doctor_id: super::parse_uuid(&row.doctor_id)?,
        lab_test_id: super::parse_uuid(&row.lab_test_id)?,
        value: row.value,
        result_date: NaiveDate::parse_from_str(&row.result_date, "%Y-%m-%d")
            .map_err(|e| DatabaseError::ConstraintViolation(format!("result_date: {e}")))?,
        derived_from: row.derived_from.as_deref().map(super::parse_uuid).transpose()?,
        recorded_at: super::parse_timestamp(&row.recorded_at)?,
    })
}
