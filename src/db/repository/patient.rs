use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{BiologicalSex, CkdStage};
use crate::models::{Doctor, Patient, StageSnapshot};

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, first_name, last_name, email, phone, specialty, hospital)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            doctor.id.to_string(),
            doctor.first_name,
            doctor.last_name,
            doctor.email,
            doctor.phone,
            doctor.specialty,
            doctor.hospital,
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, first_name, last_name, email, phone, specialty, hospital
             FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, first_name, last_name, email, phone, specialty, hospital)) => Ok(Some(Doctor {
            id: super::parse_uuid(&id)?,
            first_name,
            last_name,
            email,
            phone,
            specialty,
            hospital,
        })),
        None => Ok(None),
    }
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, doctor_id, first_name, last_name, email, phone,
         birth_date, sex, ckd_stage, stage_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            patient.id.to_string(),
            patient.doctor_id.to_string(),
            patient.first_name,
            patient.last_name,
            patient.email,
            patient.phone,
            patient.birth_date.to_string(),
            patient.sex.as_str(),
            patient.ckd_stage.map(|s| s.as_str()),
            patient.stage_version,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, doctor_id, first_name, last_name, email, phone, birth_date, sex,
             ckd_stage, stage_version
             FROM patients WHERE id = ?1",
            params![id.to_string()],
            patient_row_from_rusqlite,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// A doctor's patients currently in `stage`, by name.
pub fn list_patients_for_doctor_stage(
    conn: &Connection,
    doctor_id: &Uuid,
    stage: CkdStage,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doctor_id, first_name, last_name, email, phone, birth_date, sex,
         ckd_stage, stage_version
         FROM patients WHERE doctor_id = ?1 AND ckd_stage = ?2
         ORDER BY last_name, first_name",
    )?;
    let rows = stmt
        .query_map(
            params![doctor_id.to_string(), stage.as_str()],
            patient_row_from_rusqlite,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(patient_from_row).collect()
}

/// Read the stage together with its version token.
pub fn get_stage_snapshot(conn: &Connection, patient_id: &Uuid) -> Result<StageSnapshot, DatabaseError> {
    let (stage, version) = conn
        .query_row(
            "SELECT ckd_stage, stage_version FROM patients WHERE id = ?1",
            params![patient_id.to_string()],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: patient_id.to_string(),
        })?;

    Ok(StageSnapshot {
        stage: stage.as_deref().map(CkdStage::from_str).transpose()?,
        version,
    })
}

/// Compare-and-swap stage write. Fails with `StaleVersion` when another
/// writer bumped the version since `expected` was read.
pub fn update_patient_stage(
    conn: &Connection,
    patient_id: &Uuid,
    new_stage: CkdStage,
    expected: &StageSnapshot,
) -> Result<StageSnapshot, DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET ckd_stage = ?1, stage_version = stage_version + 1
         WHERE id = ?2 AND stage_version = ?3",
        params![new_stage.as_str(), patient_id.to_string(), expected.version],
    )?;

    if changed == 0 {
        return Err(DatabaseError::StaleVersion {
            entity_type: "Patient".into(),
            id: patient_id.to_string(),
            expected: expected.version,
        });
    }

    Ok(StageSnapshot {
        stage: Some(new_stage),
        version: expected.version + 1,
    })
}

struct PatientRow {
    id: String,
    doctor_id: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    birth_date: String,
    sex: String,
    ckd_stage: Option<String>,
    stage_version: i64,
}

fn patient_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PatientRow, rusqlite::Error> {
    Ok(PatientRow {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        birth_date: row.get(6)?,
        sex: row.get(7)?,
        ckd_stage: row.get(8)?,
        stage_version: row.get(9)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: super::parse_uuid(&row.id)?,
        doctor_id: super::parse_uuid(&row.doctor_id)?,
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        phone: row.phone,
        birth_date: NaiveDate::parse_from_str(&row.birth_date, "%Y-%m-%d")
            .map_err(|e| DatabaseError::ConstraintViolation(format!("birth_date: {e}")))?,
        sex: BiologicalSex::from_str(&row.sex)?,
        ckd_stage: row.ckd_stage.as_deref().map(CkdStage::from_str).transpose()?,
        stage_version: row.stage_version,
    })
}
