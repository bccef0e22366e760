use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{AlertDirection, CkdStage, RequirementAction};
use crate::models::{AlertCondition, Workflow, WorkflowRequirement};

/// Insert a workflow and its requirements (in order) atomically.
pub fn insert_workflow(conn: &mut Connection, workflow: &Workflow) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO workflows (id, doctor_id, name, description, ckd_stage, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            workflow.id.to_string(),
            workflow.doctor_id.to_string(),
            workflow.name,
            workflow.description,
            workflow.ckd_stage.as_str(),
            super::format_timestamp(&workflow.created_at),
        ],
    )?;

    for (position, req) in workflow.requirements.iter().enumerate() {
        tx.execute(
            "INSERT INTO workflow_requirements (id, workflow_id, position, test_name, frequency,
             alert_direction, alert_threshold, alert_unit, action)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                req.id.to_string(),
                workflow.id.to_string(),
                position as i64,
                req.test_name,
                req.frequency,
                req.alert.direction.as_str(),
                req.alert.threshold,
                req.alert.unit,
                req.action.as_str(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn get_workflow(conn: &Connection, id: &Uuid) -> Result<Option<Workflow>, DatabaseError> {
    let header = conn
        .query_row(
            "SELECT id, doctor_id, name, description, ckd_stage, created_at
             FROM workflows WHERE id = ?1",
            params![id.to_string()],
            workflow_row_from_rusqlite,
        )
        .optional()?;

    match header {
        Some(row) => Ok(Some(hydrate(conn, row)?)),
        None => Ok(None),
    }
}

pub fn list_workflows_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Workflow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doctor_id, name, description, ckd_stage, created_at
         FROM workflows WHERE doctor_id = ?1 ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], workflow_row_from_rusqlite)?;

    let mut workflows = Vec::new();
    for row in rows {
        workflows.push(hydrate(conn, row?)?);
    }
    Ok(workflows)
}

/// Workflows a doctor authored for one stage.
pub fn get_workflows_for_doctor_stage(
    conn: &Connection,
    doctor_id: &Uuid,
    stage: CkdStage,
) -> Result<Vec<Workflow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doctor_id, name, description, ckd_stage, created_at
         FROM workflows WHERE doctor_id = ?1 AND ckd_stage = ?2 ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map(
        params![doctor_id.to_string(), stage.as_str()],
        workflow_row_from_rusqlite,
    )?;

    let mut workflows = Vec::new();
    for row in rows {
        workflows.push(hydrate(conn, row?)?);
    }
    Ok(workflows)
}

struct WorkflowRow {
    id: String,
    doctor_id: String,
    name: String,
    description: Option<String>,
    ckd_stage: String,
    created_at: String,
}

fn workflow_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<WorkflowRow, rusqlite::Error> {
    Ok(WorkflowRow {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        ckd_stage: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn hydrate(conn: &Connection, row: WorkflowRow) -> Result<Workflow, DatabaseError> {
    let requirements = get_requirements(conn, &row.id)?;
    Ok(Workflow {
        id: super::parse_uuid(&row.id)?,
        doctor_id: super::parse_uuid(&row.doctor_id)?,
        name: row.name,
        description: row.description,
        ckd_stage: CkdStage::from_str(&row.ckd_stage)?,
        requirements,
        created_at: super::parse_timestamp(&row.created_at)?,
    })
}

fn get_requirements(
    conn: &Connection,
    workflow_id: &str,
) -> Result<Vec<WorkflowRequirement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, test_name, frequency, alert_direction, alert_threshold, alert_unit, action
         FROM workflow_requirements WHERE workflow_id = ?1 ORDER BY position",
    )?;

    let rows = stmt.query_map(params![workflow_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut requirements = Vec::new();
    for row in rows {
        let (id, test_name, frequency, direction, threshold, unit, action) = row?;
        requirements.push(WorkflowRequirement {
            id: super::parse_uuid(&id)?,
            test_name,
            frequency,
            alert: AlertCondition {
                direction: AlertDirection::from_str(&direction)?,
                threshold,
                unit,
            },
            action: RequirementAction::from_str(&action)?,
        });
    }
    Ok(requirements)
}
