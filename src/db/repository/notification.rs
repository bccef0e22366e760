use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{NotificationKind, NotificationSeverity};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str =
    "id, patient_id, doctor_id, lab_test_id, kind, severity, message, is_read, created_at";

/// Append a notification. Notifications are never updated except for `is_read`.
pub fn insert_notification(
    conn: &Connection,
    notification: &Notification,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, patient_id, doctor_id, lab_test_id, kind, severity,
         message, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            notification.id.to_string(),
            notification.patient_id.to_string(),
            notification.doctor_id.to_string(),
            notification.lab_test_id.map(|id| id.to_string()),
            notification.kind.as_str(),
            notification.severity.as_str(),
            notification.message,
            notification.is_read as i32,
            super::format_timestamp(&notification.created_at),
        ],
    )?;
    Ok(())
}

/// Doctor inbox, newest first.
pub fn list_notifications_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
    limit: u32,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE doctor_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string(), limit], notification_row_from_rusqlite)?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(notification_from_row(row?)?);
    }
    Ok(notifications)
}

pub fn get_notifications_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE patient_id = ?1
         ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], notification_row_from_rusqlite)?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(notification_from_row(row?)?);
    }
    Ok(notifications)
}

/// Unread notifications for a doctor, optionally restricted to one severity.
/// `Some(Error)` gives the "critical" badge count.
pub fn count_unread(
    conn: &Connection,
    doctor_id: &Uuid,
    severity: Option<NotificationSeverity>,
) -> Result<i64, DatabaseError> {
    let count = match severity {
        Some(severity) => conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE doctor_id = ?1 AND is_read = 0 AND severity = ?2",
            params![doctor_id.to_string(), severity.as_str()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE doctor_id = ?1 AND is_read = 0",
            params![doctor_id.to_string()],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// Mark one notification read. Scoped to its owning doctor.
pub fn mark_notification_read(
    conn: &Connection,
    notification_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND doctor_id = ?2",
        params![notification_id.to_string(), doctor_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Notification".into(),
            id: notification_id.to_string(),
        });
    }
    Ok(())
}

/// Returns the number of notifications that flipped to read.
pub fn mark_all_read(conn: &Connection, doctor_id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE doctor_id = ?1 AND is_read = 0",
        params![doctor_id.to_string()],
    )?;
    Ok(changed)
}

struct NotificationRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    lab_test_id: Option<String>,
    kind: String,
    severity: String,
    message: String,
    is_read: i32,
    created_at: String,
}

fn notification_row_from_rusqlite(
    row: &rusqlite::Row<'_>,
) -> Result<NotificationRow, rusqlite::Error> {
    Ok(NotificationRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        lab_test_id: row.get(3)?,
        kind: row.get(4)?,
        severity: row.get(5)?,
        message: row.get(6)?,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn notification_from_row(row: NotificationRow) -> Result<Notification, DatabaseError> {
    Ok(Notification {
        id: super::parse_uuid(&row.id)?,
        patient_id: super::parse_uuid(&row.patient_id)?,
        doctor_id: super::parse_uuid(&row.doctor_id)?,
        lab_test_id: row.lab_test_id.as_deref().map(super::parse_uuid).transpose()?,
        kind: NotificationKind::from_str(&row.kind)?,
        severity: NotificationSeverity::from_str(&row.severity)?,
        message: row.message,
        is_read: row.is_read != 0,
        created_at: super::parse_timestamp(&row.created_at)?,
    })
}
