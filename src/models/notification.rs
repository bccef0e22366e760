use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NotificationKind, NotificationSeverity};

/// Persisted alert addressed to a doctor. Append-only apart from `is_read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub lab_test_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub severity: NotificationSeverity,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}
