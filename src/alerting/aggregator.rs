use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::clinical::deviation::{DeviationResult, DeviationTier};
use crate::clinical::staging::StageChange;
use crate::clinical::workflow_rules::FiredRequirement;
use crate::models::enums::{NotificationKind, NotificationSeverity, RequirementAction, TestKind};
use crate::models::{Doctor, LabTestDefinition, Notification, Patient, Workflow};

use super::messages::MessageTemplates;
use super::types::{ChannelKind, DeliveryPurpose, DeliveryWarning, OutboundMessage};

/// Everything the aggregator needs to know about the incoming result.
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    pub patient: &'a Patient,
    pub doctor: &'a Doctor,
    pub test: &'a LabTestDefinition,
    pub value: f64,
    pub result_date: NaiveDate,
}

/// Notifications and deliveries produced for one result.
#[derive(Debug, Clone)]
pub struct AlertBatch {
    pub deviation: Notification,
    /// Written together with the stage update, never on its own.
    pub stage_change: Option<Notification>,
    pub protocol: Vec<Notification>,
    pub deliveries: Vec<OutboundMessage>,
    /// Deliveries that could not even be attempted (no address on file).
    pub undeliverable: Vec<DeliveryWarning>,
}

impl AlertBatch {
    /// Notifications persisted outside the stage transaction.
    pub fn standalone(&self) -> Vec<Notification> {
        std::iter::once(self.deviation.clone())
            .chain(self.protocol.iter().cloned())
            .collect()
    }
}

/// Inbox severity of the deviation notification. Kidney-function tests are
/// filed under "dfg" whatever their tier; the wording still follows the tier.
pub fn deviation_severity(kind: TestKind, tier: DeviationTier) -> NotificationSeverity {
    if kind.is_kidney_function() {
        return NotificationSeverity::Dfg;
    }
    match tier {
        DeviationTier::Error => NotificationSeverity::Error,
        DeviationTier::Warning => NotificationSeverity::Warning,
        DeviationTier::Info => NotificationSeverity::Info,
    }
}

pub fn aggregate(
    ctx: &ResultContext<'_>,
    deviation: &DeviationResult,
    stage_change: Option<&StageChange>,
    fired: &[FiredRequirement],
    now: NaiveDateTime,
) -> AlertBatch {
    let patient_name = ctx.patient.full_name();

    let deviation_text =
        MessageTemplates::deviation(&ctx.test.test_name, ctx.value, &ctx.test.unit, deviation);
    let deviation_notification = Notification {
        id: Uuid::new_v4(),
        patient_id: ctx.patient.id,
        doctor_id: ctx.doctor.id,
        lab_test_id: Some(ctx.test.id),
        kind: NotificationKind::LabResult,
        severity: deviation_severity(ctx.test.kind, deviation.tier),
        message: MessageTemplates::for_patient(&patient_name, &deviation_text),
        is_read: false,
        created_at: now,
    };

    let stage_notification = stage_change.map(|change| Notification {
        id: Uuid::new_v4(),
        patient_id: ctx.patient.id,
        doctor_id: ctx.patient.doctor_id,
        lab_test_id: None,
        kind: NotificationKind::StageChange,
        severity: NotificationSeverity::Warning,
        message: MessageTemplates::stage_change(
            &patient_name,
            change.previous,
            change.current,
            change.egfr,
        ),
        is_read: false,
        created_at: now,
    });

    let mut deliveries = Vec::new();
    let mut undeliverable = Vec::new();

    match non_empty(ctx.patient.email.as_deref()) {
        Some(email) => deliveries.push(OutboundMessage::Email {
            purpose: DeliveryPurpose::PatientResult,
            to: email.to_string(),
            subject: MessageTemplates::result_email_subject().to_string(),
            html: MessageTemplates::result_email_html(
                &ctx.test.test_name,
                ctx.value,
                &ctx.test.unit,
                ctx.test.normal_min,
                ctx.test.normal_max,
                ctx.result_date,
                &ctx.doctor.display_name(),
            ),
        }),
        None => tracing::debug!(patient_id = %ctx.patient.id, "No patient email, result email skipped"),
    }

    let mut protocol = Vec::new();
    for requirement in dedup_fired(fired) {
        let message = MessageTemplates::protocol_alert(
            &patient_name,
            &requirement.workflow_name,
            requirement.test_name(),
            requirement.value,
            &ctx.test.unit,
            requirement.direction(),
            requirement.threshold,
        );
        let notification = Notification {
            id: Uuid::new_v4(),
            patient_id: ctx.patient.id,
            doctor_id: ctx.doctor.id,
            lab_test_id: Some(ctx.test.id),
            kind: NotificationKind::Protocol,
            severity: NotificationSeverity::Warning,
            message,
            is_read: false,
            created_at: now,
        };

        if requirement.action() == RequirementAction::Email {
            match non_empty(ctx.doctor.email.as_deref()) {
                Some(email) => deliveries.push(OutboundMessage::Email {
                    purpose: DeliveryPurpose::ProtocolAlert,
                    to: email.to_string(),
                    subject: MessageTemplates::protocol_email_subject(&requirement.workflow_name),
                    html: MessageTemplates::protocol_email_html(
                        &notification.message,
                        notification.severity.as_str(),
                        ctx.result_date,
                    ),
                }),
                None => undeliverable.push(DeliveryWarning {
                    channel: ChannelKind::Email,
                    purpose: DeliveryPurpose::ProtocolAlert,
                    recipient: ctx.doctor.display_name(),
                    reason: "doctor has no email address".into(),
                }),
            }
        }

        protocol.push(notification);
    }

    if deviation.tier == DeviationTier::Error {
        if let Some(phone) = non_empty(ctx.doctor.phone.as_deref()) {
            deliveries.push(OutboundMessage::Sms {
                purpose: DeliveryPurpose::CriticalResult,
                to: phone.to_string(),
                body: MessageTemplates::critical_sms(&deviation_notification.message),
            });
        }
    }

    AlertBatch {
        deviation: deviation_notification,
        stage_change: stage_notification,
        protocol,
        deliveries,
        undeliverable,
    }
}

/// Emails announcing a new workflow: one to its author, one per covered
/// patient with an address on file.
pub fn workflow_announcements(
    workflow: &Workflow,
    doctor: &Doctor,
    patients: &[Patient],
) -> (Vec<OutboundMessage>, Vec<DeliveryWarning>) {
    let doctor_name = doctor.display_name();
    let mut deliveries = Vec::new();
    let mut undeliverable = Vec::new();

    match non_empty(doctor.email.as_deref()) {
        Some(email) => deliveries.push(OutboundMessage::Email {
            purpose: DeliveryPurpose::WorkflowAnnouncement,
            to: email.to_string(),
            subject: MessageTemplates::workflow_created_subject().to_string(),
            html: MessageTemplates::workflow_created_html(workflow, &doctor_name, patients.len()),
        }),
        None => undeliverable.push(DeliveryWarning {
            channel: ChannelKind::Email,
            purpose: DeliveryPurpose::WorkflowAnnouncement,
            recipient: doctor_name.clone(),
            reason: "doctor has no email address".into(),
        }),
    }

    for patient in patients {
        if let Some(email) = non_empty(patient.email.as_deref()) {
            deliveries.push(OutboundMessage::Email {
                purpose: DeliveryPurpose::WorkflowAnnouncement,
                to: email.to_string(),
                subject: MessageTemplates::workflow_notice_subject().to_string(),
                html: MessageTemplates::workflow_notice_html(
                    &patient.full_name(),
                    &doctor_name,
                    workflow,
                ),
            });
        }
    }

    (deliveries, undeliverable)
}

/// Collapses requirements with the same test, direction, threshold and action.
fn dedup_fired(fired: &[FiredRequirement]) -> Vec<&FiredRequirement> {
    let mut seen = HashSet::new();
    fired
        .iter()
        .filter(|f| {
            seen.insert((
                f.test_name().to_string(),
                f.direction().as_str(),
                f.threshold.to_bits(),
                f.action().as_str(),
            ))
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
