use chrono::NaiveDate;

use crate::clinical::deviation::{DeviationDirection, DeviationResult, DeviationTier};
use crate::models::enums::{AlertDirection, CkdStage};
use crate::models::Workflow;

const EGFR_UNIT: &str = "mL/min/1.73m²";

/// Message templates for notifications, emails and text messages.
/// Notification text is short and starts with the patient name so the
/// doctor's inbox reads well as a list.
pub struct MessageTemplates;

impl MessageTemplates {
    /// Deviation wording. The tier picks the phrasing, the side of the
    /// range midpoint picks low/high.
    pub fn deviation(test_name: &str, value: f64, unit: &str, result: &DeviationResult) -> String {
        match result.tier {
            DeviationTier::Error => {
                let level = match result.direction {
                    DeviationDirection::Low => "low",
                    DeviationDirection::High => "high",
                };
                format!(
                    "ALERT: dangerously {} level for {}: {} {}",
                    level, test_name, value, unit
                )
            }
            DeviationTier::Warning => {
                format!("Warning: abnormal result for {}: {} {}", test_name, value, unit)
            }
            DeviationTier::Info => {
                format!("New normal result for {}: {} {}", test_name, value, unit)
            }
        }
    }

    pub fn for_patient(patient_name: &str, message: &str) -> String {
        format!("Patient {}: {}", patient_name, message)
    }

    pub fn stage_change(
        patient_name: &str,
        previous: Option<CkdStage>,
        current: CkdStage,
        egfr: u32,
    ) -> String {
        let previous = previous.map_or("unstaged", |s| s.as_str());
        format!(
            "CKD stage of {} changed: {} -> {} (eGFR: {} {})",
            patient_name, previous, current, egfr, EGFR_UNIT
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn protocol_alert(
        patient_name: &str,
        workflow_name: &str,
        test_name: &str,
        value: f64,
        unit: &str,
        direction: AlertDirection,
        threshold: f64,
    ) -> String {
        let side = match direction {
            AlertDirection::Below => "below",
            AlertDirection::Above => "above",
        };
        format!(
            "Patient {}: protocol \"{}\" alert, {} is {} {} ({} threshold {})",
            patient_name, workflow_name, test_name, value, unit, side, threshold
        )
    }

    pub fn critical_sms(message: &str) -> String {
        format!("ckdwatch: {}", message)
    }

    pub fn result_email_subject() -> &'static str {
        "New lab result"
    }

    #[allow(clippy::too_many_arguments)]
    pub fn result_email_html(
        test_name: &str,
        value: f64,
        unit: &str,
        normal_min: f64,
        normal_max: f64,
        result_date: NaiveDate,
        doctor_name: &str,
    ) -> String {
        let body = format!(
            "<h2>New lab result</h2>\
             <p><strong>Test:</strong> {}</p>\
             <p><strong>Value:</strong> {} {}</p>\
             <p><strong>Normal range:</strong> {} - {} {}</p>\
             <p><strong>Test date:</strong> {}</p>\
             <p>Your doctor, {}, has been notified of these results.</p>",
            escape_html(test_name),
            value,
            escape_html(unit),
            normal_min,
            normal_max,
            escape_html(unit),
            result_date.format("%d/%m/%Y"),
            escape_html(doctor_name),
        );
        email_layout(&body, "For any question, please contact your doctor.")
    }

    pub fn protocol_email_subject(workflow_name: &str) -> String {
        format!("Protocol alert: {}", workflow_name)
    }

    pub fn protocol_email_html(message: &str, severity: &str, date: NaiveDate) -> String {
        let body = format!(
            "<h2>New medical notification</h2>\
             <p>{}</p>\
             <p><strong>Severity:</strong> {}</p>\
             <p><strong>Date:</strong> {}</p>",
            escape_html(message),
            severity,
            date.format("%d/%m/%Y"),
        );
        email_layout(&body, "Do not reply to this email.")
    }

    pub fn workflow_created_subject() -> &'static str {
        "New workflow created"
    }

    /// Summary sent to the doctor who authored the workflow.
    pub fn workflow_created_html(workflow: &Workflow, doctor_name: &str, patient_count: usize) -> String {
        let requirements: String = workflow
            .requirements
            .iter()
            .map(|r| {
                format!(
                    "<li><strong>{}</strong> ({}): alert when {} {} {}, action {}</li>",
                    escape_html(&r.test_name),
                    escape_html(&r.frequency),
                    r.alert.direction,
                    escape_html(&r.alert.threshold),
                    escape_html(r.alert.unit.as_deref().unwrap_or("")),
                    r.action,
                )
            })
            .collect();
        let body = format!(
            "<h2>{}</h2>\
             <p>{}</p>\
             <p><strong>CKD stage:</strong> {}</p>\
             <p><strong>Patients concerned:</strong> {}</p>\
             <p><strong>Created by:</strong> {}</p>\
             <h3>Requirements</h3><ul>{}</ul>",
            escape_html(&workflow.name),
            escape_html(workflow.description.as_deref().unwrap_or("")),
            workflow.ckd_stage,
            patient_count,
            escape_html(doctor_name),
            requirements,
        );
        email_layout(&body, "Do not reply to this email.")
    }

    pub fn workflow_notice_subject() -> &'static str {
        "New follow-up protocol"
    }

    /// Notice sent to each patient the workflow applies to.
    pub fn workflow_notice_html(patient_name: &str, doctor_name: &str, workflow: &Workflow) -> String {
        let body = format!(
            "<p>Dear {},</p>\
             <p>Your doctor, {}, has set up a new follow-up protocol for your CKD stage ({}).</p>\
             <h3>{}</h3>\
             <p>{}</p>",
            escape_html(patient_name),
            escape_html(doctor_name),
            workflow.ckd_stage,
            escape_html(&workflow.name),
            escape_html(workflow.description.as_deref().unwrap_or("")),
        );
        email_layout(&body, "For any question, please contact your doctor.")
    }
}

fn email_layout(body: &str, footer: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1 style=\"color: #2563eb;\">CKD Monitoring</h1>\
         {}\
         <p style=\"font-size: 12px; color: #6b7280;\">\
         This message was sent automatically by the CKD monitoring system. {}</p>\
         </div>",
        body, footer
    )
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
