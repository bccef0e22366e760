//! Fixtures shared by the unit tests of several modules.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use crate::alerting::channels::{EmailChannel, SmsChannel};
use crate::alerting::types::ChannelError;
use crate::clinical::reference::{bootstrap_catalog, LabCatalog};
use crate::db::repository;
use crate::models::enums::*;
use crate::models::*;

pub struct Clinic {
    pub doctor: Doctor,
    pub patient: Patient,
    pub creatinine: LabTestDefinition,
    pub egfr: LabTestDefinition,
    pub potassium: LabTestDefinition,
}

pub fn make_doctor() -> Doctor {
    Doctor {
        id: Uuid::new_v4(),
        first_name: "Koffi".into(),
        last_name: "Mensah".into(),
        email: Some("k.mensah@clinic.test".into()),
        phone: Some("+22990000001".into()),
        specialty: Some("Nephrology".into()),
        hospital: None,
    }
}

/// Male patient born 1960-05-10 (63 years old on 2024-03-01).
pub fn make_patient(doctor_id: Uuid, stage: Option<CkdStage>) -> Patient {
    Patient {
        id: Uuid::new_v4(),
        doctor_id,
        first_name: "Awa".into(),
        last_name: "Diallo".into(),
        email: Some("awa.diallo@mail.test".into()),
        phone: None,
        birth_date: NaiveDate::from_ymd_opt(1960, 5, 10).unwrap(),
        sex: BiologicalSex::Male,
        ckd_stage: stage,
        stage_version: 0,
    }
}

pub fn insert_patient_in_stage(
    conn: &Connection,
    doctor_id: Uuid,
    stage: Option<CkdStage>,
) -> Patient {
    let patient = make_patient(doctor_id, stage);
    repository::insert_patient(conn, &patient).unwrap();
    patient
}

/// Seeds the bundled catalog, one doctor and one unstaged patient.
pub fn seed_clinic(conn: &Connection) -> Clinic {
    bootstrap_catalog(conn, &LabCatalog::bundled().unwrap()).unwrap();
    let doctor = make_doctor();
    repository::insert_doctor(conn, &doctor).unwrap();
    let patient = insert_patient_in_stage(conn, doctor.id, None);

    let lookup = |name: &str| repository::find_lab_test_by_name(conn, name).unwrap().unwrap();
    Clinic {
        creatinine: lookup("Créatinine sanguine"),
        egfr: lookup("DFG estimé"),
        potassium: lookup("Potassium"),
        doctor,
        patient,
    }
}

pub fn workflow_with(
    doctor_id: Uuid,
    stage: CkdStage,
    test_name: &str,
    direction: AlertDirection,
    threshold: &str,
    action: RequirementAction,
) -> Workflow {
    Workflow {
        id: Uuid::new_v4(),
        doctor_id,
        name: format!("Suivi {}", stage.as_str()),
        description: None,
        ckd_stage: stage,
        requirements: vec![WorkflowRequirement {
            id: Uuid::new_v4(),
            test_name: test_name.into(),
            frequency: "Mensuel".into(),
            alert: AlertCondition {
                direction,
                threshold: threshold.into(),
                unit: Some("mg/dL".into()),
            },
            action,
        }],
        created_at: chrono::Local::now().naive_local(),
    }
}

pub fn march_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

// ---------------------------------------------------------------------------
// Channel doubles
// ---------------------------------------------------------------------------

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingChannel {
    emails: Mutex<Vec<(String, String, String)>>,
    sms: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    /// (to, subject, html) per email.
    pub fn emails_sent(&self) -> Vec<(String, String, String)> {
        self.emails.lock().unwrap().clone()
    }

    pub fn sms_sent(&self) -> Vec<(String, String)> {
        self.sms.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailChannel for RecordingChannel {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError> {
        self.emails
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), html_body.into()));
        Ok(())
    }
}

#[async_trait]
impl SmsChannel for RecordingChannel {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.sms.lock().unwrap().push((to.into(), body.into()));
        Ok(())
    }
}

/// Email relay that is always down.
pub struct FailingEmail;

#[async_trait]
impl EmailChannel for FailingEmail {
    async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Transport("connection refused".into()))
    }
}
