use std::sync::Arc;
use std::time::Instant;

use rusqlite::Connection;

use crate::alerting::{
    aggregate, workflow_announcements, AlertBatch, NotificationDispatcher, OutboundMessage,
    ResultContext,
};
use crate::clinical::deviation::evaluate;
use crate::clinical::egfr::compute_egfr;
use crate::clinical::staging::detect_stage_change;
use crate::clinical::workflow_rules::match_rules;
use crate::core_state::CoreState;
use crate::db::repository;
use crate::models::enums::TestKind;
use crate::models::{LabResult, Workflow};

use super::intake::{IntakeError, IntakeRequest, LabSubmission};
use super::locks::PatientLocks;
use super::types::{PipelineError, PipelineOutcome, PipelineWarning, WorkflowRegistration};

/// Runs the evaluation pipeline for each recorded lab result:
/// record → derive eGFR → restage → evaluate → match workflows →
/// persist notifications → deliver.
///
/// Everything up to persistence runs under the patient's lock in one
/// synchronous database section; delivery happens after the lock is released.
pub struct ResultPipeline {
    state: Arc<CoreState>,
    dispatcher: NotificationDispatcher,
    locks: PatientLocks,
}

/// Database work done, deliveries still pending.
struct Recorded {
    outcome: PipelineOutcome,
    deliveries: Vec<OutboundMessage>,
}

impl ResultPipeline {
    pub fn new(state: Arc<CoreState>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            state,
            dispatcher,
            locks: PatientLocks::new(),
        }
    }

    pub async fn submit_request(
        &self,
        request: &IntakeRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let submission = request.validate()?;
        self.submit(submission).await
    }

    pub async fn submit(&self, submission: LabSubmission) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();

        let turn = self.locks.acquire(submission.patient_id).await?;
        let Recorded {
            mut outcome,
            deliveries,
        } = self.record(&submission)?;
        drop(turn);

        let delivery_warnings = self.dispatcher.deliver(deliveries).await;
        outcome
            .warnings
            .extend(delivery_warnings.into_iter().map(PipelineWarning::Delivery));

        tracing::info!(
            patient_id = %submission.patient_id,
            lab_result_id = %outcome.lab_result.id,
            egfr = ?outcome.egfr,
            stage = outcome.stage.map(|s| s.as_str()).unwrap_or("unstaged"),
            stage_changed = outcome.stage_changed,
            severity = outcome.deviation.tier.as_str(),
            notifications = outcome.notifications.len(),
            warnings = outcome.warnings.len(),
            processing_ms = started.elapsed().as_millis() as u64,
            "Lab result processed"
        );

        Ok(outcome)
    }

    /// Stores a new workflow, then announces it by email to its author and
    /// to the author's patients currently in the workflow's stage.
    pub async fn register_workflow(
        &self,
        workflow: &Workflow,
    ) -> Result<WorkflowRegistration, PipelineError> {
        let (deliveries, mut warnings, patients_covered) = {
            let mut conn = self.state.lock_db()?;
            let doctor = repository::get_doctor(&conn, &workflow.doctor_id)?.ok_or(
                PipelineError::NotFound {
                    entity: "doctor",
                    id: workflow.doctor_id,
                },
            )?;
            repository::insert_workflow(&mut conn, workflow)?;
            let patients =
                repository::list_patients_for_doctor_stage(&conn, &doctor.id, workflow.ckd_stage)?;
            let (deliveries, undeliverable) = workflow_announcements(workflow, &doctor, &patients);
            (deliveries, undeliverable, patients.len())
        };

        warnings.extend(self.dispatcher.deliver(deliveries).await);

        tracing::info!(
            workflow_id = %workflow.id,
            doctor_id = %workflow.doctor_id,
            stage = workflow.ckd_stage.as_str(),
            requirements = workflow.requirements.len(),
            patients_covered,
            warnings = warnings.len(),
            "Workflow registered"
        );

        Ok(WorkflowRegistration {
            workflow_id: workflow.id,
            patients_covered,
            warnings,
        })
    }

    fn record(&self, submission: &LabSubmission) -> Result<Recorded, PipelineError> {
        let conn = self.state.lock_db()?;
        let config = &self.state.config;

        // Lookups fail fast, before any write
        let patient = repository::get_patient(&conn, &submission.patient_id)?.ok_or(
            PipelineError::NotFound {
                entity: "patient",
                id: submission.patient_id,
            },
        )?;
        let doctor = repository::get_doctor(&conn, &submission.doctor_id)?.ok_or(
            PipelineError::NotFound {
                entity: "doctor",
                id: submission.doctor_id,
            },
        )?;
        let test = repository::get_lab_test(&conn, &submission.lab_test_id)?.ok_or(
            PipelineError::NotFound {
                entity: "lab test",
                id: submission.lab_test_id,
            },
        )?;

        let triggers_egfr = test.kind == TestKind::Creatinine;
        if triggers_egfr && submission.value <= 0.0 {
            return Err(IntakeError::NonPositiveCreatinine(submission.value).into());
        }

        let snapshot = repository::get_stage_snapshot(&conn, &patient.id)?;
        let now = chrono::Local::now().naive_local();

        let lab_result = LabResult {
            id: uuid::Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            lab_test_id: test.id,
            value: submission.value,
            result_date: submission.result_date,
            derived_from: None,
            recorded_at: now,
        };
        repository::insert_lab_result(&conn, &lab_result)?;
        tracing::debug!(lab_result_id = %lab_result.id, test = %test.test_name, "Primary result recorded");

        let mut warnings = Vec::new();
        let mut derived_result = None;
        let mut egfr = None;
        let mut stage_change = None;

        if triggers_egfr {
            let age = patient.age_on(submission.result_date);
            let value = compute_egfr(submission.value, age, patient.is_female(), &config.egfr);
            tracing::debug!(egfr = value, age, "eGFR computed");

            match self.record_derived_egfr(&conn, &lab_result, value) {
                Ok(derived) => derived_result = Some(derived),
                Err(warning) => warnings.push(warning),
            }
            egfr = Some(value);
            stage_change = detect_stage_change(snapshot.stage, value);
        }

        let deviation = evaluate(submission.value, &test);

        let workflows = match snapshot.stage {
            Some(stage) => {
                match repository::get_workflows_for_doctor_stage(&conn, &doctor.id, stage) {
                    Ok(workflows) => workflows,
                    Err(e) => {
                        tracing::warn!(doctor_id = %doctor.id, error = %e, "Workflows unavailable, matching skipped");
                        warnings.push(PipelineWarning::WorkflowsUnavailable {
                            reason: e.to_string(),
                        });
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };
        let fired = match_rules(
            snapshot.stage,
            &doctor.id,
            &test.test_name,
            submission.value,
            &workflows,
        );
        if !fired.is_empty() {
            tracing::debug!(fired = fired.len(), "Workflow requirements fired");
        }

        let ctx = ResultContext {
            patient: &patient,
            doctor: &doctor,
            test: &test,
            value: submission.value,
            result_date: submission.result_date,
        };
        let batch = aggregate(&ctx, &deviation, stage_change.as_ref(), &fired, now);
        let standalone = batch.standalone();
        let AlertBatch {
            stage_change: stage_notification,
            deliveries,
            undeliverable,
            ..
        } = batch;

        let mut stage = snapshot.stage;
        let mut committed_stage_notification = None;
        if let (Some(change), Some(notification)) = (stage_change.as_ref(), stage_notification) {
            match NotificationDispatcher::commit_stage_change(
                &conn,
                &patient.id,
                change,
                &snapshot,
                &notification,
            ) {
                Ok(updated) => {
                    stage = updated.stage;
                    committed_stage_notification = Some(notification);
                }
                Err(e) => {
                    tracing::error!(
                        patient_id = %patient.id,
                        lab_result_id = %lab_result.id,
                        error = %e,
                        "Stage update rolled back"
                    );
                    return Err(PipelineError::Consistency {
                        lab_result_id: lab_result.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut notifications = Vec::new();
        match NotificationDispatcher::persist(&conn, &standalone) {
            Ok(()) => notifications.extend(standalone),
            Err(e) => {
                tracing::warn!(lab_result_id = %lab_result.id, error = %e, "Notifications not persisted");
                warnings.push(PipelineWarning::NotificationsNotPersisted {
                    reason: e.to_string(),
                });
            }
        }
        notifications.extend(committed_stage_notification);

        warnings.extend(undeliverable.into_iter().map(PipelineWarning::Delivery));

        Ok(Recorded {
            outcome: PipelineOutcome {
                lab_result,
                derived_result,
                egfr,
                deviation,
                stage_before: snapshot.stage,
                stage,
                stage_changed: stage != snapshot.stage,
                fired_requirements: fired,
                notifications,
                warnings,
            },
            deliveries,
        })
    }

    /// Files the computed eGFR under the configured catalog test.
    fn record_derived_egfr(
        &self,
        conn: &Connection,
        source: &LabResult,
        egfr: u32,
    ) -> Result<LabResult, PipelineWarning> {
        let test_name = &self.state.config.egfr_test_name;

        let definition = match repository::find_lab_test_by_name(conn, test_name) {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                tracing::warn!(test_name = %test_name, "eGFR test definition missing, derived result skipped");
                return Err(PipelineWarning::EgfrDefinitionMissing {
                    test_name: test_name.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "eGFR test lookup failed");
                return Err(PipelineWarning::DerivedResultFailed {
                    reason: e.to_string(),
                });
            }
        };

        let derived = LabResult {
            id: uuid::Uuid::new_v4(),
            patient_id: source.patient_id,
            doctor_id: source.doctor_id,
            lab_test_id: definition.id,
            value: f64::from(egfr),
            result_date: source.result_date,
            derived_from: Some(source.id),
            recorded_at: source.recorded_at,
        };

        repository::insert_lab_result(conn, &derived).map_err(|e| {
            tracing::warn!(error = %e, "Derived eGFR not recorded");
            PipelineWarning::DerivedResultFailed {
                reason: e.to_string(),
            }
        })?;

        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::alerting::channels::{EmailChannel, SmsChannel};
    use crate::alerting::DeliveryPurpose;
    use crate::config::AppConfig;
    use crate::models::enums::*;
    use crate::models::Patient;
    use crate::test_support::*;

    struct Harness {
        pipeline: Arc<ResultPipeline>,
        state: Arc<CoreState>,
        clinic: Clinic,
        channel: Arc<RecordingChannel>,
    }

    fn harness_with(config: AppConfig, email: Option<Arc<dyn EmailChannel>>) -> Harness {
        let state = Arc::new(CoreState::in_memory(config).unwrap());
        let clinic = seed_clinic(&state.lock_db().unwrap());
        let channel = Arc::new(RecordingChannel::default());
        let email = email.unwrap_or_else(|| channel.clone() as Arc<dyn EmailChannel>);
        let sms: Arc<dyn SmsChannel> = channel.clone();
        let pipeline = Arc::new(ResultPipeline::new(
            state.clone(),
            NotificationDispatcher::new(email, sms),
        ));
        Harness {
            pipeline,
            state,
            clinic,
            channel,
        }
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default(), None)
    }

    fn submission(patient: &Patient, doctor_id: uuid::Uuid, test_id: uuid::Uuid, value: f64) -> LabSubmission {
        LabSubmission {
            patient_id: patient.id,
            doctor_id,
            lab_test_id: test_id,
            value,
            result_date: march_first(),
        }
    }

    fn creatinine(h: &Harness, value: f64) -> LabSubmission {
        submission(&h.clinic.patient, h.clinic.doctor.id, h.clinic.creatinine.id, value)
    }

    fn stored_patient(h: &Harness, patient: &Patient) -> Patient {
        let conn = h.state.lock_db().unwrap();
        repository::get_patient(&conn, &patient.id).unwrap().unwrap()
    }

    fn stage_notifications(h: &Harness, patient: &Patient) -> usize {
        let conn = h.state.lock_db().unwrap();
        repository::get_notifications_for_patient(&conn, &patient.id)
            .unwrap()
            .iter()
            .filter(|n| n.kind == NotificationKind::StageChange)
            .count()
    }

    fn result_count(h: &Harness, patient: &Patient) -> usize {
        let conn = h.state.lock_db().unwrap();
        repository::get_lab_results_for_patient(&conn, &patient.id)
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn creatinine_derives_egfr_and_restages() {
        let h = harness();
        let outcome = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();

        assert_eq!(outcome.egfr, Some(49));
        let derived = outcome.derived_result.as_ref().unwrap();
        assert_eq!(derived.value, 49.0);
        assert_eq!(derived.lab_test_id, h.clinic.egfr.id);
        assert_eq!(derived.derived_from, Some(outcome.lab_result.id));
        assert_eq!(derived.patient_id, outcome.lab_result.patient_id);
        assert_eq!(derived.doctor_id, outcome.lab_result.doctor_id);
        assert_eq!(derived.result_date, outcome.lab_result.result_date);

        assert_eq!(outcome.stage_before, None);
        assert_eq!(outcome.stage, Some(CkdStage::Stage3A));
        assert!(outcome.stage_changed);
        assert!(outcome.warnings.is_empty());

        assert_eq!(outcome.notifications.len(), 2);
        assert_eq!(outcome.notifications[0].severity, NotificationSeverity::Dfg);
        assert!(outcome.notifications[0].message.contains("dangerously high"));
        assert_eq!(outcome.notifications[1].kind, NotificationKind::StageChange);

        let patient = stored_patient(&h, &h.clinic.patient);
        assert_eq!(patient.ckd_stage, Some(CkdStage::Stage3A));
        assert_eq!(stage_notifications(&h, &h.clinic.patient), 1);
        assert_eq!(result_count(&h, &h.clinic.patient), 2);

        let emails = h.channel.emails_sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "awa.diallo@mail.test");
        assert_eq!(h.channel.sms_sent().len(), 1);
    }

    #[tokio::test]
    async fn outcome_matches_stored_rows() {
        let h = harness();
        let outcome = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();

        let conn = h.state.lock_db().unwrap();
        let stored = repository::get_lab_result(&conn, &outcome.lab_result.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored, outcome.lab_result);

        let derived = outcome.derived_result.as_ref().unwrap();
        let stored = repository::get_lab_result(&conn, &derived.id).unwrap().unwrap();
        assert_eq!(&stored, derived);

        let mut stored = repository::get_notifications_for_patient(&conn, &h.clinic.patient.id).unwrap();
        let mut returned = outcome.notifications.clone();
        stored.sort_by_key(|n| n.id);
        returned.sort_by_key(|n| n.id);
        assert_eq!(stored, returned);
    }

    #[tokio::test]
    async fn new_workflow_announced_to_doctor_and_stage_patients() {
        let h = harness();
        let covered = {
            let conn = h.state.lock_db().unwrap();
            let with_email = insert_patient_in_stage(&conn, h.clinic.doctor.id, Some(CkdStage::Stage3A));
            let mut without_email = make_patient(h.clinic.doctor.id, Some(CkdStage::Stage3A));
            without_email.email = None;
            repository::insert_patient(&conn, &without_email).unwrap();
            insert_patient_in_stage(&conn, h.clinic.doctor.id, Some(CkdStage::Stage4));
            with_email
        };

        let workflow = workflow_with(
            h.clinic.doctor.id,
            CkdStage::Stage3A,
            "Créatinine sanguine",
            AlertDirection::Above,
            "1.5",
            RequirementAction::Email,
        );
        let registration = h.pipeline.register_workflow(&workflow).await.unwrap();
        assert_eq!(registration.workflow_id, workflow.id);
        assert_eq!(registration.patients_covered, 2);
        assert!(registration.warnings.is_empty());

        let emails = h.channel.emails_sent();
        assert_eq!(emails.len(), 2);
        assert!(emails
            .iter()
            .any(|(to, subject, html)| to == "k.mensah@clinic.test"
                && subject == "New workflow created"
                && html.contains("Créatinine sanguine")));
        assert!(emails
            .iter()
            .any(|(to, _, html)| to == covered.email.as_deref().unwrap()
                && html.contains("Stage 3A")));

        let conn = h.state.lock_db().unwrap();
        assert!(repository::get_workflow(&conn, &workflow.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn workflow_for_unknown_doctor_not_stored() {
        let h = harness();
        let workflow = workflow_with(
            uuid::Uuid::new_v4(),
            CkdStage::Stage2,
            "Potassium",
            AlertDirection::Above,
            "5.0",
            RequirementAction::Notify,
        );
        let err = h.pipeline.register_workflow(&workflow).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "doctor", .. }));
        assert!(h.channel.emails_sent().is_empty());

        let conn = h.state.lock_db().unwrap();
        assert!(repository::get_workflow(&conn, &workflow.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn other_tests_leave_stage_alone() {
        let h = harness();
        let outcome = h
            .pipeline
            .submit(submission(
                &h.clinic.patient,
                h.clinic.doctor.id,
                h.clinic.potassium.id,
                4.2,
            ))
            .await
            .unwrap();

        assert_eq!(outcome.egfr, None);
        assert!(outcome.derived_result.is_none());
        assert!(!outcome.stage_changed);
        assert_eq!(outcome.stage, None);
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].severity, NotificationSeverity::Info);
        assert!(h.channel.sms_sent().is_empty());
    }

    #[tokio::test]
    async fn same_creatinine_twice_derives_same_egfr() {
        let h = harness();
        let first = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();
        let second = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();

        let a = first.derived_result.unwrap();
        let b = second.derived_result.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.value, b.value);

        assert!(first.stage_changed);
        assert!(!second.stage_changed);
        assert_eq!(second.stage_before, Some(CkdStage::Stage3A));
        assert_eq!(stage_notifications(&h, &h.clinic.patient), 1);
        assert_eq!(result_count(&h, &h.clinic.patient), 4);
    }

    #[tokio::test]
    async fn workflow_matches_stage_held_when_result_arrived() {
        let h = harness();
        let (in_stage, other_stage) = {
            let mut conn = h.state.lock_db().unwrap();
            let workflow = workflow_with(
                h.clinic.doctor.id,
                CkdStage::Stage3A,
                "Créatinine sanguine",
                AlertDirection::Above,
                "1.5",
                RequirementAction::Email,
            );
            repository::insert_workflow(&mut conn, &workflow).unwrap();
            (
                insert_patient_in_stage(&conn, h.clinic.doctor.id, Some(CkdStage::Stage3A)),
                insert_patient_in_stage(&conn, h.clinic.doctor.id, Some(CkdStage::Stage2)),
            )
        };

        let fired = h
            .pipeline
            .submit(submission(&in_stage, h.clinic.doctor.id, h.clinic.creatinine.id, 1.8))
            .await
            .unwrap();
        assert_eq!(fired.fired_requirements.len(), 1);
        assert!(fired
            .notifications
            .iter()
            .any(|n| n.kind == NotificationKind::Protocol));
        assert!(h
            .channel
            .emails_sent()
            .iter()
            .any(|(to, _, _)| to == "k.mensah@clinic.test"));

        let below = h
            .pipeline
            .submit(submission(&in_stage, h.clinic.doctor.id, h.clinic.creatinine.id, 1.2))
            .await
            .unwrap();
        assert!(below.fired_requirements.is_empty());

        // Moves from Stage 2 into Stage 3A, but the rule is judged on Stage 2
        let moved = h
            .pipeline
            .submit(submission(&other_stage, h.clinic.doctor.id, h.clinic.creatinine.id, 1.8))
            .await
            .unwrap();
        assert!(moved.fired_requirements.is_empty());
        assert_eq!(moved.stage, Some(CkdStage::Stage3A));
    }

    #[tokio::test]
    async fn failed_stage_notification_is_consistency_error() {
        let h = harness();
        h.state
            .lock_db()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_stage_notification BEFORE INSERT ON notifications
                 WHEN NEW.kind = 'stage_change'
                 BEGIN SELECT RAISE(ABORT, 'notification store unavailable'); END;",
            )
            .unwrap();

        let err = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
        let primary_id = err.recorded_result().unwrap();

        let conn = h.state.lock_db().unwrap();
        assert!(repository::get_lab_result(&conn, &primary_id).unwrap().is_some());
        let patient = repository::get_patient(&conn, &h.clinic.patient.id).unwrap().unwrap();
        assert_eq!(patient.ckd_stage, None);
        assert_eq!(patient.stage_version, 0);
        assert!(repository::get_notifications_for_patient(&conn, &h.clinic.patient.id)
            .unwrap()
            .iter()
            .all(|n| n.kind != NotificationKind::StageChange));
    }

    #[tokio::test]
    async fn missing_egfr_definition_is_soft() {
        let config = AppConfig {
            egfr_test_name: "eGFR CKD-EPI".into(),
            ..AppConfig::default()
        };
        let h = harness_with(config, None);

        let outcome = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();
        assert!(outcome.derived_result.is_none());
        assert!(outcome.is_partial());
        assert_eq!(
            outcome.warnings,
            vec![PipelineWarning::EgfrDefinitionMissing {
                test_name: "eGFR CKD-EPI".into()
            }]
        );
        assert_eq!(outcome.stage, Some(CkdStage::Stage3A));
        assert_eq!(result_count(&h, &h.clinic.patient), 1);
    }

    #[tokio::test]
    async fn email_failure_is_reported_not_rolled_back() {
        let h = harness_with(AppConfig::default(), Some(Arc::new(FailingEmail)));

        let outcome = h.pipeline.submit(creatinine(&h, 1.8)).await.unwrap();
        assert!(outcome.has_delivery_warning());
        match &outcome.warnings[0] {
            PipelineWarning::Delivery(w) => assert_eq!(w.purpose, DeliveryPurpose::PatientResult),
            other => panic!("Expected delivery warning, got: {:?}", other),
        }

        let conn = h.state.lock_db().unwrap();
        let stored = repository::get_notifications_for_patient(&conn, &h.clinic.patient.id).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn lookup_failures_write_nothing() {
        let h = harness();

        let mut unknown_patient = h.clinic.patient.clone();
        unknown_patient.id = uuid::Uuid::new_v4();
        let err = h
            .pipeline
            .submit(submission(&unknown_patient, h.clinic.doctor.id, h.clinic.creatinine.id, 1.8))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "patient", .. }));
        assert!(err.is_client_error());

        let err = h
            .pipeline
            .submit(submission(&h.clinic.patient, h.clinic.doctor.id, uuid::Uuid::new_v4(), 1.8))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "lab test", .. }));

        assert_eq!(result_count(&h, &h.clinic.patient), 0);
    }

    #[tokio::test]
    async fn non_positive_creatinine_rejected_before_write() {
        let h = harness();
        for value in [0.0, -1.2] {
            let err = h.pipeline.submit(creatinine(&h, value)).await.unwrap_err();
            assert!(matches!(
                err,
                PipelineError::Intake(IntakeError::NonPositiveCreatinine(_))
            ));
        }
        assert_eq!(result_count(&h, &h.clinic.patient), 0);
        assert!(h.channel.emails_sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_request_rejected() {
        let h = harness();
        let request = IntakeRequest {
            patient_id: Some(h.clinic.patient.id.to_string()),
            doctor_id: Some(h.clinic.doctor.id.to_string()),
            lab_test_id: Some(h.clinic.creatinine.id.to_string()),
            result_value: Some(crate::pipeline::intake::RawValue::Text("n/a".into())),
            result_date: Some("2024-03-01".into()),
        };
        let err = h.pipeline.submit_request(&request).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(result_count(&h, &h.clinic.patient), 0);

        let ok = IntakeRequest {
            result_value: Some(crate::pipeline::intake::RawValue::Text("1,8".into())),
            ..request
        };
        let outcome = h.pipeline.submit_request(&ok).await.unwrap();
        assert_eq!(outcome.egfr, Some(49));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_serialize_stage_updates() {
        let h = harness();

        let tasks: Vec<_> = [1.8, 6.0]
            .into_iter()
            .map(|value| {
                let pipeline = h.pipeline.clone();
                let sub = creatinine(&h, value);
                tokio::spawn(async move { pipeline.submit(sub).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let first = outcomes.iter().find(|o| o.stage_before.is_none()).unwrap();
        let second = outcomes.iter().find(|o| o.stage_before.is_some()).unwrap();
        assert_eq!(second.stage_before, first.stage);

        let patient = stored_patient(&h, &h.clinic.patient);
        assert_eq!(patient.ckd_stage, second.stage);
        assert_eq!(patient.stage_version, 2);
        assert_eq!(stage_notifications(&h, &h.clinic.patient), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_stage_write_lost_under_contention() {
        let h = harness();
        let values = [1.0, 1.8, 6.0, 1.2, 2.0, 1.8, 6.0, 1.0, 1.2, 2.0];

        let tasks: Vec<_> = values
            .into_iter()
            .map(|value| {
                let pipeline = h.pipeline.clone();
                let sub = creatinine(&h, value);
                tokio::spawn(async move { pipeline.submit(sub).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let changes = outcomes.iter().filter(|o| o.stage_changed).count();
        let patient = stored_patient(&h, &h.clinic.patient);
        assert_eq!(patient.stage_version as usize, changes);
        assert_eq!(stage_notifications(&h, &h.clinic.patient), changes);

        // Each submission saw the stage left by exactly one predecessor
        let befores: Vec<_> = outcomes.iter().map(|o| o.stage_before).collect();
        assert_eq!(befores.iter().filter(|s| s.is_none()).count(), 1);
        let final_stages: HashSet<_> = outcomes.iter().map(|o| o.stage).collect();
        assert!(final_stages.contains(&patient.ckd_stage));
    }
}
