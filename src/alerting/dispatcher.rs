use std::sync::Arc;

use futures_util::future::join_all;
use rusqlite::Connection;
use uuid::Uuid;

use crate::clinical::staging::StageChange;
use crate::config::AppConfig;
use crate::db::{repository, DatabaseError};
use crate::models::{Notification, StageSnapshot};

use super::channels::{DisabledChannel, EmailChannel, HttpEmailChannel, SmsChannel, TwilioSmsChannel};
use super::types::{ChannelError, DeliveryWarning, DispatchError, OutboundMessage};

/// Persists notifications and pushes deliveries through the channels.
///
/// Writes are synchronous and always happen before any delivery; delivery
/// outcome never changes what was written.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Arc<dyn EmailChannel>,
    sms: Arc<dyn SmsChannel>,
}

impl NotificationDispatcher {
    pub fn new(email: Arc<dyn EmailChannel>, sms: Arc<dyn SmsChannel>) -> Self {
        Self { email, sms }
    }

    /// Dispatcher whose channels are all unconfigured.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledChannel), Arc::new(DisabledChannel))
    }

    /// Builds the configured channels; an absent section leaves that channel disabled.
    pub fn from_config(config: &AppConfig) -> Result<Self, ChannelError> {
        let email: Arc<dyn EmailChannel> = match &config.email {
            Some(settings) => Arc::new(HttpEmailChannel::new(
                &settings.api_url,
                &settings.api_key,
                &settings.from,
            )?),
            None => Arc::new(DisabledChannel),
        };
        let sms: Arc<dyn SmsChannel> = match &config.sms {
            Some(settings) => Arc::new(TwilioSmsChannel::new(
                &settings.account_sid,
                &settings.auth_token,
                &settings.from_number,
            )?),
            None => Arc::new(DisabledChannel),
        };

        let dispatcher = Self::new(email, sms);
        tracing::info!(
            email = dispatcher.email_enabled(),
            sms = dispatcher.sms_enabled(),
            "Notification channels ready"
        );
        Ok(dispatcher)
    }

    pub fn email_enabled(&self) -> bool {
        self.email.is_enabled()
    }

    pub fn sms_enabled(&self) -> bool {
        self.sms.is_enabled()
    }

    /// Applies a stage change and its notification in one transaction.
    ///
    /// The update is guarded by `expected.version`; a concurrent writer makes
    /// the whole transaction roll back with `StaleStage`.
    pub fn commit_stage_change(
        conn: &Connection,
        patient_id: &Uuid,
        change: &StageChange,
        expected: &StageSnapshot,
        notification: &Notification,
    ) -> Result<StageSnapshot, DispatchError> {
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;

        let updated = match repository::update_patient_stage(&tx, patient_id, change.current, expected) {
            Ok(snapshot) => snapshot,
            Err(DatabaseError::StaleVersion { .. }) => {
                return Err(DispatchError::StaleStage {
                    patient_id: *patient_id,
                })
            }
            Err(e) => return Err(e.into()),
        };
        repository::insert_notification(&tx, notification)?;

        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            patient_id = %patient_id,
            previous = change.previous.map(|s| s.as_str()).unwrap_or("unstaged"),
            current = change.current.as_str(),
            egfr = change.egfr,
            "Patient stage updated"
        );
        Ok(updated)
    }

    /// Writes the notifications that do not belong to a stage change.
    pub fn persist(conn: &Connection, notifications: &[Notification]) -> Result<(), DispatchError> {
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
        for notification in notifications {
            repository::insert_notification(&tx, notification)?;
        }
        tx.commit().map_err(DatabaseError::from)?;
        Ok(())
    }

    /// Sends every message concurrently and reports the failures.
    /// A disabled channel is a skip, not a failure.
    pub async fn deliver(&self, messages: Vec<OutboundMessage>) -> Vec<DeliveryWarning> {
        let attempts = messages.into_iter().map(|message| async move {
            let outcome = match &message {
                OutboundMessage::Email {
                    to, subject, html, ..
                } => self.email.send_email(to, subject, html).await,
                OutboundMessage::Sms { to, body, .. } => self.sms.send_sms(to, body).await,
            };
            (message, outcome)
        });

        let mut warnings = Vec::new();
        for (message, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => tracing::debug!(
                    channel = ?message.channel(),
                    purpose = ?message.purpose(),
                    "Message delivered"
                ),
                Err(ChannelError::Disabled) => tracing::debug!(
                    channel = ?message.channel(),
                    purpose = ?message.purpose(),
                    "Channel disabled, message skipped"
                ),
                Err(e) => {
                    tracing::warn!(
                        channel = ?message.channel(),
                        purpose = ?message.purpose(),
                        error = %e,
                        "Message delivery failed"
                    );
                    warnings.push(DeliveryWarning {
                        channel: message.channel(),
                        purpose: message.purpose(),
                        recipient: message.recipient().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        warnings
    }
}
