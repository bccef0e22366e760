use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Outbound channel failure. `Disabled` is a configuration state, not a fault.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not configured")]
    Disabled,

    #[error("Channel transport failed: {0}")]
    Transport(String),

    #[error("Channel provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid channel configuration: {0}")]
    InvalidConfig(String),
}

/// Failure while writing notification state.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Stage of patient {patient_id} changed concurrently")]
    StaleStage { patient_id: Uuid },
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
}

/// Why a message is being sent, carried into delivery warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPurpose {
    /// Result summary sent to the patient.
    PatientResult,
    /// Email action of a fired workflow requirement, sent to the doctor.
    ProtocolAlert,
    /// Text message to the doctor for an error-tier result.
    CriticalResult,
    /// New protocol announced to its author and the patients it covers.
    WorkflowAnnouncement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Email {
        purpose: DeliveryPurpose,
        to: String,
        subject: String,
        html: String,
    },
    Sms {
        purpose: DeliveryPurpose,
        to: String,
        body: String,
    },
}

impl OutboundMessage {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::Email { .. } => ChannelKind::Email,
            Self::Sms { .. } => ChannelKind::Sms,
        }
    }

    pub fn purpose(&self) -> DeliveryPurpose {
        match self {
            Self::Email { purpose, .. } | Self::Sms { purpose, .. } => *purpose,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Email { to, .. } | Self::Sms { to, .. } => to,
        }
    }
}

/// A delivery that was attempted and failed. Never rolls anything back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryWarning {
    pub channel: ChannelKind,
    pub purpose: DeliveryPurpose,
    pub recipient: String,
    pub reason: String,
}
