use crate::config::Config;
use crate::provider::CommsProvider;
use crate::signature::WebhookVerifier;
use crate::store::EventStore;
use crate::tasks::IntakeJob;
use crate::utils::iso8601;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle position of a call, named after the suffix of the webhook event that put it there.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallStatus {
    Initiated,
    Answered,
    Hangup,
    RecordingSaved,
}

impl CallStatus {
    /// Maps a `call.*` event type onto the status named by everything after the first `.`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type.split_once('.')? {
            ("call", "initiated") => Some(CallStatus::Initiated),
            ("call", "answered") => Some(CallStatus::Answered),
            ("call", "hangup") => Some(CallStatus::Hangup),
            ("call", "recording.saved") => Some(CallStatus::RecordingSaved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Answered => "answered",
            CallStatus::Hangup => "hangup",
            CallStatus::RecordingSaved => "recording.saved",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SMS we sent or received. Never mutated once stored.
#[derive(Clone, PartialEq, Debug)]
pub struct MessageRecord {
    pub id: String,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub text: String,
    pub timestamp: OffsetDateTime,
}

#[derive(Clone, PartialEq, Debug)]
pub struct CallRecord {
    /// Call control id assigned by Telnyx; fixed for the life of the record
    pub id: String,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub status: CallStatus,
    pub timestamp: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
}

/// Wire shape of a message in `GET /api/sms-messages`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct MessageView {
    pub id: String,
    pub direction: String,
    pub from: String,
    pub to: String,
    pub text: String,
    pub timestamp: String,
}

impl From<&MessageRecord> for MessageView {
    fn from(m: &MessageRecord) -> Self {
        Self {
            id: m.id.clone(),
            direction: m.direction.to_string(),
            from: m.from.clone(),
            to: m.to.clone(),
            text: m.text.clone(),
            timestamp: iso8601(m.timestamp),
        }
    }
}

/// Wire shape of a call in `GET /api/call-logs`; `updated_at` is left out until the first update.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CallLogView {
    pub id: String,
    pub direction: String,
    pub from: String,
    pub to: String,
    pub status: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<&CallRecord> for CallLogView {
    fn from(c: &CallRecord) -> Self {
        Self {
            id: c.id.clone(),
            direction: c.direction.to_string(),
            from: c.from.clone(),
            to: c.to.clone(),
            status: c.status.to_string(),
            timestamp: iso8601(c.timestamp),
            updated_at: c.updated_at.map(iso8601),
        }
    }
}

#[derive(Deserialize, Default, Debug)]
pub struct SendSmsRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Deserialize, Default, Debug)]
pub struct InitiateCallRequest {
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallResponse {
    pub success: bool,
    pub call_id: String,
}

pub struct AppState {
    pub config: Config,
    pub provider: Arc<dyn CommsProvider>,
    pub store: Arc<dyn EventStore>,
    /// `None` when no Telnyx public key is configured; deliveries are then accepted unchecked
    pub verifier: Option<WebhookVerifier>,
    pub intake: mpsc::Sender<IntakeJob>,
}
