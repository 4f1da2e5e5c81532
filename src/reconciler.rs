use crate::store::{EventStore, StoreError, UpsertOutcome};
use crate::telnyx_types::{CallEventPayload, MessageReceivedPayload, WebhookEnvelope};
use crate::types::{CallRecord, CallStatus, Direction, MessageRecord};
use crate::utils::{next_after, now_millis};

use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("malformed {event_type} payload: {reason}")]
    Malformed { event_type: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Malformed { .. } => false,
            ReconcileError::Store(e) => e.is_retryable(),
        }
    }
}

/// What a single webhook event did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    MessageAppended { id: String },
    CallInserted { id: String },
    CallUpdated { id: String, status: CallStatus },
    /// Call event for an id we have never recorded; nothing was written
    CallUnmatched { id: String },
    Ignored { event_type: String },
}

fn malformed(event_type: &str, e: serde_json::Error) -> ReconcileError {
    ReconcileError::Malformed {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    }
}

/// Applies one provider event to the store.
pub async fn handle_event(
    store: &dyn EventStore,
    envelope: &WebhookEnvelope,
) -> Result<Reconciled, ReconcileError> {
    let event_type = envelope.data.event_type.as_str();
    info!(
        event_type,
        event_id = ?envelope.data.id,
        occurred_at = ?envelope.data.occurred_at,
        "received webhook event"
    );

    if event_type == "message.received" {
        return message_received(store, envelope).await;
    }
    match CallStatus::from_event_type(event_type) {
        Some(status) => call_event(store, envelope, status).await,
        None => {
            info!(event_type, "unhandled event type");
            Ok(Reconciled::Ignored {
                event_type: event_type.to_string(),
            })
        }
    }
}

async fn message_received(
    store: &dyn EventStore,
    envelope: &WebhookEnvelope,
) -> Result<Reconciled, ReconcileError> {
    let event_type = envelope.data.event_type.as_str();
    let payload = MessageReceivedPayload::deserialize(&envelope.data.payload)
        .map_err(|e| malformed(event_type, e))?;
    let to = payload
        .to
        .into_iter()
        .next()
        .ok_or_else(|| ReconcileError::Malformed {
            event_type: event_type.to_string(),
            reason: "no recipient in `to`".to_string(),
        })?;

    let id = payload.id;
    store
        .append_message(MessageRecord {
            id: id.clone(),
            direction: Direction::Inbound,
            from: payload.from.phone_number,
            to: to.phone_number,
            text: payload.text,
            timestamp: now_millis(),
        })
        .await?;
    Ok(Reconciled::MessageAppended { id })
}

async fn call_event(
    store: &dyn EventStore,
    envelope: &WebhookEnvelope,
    status: CallStatus,
) -> Result<Reconciled, ReconcileError> {
    let event_type = envelope.data.event_type.as_str();
    let payload = CallEventPayload::deserialize(&envelope.data.payload)
        .map_err(|e| malformed(event_type, e))?;
    let id = payload.call_control_id.clone();

    // Only an incoming call's first event may create a record; later events must find one.
    let insert = (status == CallStatus::Initiated && payload.is_incoming()).then(|| CallRecord {
        id: id.clone(),
        direction: Direction::Inbound,
        from: payload.from,
        to: payload.to,
        status: CallStatus::Initiated,
        timestamp: now_millis(),
        updated_at: None,
    });
    let update = move |call: &mut CallRecord| {
        call.status = status;
        call.updated_at = Some(next_after(call.updated_at));
    };

    let reconciled = match store.upsert_call(&id, &update, insert).await? {
        UpsertOutcome::Updated => Reconciled::CallUpdated { id, status },
        UpsertOutcome::Inserted => Reconciled::CallInserted { id },
        UpsertOutcome::Skipped => {
            debug!(call_control_id=%id, event_type, "no call record for event; dropping");
            Reconciled::CallUnmatched { id }
        }
    };
    Ok(reconciled)
}
