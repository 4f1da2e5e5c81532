use crate::error::AppError;
use crate::types::{AppState, CallRecord, CallStatus, Direction, MessageRecord};
use crate::utils::now_millis;

use tracing::info;

pub const SMS_FIELDS_REQUIRED: &str = "To phone number and message are required";
pub const CALL_TO_REQUIRED: &str = "To phone number is required";

/// Sends an SMS from our configured number and records it. Returns the provider message id.
pub async fn send_message(app_state: &AppState, to: &str, text: &str) -> Result<String, AppError> {
    if to.trim().is_empty() || text.trim().is_empty() {
        return Err(AppError::Validation(SMS_FIELDS_REQUIRED));
    }
    let from = &app_state.config.telnyx_phone_number;
    let id = app_state
        .provider
        .send_message(from, to, text)
        .await
        .map_err(|source| AppError::Provider {
            context: "Failed to send SMS",
            source,
        })?;
    info!(message_id=%id, to, "sent sms");

    app_state
        .store
        .append_message(MessageRecord {
            id: id.clone(),
            direction: Direction::Outbound,
            from: from.clone(),
            to: to.to_string(),
            text: text.to_string(),
            timestamp: now_millis(),
        })
        .await
        .map_err(|source| AppError::Store {
            context: "Failed to record SMS",
            source,
        })?;
    Ok(id)
}

/// Places a call that plays the configured announcement. Returns the call control id.
pub async fn initiate_call(app_state: &AppState, to: &str) -> Result<String, AppError> {
    if to.trim().is_empty() {
        return Err(AppError::Validation(CALL_TO_REQUIRED));
    }
    let config = &app_state.config;
    let id = app_state
        .provider
        .create_call(
            &config.telnyx_connection_id,
            &config.telnyx_phone_number,
            to,
            &config.telnyx_audio_url,
        )
        .await
        .map_err(|source| AppError::Provider {
            context: "Failed to initiate call",
            source,
        })?;
    info!(call_control_id=%id, to, "initiated call");

    app_state
        .store
        .append_call(CallRecord {
            id: id.clone(),
            direction: Direction::Outbound,
            from: config.telnyx_phone_number.clone(),
            to: to.to_string(),
            status: CallStatus::Initiated,
            timestamp: now_millis(),
            updated_at: None,
        })
        .await
        .map_err(|source| AppError::Store {
            context: "Failed to record call",
            source,
        })?;
    Ok(id)
}
