use crate::actions;
use crate::error::AppError;
use crate::tasks::IntakeJob;
use crate::telnyx_types::{WebhookEnvelope, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::types::{
    AppState, CallLogView, InitiateCallRequest, InitiateCallResponse, MessageView,
    SendSmsRequest, SendSmsResponse,
};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Unreadable bodies (wrong content type, bad JSON, non-string fields) get the same 400 as
/// missing fields.
fn json_body<T>(
    body: Result<Json<T>, JsonRejection>,
    required: &'static str,
) -> Result<T, AppError> {
    body.map(|Json(req)| req).map_err(|rejection| {
        debug!(error=%rejection, "rejected request body");
        AppError::Validation(required)
    })
}

pub async fn send_sms(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<SendSmsRequest>, JsonRejection>,
) -> Result<Json<SendSmsResponse>, AppError> {
    let req = json_body(body, actions::SMS_FIELDS_REQUIRED)?;
    let to = req.to.as_deref().unwrap_or_default();
    let text = req.message.as_deref().unwrap_or_default();
    let message_id = actions::send_message(&app_state, to, text).await?;
    Ok(Json(SendSmsResponse {
        success: true,
        message_id,
    }))
}

pub async fn sms_messages(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    let messages = app_state
        .store
        .list_messages()
        .await
        .map_err(|source| AppError::Store {
            context: "Failed to list SMS messages",
            source,
        })?;
    Ok(Json(messages.iter().map(MessageView::from).collect()))
}

pub async fn initiate_call(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<InitiateCallRequest>, JsonRejection>,
) -> Result<Json<InitiateCallResponse>, AppError> {
    let req = json_body(body, actions::CALL_TO_REQUIRED)?;
    let to = req.to.as_deref().unwrap_or_default();
    let call_id = actions::initiate_call(&app_state, to).await?;
    Ok(Json(InitiateCallResponse {
        success: true,
        call_id,
    }))
}

pub async fn call_logs(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<CallLogView>>, AppError> {
    let calls = app_state
        .store
        .list_calls()
        .await
        .map_err(|source| AppError::Store {
            context: "Failed to list call logs",
            source,
        })?;
    Ok(Json(calls.iter().map(CallLogView::from).collect()))
}

/// Telnyx webhook intake. Verifies the signature (when a key is configured), queues the event and
/// acknowledges; the intake worker applies it later. Bodies we cannot parse are acknowledged and
/// dropped since redelivering them would not help.
pub async fn webhook(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if let Some(verifier) = &app_state.verifier {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        verifier.verify(header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER), &body)?;
    }
    trace!(body=%String::from_utf8_lossy(&body), "webhook body");

    match serde_json::from_slice::<WebhookEnvelope>(&body) {
        Ok(envelope) => app_state
            .intake
            .send(IntakeJob::new(envelope))
            .await
            .map_err(|_| AppError::IntakeClosed)?,
        Err(e) => warn!(error=%e, "failed to deserialize webhook envelope; dropping"),
    }
    Ok((StatusCode::OK, "Webhook received"))
}

pub async fn index(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    format!(
        "Telnyx SMS & voice demo. Webhook URL: {}",
        app_state.config.webhook_url()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::testing::FakeProvider;
    use crate::provider::CommsProvider;
    use crate::signature::testing::{public_key_b64, sign};
    use crate::signature::WebhookVerifier;
    use crate::store::{EventStore, MemoryStore};
    use crate::tasks::process_webhook_events;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct TestApp {
        base: String,
        client: reqwest::Client,
        store: Arc<MemoryStore>,
    }

    impl TestApp {
        fn spawn(provider: FakeProvider, verify: bool) -> Self {
            let store = Arc::new(MemoryStore::new());
            let provider: Arc<dyn CommsProvider> = Arc::new(provider);
            let (intake, intake_stream) = mpsc::channel(16);
            tokio::spawn(process_webhook_events(
                intake_stream,
                intake.clone(),
                store.clone(),
            ));
            let verifier =
                verify.then(|| WebhookVerifier::from_base64(&public_key_b64(), 300).unwrap());
            let app_state = Arc::new(AppState {
                config: Config::for_tests("http://127.0.0.1:1/v2"),
                provider,
                store: store.clone(),
                verifier,
                intake,
            });

            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let server = axum::Server::from_tcp(listener)
                .unwrap()
                .serve(crate::router(app_state).into_make_service());
            tokio::spawn(server);

            Self {
                base: format!("http://{addr}"),
                client: reqwest::Client::new(),
                store,
            }
        }

        async fn post_json(&self, path: &str, body: Value) -> reqwest::Response {
            self.client
                .post(format!("{}{}", self.base, path))
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        async fn get_json(&self, path: &str) -> Value {
            self.client
                .get(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        }

        async fn wait_for_calls(&self, n: usize) {
            for _ in 0..100 {
                if self.store.list_calls().await.unwrap().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("store never reached {n} call records");
        }
    }

    fn now_ts() -> String {
        time::OffsetDateTime::now_utc().unix_timestamp().to_string()
    }

    #[tokio::test]
    async fn send_sms_then_list() {
        let app = TestApp::spawn(FakeProvider::default(), false);

        let resp = app
            .post_json("/api/send-sms", json!({"to": "+15550002222", "message": "hey"}))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"success": true, "messageId": "msg-1"}));

        let list = app.get_json("/api/sms-messages").await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "msg-1");
        assert_eq!(list[0]["direction"], "outbound");
        assert_eq!(list[0]["from"], "+15550001111");
        assert_eq!(list[0]["to"], "+15550002222");
        assert_eq!(list[0]["text"], "hey");
        assert!(list[0]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn missing_fields_are_a_bad_request() {
        let app = TestApp::spawn(FakeProvider::default(), false);

        let resp = app.post_json("/api/send-sms", json!({"to": "+15550002222"})).await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "To phone number and message are required");

        let resp = app.post_json("/api/initiate-call", json!({})).await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "To phone number is required");
    }

    #[tokio::test]
    async fn null_or_mistyped_fields_are_a_bad_request() {
        let app = TestApp::spawn(FakeProvider::default(), false);

        let resp = app
            .post_json("/api/send-sms", json!({"to": null, "message": "hi"}))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "To phone number and message are required"}));

        let resp = app
            .post_json("/api/send-sms", json!({"to": "+15550002222", "message": 7}))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = app.post_json("/api/initiate-call", json!({"to": 15550002222u64})).await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "To phone number is required"}));

        assert_eq!(app.get_json("/api/sms-messages").await, json!([]));
        assert_eq!(app.get_json("/api/call-logs").await, json!([]));
    }

    #[tokio::test]
    async fn non_json_body_is_a_bad_request() {
        let app = TestApp::spawn(FakeProvider::default(), false);

        let resp = app
            .client
            .post(format!("{}/api/send-sms", app.base))
            .body("to=+15550002222&message=hi")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "To phone number and message are required");

        let resp = app
            .client
            .post(format!("{}/api/initiate-call", app.base))
            .header("content-type", "application/json")
            .body("{\"to\":")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "To phone number is required");
    }

    #[tokio::test]
    async fn provider_errors_are_a_server_error_with_details() {
        let app = TestApp::spawn(FakeProvider::failing("Insufficient balance"), false);

        let resp = app.post_json("/api/initiate-call", json!({"to": "+15550002222"})).await;
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            json!({"error": "Failed to initiate call", "details": "Insufficient balance"})
        );
        assert_eq!(app.get_json("/api/call-logs").await, json!([]));
    }

    #[tokio::test]
    async fn outbound_call_is_updated_by_webhooks() {
        let app = TestApp::spawn(FakeProvider::default(), false);

        let resp = app.post_json("/api/initiate-call", json!({"to": "+15550002222"})).await;
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"success": true, "callId": "v3:call-1"}));

        let logs = app.get_json("/api/call-logs").await;
        assert_eq!(logs[0]["status"], "initiated");
        assert!(logs[0].get("updated_at").is_none());

        let resp = app
            .post_json(
                "/webhook",
                json!({"data": {"id": "evt-1", "event_type": "call.answered", "payload": {"call_control_id": "v3:call-1", "direction": "outgoing"}}}),
            )
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "Webhook received");

        for _ in 0..100 {
            let logs = app.get_json("/api/call-logs").await;
            if logs[0]["status"] == "answered" {
                assert!(logs[0]["updated_at"].is_string());
                assert_eq!(logs.as_array().unwrap().len(), 1);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("call never reached answered");
    }

    #[tokio::test]
    async fn unparseable_webhook_is_still_acknowledged() {
        let app = TestApp::spawn(FakeProvider::default(), false);
        let resp = app
            .client
            .post(format!("{}/webhook", app.base))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn signed_webhook_is_accepted() {
        let app = TestApp::spawn(FakeProvider::default(), true);
        let body = json!({"data": {"id": "evt-9", "event_type": "call.initiated", "payload": {"call_control_id": "v3:in", "direction": "incoming", "from": "+15550003333", "to": "+15550001111"}}}).to_string();
        let ts = now_ts();

        let resp = app
            .client
            .post(format!("{}/webhook", app.base))
            .header(SIGNATURE_HEADER, sign(&ts, &body))
            .header(TIMESTAMP_HEADER, &ts)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        app.wait_for_calls(1).await;
        let logs = app.get_json("/api/call-logs").await;
        assert_eq!(logs[0]["id"], "v3:in");
        assert_eq!(logs[0]["direction"], "inbound");
        assert_eq!(logs[0]["from"], "+15550003333");
    }

    #[tokio::test]
    async fn unsigned_or_forged_webhook_is_rejected() {
        let app = TestApp::spawn(FakeProvider::default(), true);
        let body = json!({"data": {"id": "evt-10", "event_type": "call.initiated", "payload": {"call_control_id": "v3:forged", "direction": "incoming"}}}).to_string();
        let ts = now_ts();

        let resp = app
            .client
            .post(format!("{}/webhook", app.base))
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        let resp = app
            .client
            .post(format!("{}/webhook", app.base))
            .header(SIGNATURE_HEADER, sign(&ts, "{}"))
            .header(TIMESTAMP_HEADER, &ts)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(app.store.list_calls().await.unwrap().is_empty());
    }
}
