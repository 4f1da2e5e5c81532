mod api {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    pub struct CreateMessage<'a> {
        pub from: &'a str,
        pub to: &'a str,
        pub text: &'a str,
    }

    #[derive(Serialize, Debug)]
    pub struct CreateCall<'a> {
        pub connection_id: &'a str,
        pub to: &'a str,
        pub from: &'a str,
        pub audio_url: &'a str,
    }

    /// Every Telnyx v2 response wraps its resource in `data`.
    #[derive(Deserialize, Debug)]
    pub struct DataEnvelope<T> {
        pub data: T,
    }

    #[derive(Deserialize, Debug)]
    pub struct MessageResource {
        pub id: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct CallResource {
        pub call_control_id: String,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct ApiErrors {
        #[serde(default)]
        pub errors: Vec<ApiErrorItem>,
    }

    #[derive(Deserialize, Debug)]
    pub struct ApiErrorItem {
        #[serde(default)]
        pub code: Option<String>,
        #[serde(default)]
        pub title: Option<String>,
        #[serde(default)]
        pub detail: Option<String>,
    }

    impl ApiErrors {
        /// Most specific human-readable text Telnyx gave us, joined across all reported errors.
        pub fn describe(&self) -> Option<String> {
            let parts: Vec<&str> = self
                .errors
                .iter()
                .filter_map(|e| e.detail.as_deref().or(e.title.as_deref()).or(e.code.as_deref()))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
    }
}
pub use api::*;

mod webhook {
    use serde::Deserialize;

    pub const SIGNATURE_HEADER: &str = "telnyx-signature-ed25519";
    pub const TIMESTAMP_HEADER: &str = "telnyx-timestamp";

    #[derive(Deserialize, Clone, Debug)]
    pub struct WebhookEnvelope {
        pub data: WebhookData,
    }

    #[derive(Deserialize, Clone, Debug)]
    pub struct WebhookData {
        /// Unique per event; redeliveries of the same event reuse it
        #[serde(default)]
        pub id: Option<String>,
        pub event_type: String,
        #[serde(default)]
        pub occurred_at: Option<String>,
        /// Shape depends on `event_type`, so it is decoded lazily by the reconciler
        #[serde(default)]
        pub payload: serde_json::Value,
    }

    #[derive(Deserialize, Debug)]
    pub struct PhoneEndpoint {
        pub phone_number: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct MessageReceivedPayload {
        pub id: String,
        pub from: PhoneEndpoint,
        #[serde(default)]
        pub to: Vec<PhoneEndpoint>,
        #[serde(default)]
        pub text: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct CallEventPayload {
        pub call_control_id: String,
        #[serde(default)]
        pub direction: Option<String>,
        #[serde(default)]
        pub from: String,
        #[serde(default)]
        pub to: String,
    }

    impl CallEventPayload {
        pub fn is_incoming(&self) -> bool {
            self.direction.as_deref() == Some("incoming")
        }
    }
}
pub use webhook::*;
