use crate::config::Config;
use crate::telnyx_types::{
    ApiErrors, CallResource, CreateCall, CreateMessage, DataEnvelope, MessageResource,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to telnyx failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{detail}")]
    Api { status: u16, detail: String },
    #[error("unexpected telnyx response: {0}")]
    Decode(String),
}

/// Outbound side of the communications provider.
#[async_trait]
pub trait CommsProvider: Send + Sync {
    /// Sends an SMS and returns the provider's message id.
    async fn send_message(&self, from: &str, to: &str, text: &str) -> Result<String, ProviderError>;

    /// Dials `to` and plays `audio_url` once answered. Returns the call control id.
    async fn create_call(
        &self,
        connection_id: &str,
        from: &str,
        to: &str,
        audio_url: &str,
    ) -> Result<String, ProviderError>;
}

pub struct TelnyxClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl TelnyxClient {
    pub fn new(http_client: reqwest::Client, config: &Config) -> Self {
        Self {
            http_client,
            api_key: config.telnyx_api_key.clone(),
            api_base: config.telnyx_api_base.clone(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + std::fmt::Debug + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.api_base, path);
        trace!(url=%url, body=?body, "telnyx request");
        let resp = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(status=%status, "telnyx response");

        if !status.is_success() {
            let detail = serde_json::from_slice::<ApiErrors>(&bytes)
                .ok()
                .and_then(|e| e.describe())
                .unwrap_or_else(|| format!("telnyx responded with {status}"));
            return Err(ProviderError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        serde_json::from_slice::<DataEnvelope<T>>(&bytes)
            .map(|env| env.data)
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CommsProvider for TelnyxClient {
    async fn send_message(&self, from: &str, to: &str, text: &str) -> Result<String, ProviderError> {
        let body = CreateMessage { from, to, text };
        let message: MessageResource = self.post("/messages", &body).await?;
        Ok(message.id)
    }

    async fn create_call(
        &self,
        connection_id: &str,
        from: &str,
        to: &str,
        audio_url: &str,
    ) -> Result<String, ProviderError> {
        let body = CreateCall {
            connection_id,
            to,
            from,
            audio_url,
        };
        let call: CallResource = self.post("/calls", &body).await?;
        Ok(call.call_control_id)
    }
}
