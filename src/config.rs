use crate::consts::{
    DEFAULT_AUDIO_URL, DEFAULT_CONNECTION_ID, DEFAULT_PORT, DEFAULT_TELNYX_API_BASE,
    DEFAULT_WEBHOOK_TOLERANCE_SECS,
};

use std::env;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set!")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub telnyx_api_key: String,
    /// Number every outbound SMS and call originates from
    pub telnyx_phone_number: String,
    pub telnyx_connection_id: String,
    pub telnyx_audio_url: String,
    pub telnyx_api_base: String,
    /// Base64 Ed25519 key used to check webhook signatures
    pub telnyx_public_key: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub port: u16,
    /// Public domain the provider reaches us on; only used for display
    pub app_domain: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get("PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: v,
            })?,
            None => DEFAULT_PORT,
        };
        let webhook_tolerance_secs = match get("WEBHOOK_TOLERANCE_SECS") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "WEBHOOK_TOLERANCE_SECS",
                value: v,
            })?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        Ok(Self {
            telnyx_api_key: required("TELNYX_API_KEY")?,
            telnyx_phone_number: required("TELNYX_PHONE_NUMBER")?,
            telnyx_connection_id: get("TELNYX_CONNECTION_ID")
                .unwrap_or_else(|| DEFAULT_CONNECTION_ID.to_string()),
            telnyx_audio_url: get("TELNYX_AUDIO_URL")
                .unwrap_or_else(|| DEFAULT_AUDIO_URL.to_string()),
            telnyx_api_base: get("TELNYX_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_TELNYX_API_BASE.to_string()),
            telnyx_public_key: get("TELNYX_PUBLIC_KEY"),
            webhook_tolerance_secs,
            port,
            app_domain: get("VITE_APP_DOMAIN"),
        })
    }

    pub fn webhook_url(&self) -> String {
        match &self.app_domain {
            Some(domain) => format!("{}/webhook", domain.trim_end_matches('/')),
            None => format!("http://localhost:{}/webhook", self.port),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(api_base: &str) -> Self {
        Self {
            telnyx_api_key: "KEY_TEST".to_string(),
            telnyx_phone_number: "+15550001111".to_string(),
            telnyx_connection_id: DEFAULT_CONNECTION_ID.to_string(),
            telnyx_audio_url: DEFAULT_AUDIO_URL.to_string(),
            telnyx_api_base: api_base.to_string(),
            telnyx_public_key: None,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            port: 0,
            app_domain: None,
        }
    }
}
