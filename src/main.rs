mod actions;
mod config;
mod error;
mod handlers;
mod provider;
mod reconciler;
mod signature;
mod store;
mod tasks;
mod telnyx_types;
mod types;
mod utils;

use crate::config::Config;
use crate::provider::TelnyxClient;
use crate::signature::WebhookVerifier;
use crate::store::MemoryStore;
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_TELNYX_API_BASE: &str = "https://api.telnyx.com/v2";
    pub const DEFAULT_CONNECTION_ID: &str = "your_connection_id";
    pub const DEFAULT_AUDIO_URL: &str = "https://example.com/greeting.wav";
    pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
    pub const INTAKE_QUEUE_DEPTH: usize = 1_024;
    pub const INTAKE_MAX_ATTEMPTS: u32 = 5;
    pub const INTAKE_RETRY_BASE_MILLIS: u64 = 100;
    pub const SEEN_EVENT_WINDOW: usize = 10_000;
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/send-sms", post(handlers::send_sms))
        .route("/api/sms-messages", get(handlers::sms_messages))
        .route("/api/initiate-call", post(handlers::initiate_call))
        .route("/api/call-logs", get(handlers::call_logs))
        .route("/webhook", post(handlers::webhook))
        .route("/", get(handlers::index))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; the variables may come from the real environment.
    let _ = dotenvy::dotenv();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("telnyx_rs", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).expect("failed to install tracing");

    let config = Config::from_env().expect("invalid configuration");
    let verifier = match &config.telnyx_public_key {
        Some(key) => Some(
            WebhookVerifier::from_base64(key, config.webhook_tolerance_secs)
                .expect("TELNYX_PUBLIC_KEY is not a valid Ed25519 key"),
        ),
        None => {
            warn!("TELNYX_PUBLIC_KEY not set; webhook signatures will NOT be verified");
            None
        }
    };
    let http_client = reqwest::Client::new();
    let provider = Arc::new(TelnyxClient::new(http_client, &config));
    let store = Arc::new(MemoryStore::new());
    let (intake, intake_stream) = mpsc::channel(consts::INTAKE_QUEUE_DEPTH);
    tokio::spawn(tasks::process_webhook_events(
        intake_stream,
        intake.clone(),
        store.clone(),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let webhook_url = config.webhook_url();
    let app_state = Arc::new(AppState {
        config,
        provider,
        store,
        verifier,
        intake,
    });

    info!("Server running on port {}", addr.port());
    info!("Webhook URL: {webhook_url}");
    axum::Server::bind(&addr)
        .serve(router(app_state).into_make_service())
        .await
        .expect("server error");
}
