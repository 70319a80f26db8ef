//! Websocket completion service for the Mito AI notebook extension.
//!
//! Clients connect to [`COMPLETIONS_PATH`], send [`mito_ai_shared::CompletionRequest`]s
//! and receive replies or stream chunks. Completions come from OpenAI when an
//! API key is configured, otherwise from the metered Mito server.

pub mod auth;
pub mod completion;
pub mod config;
pub mod error;
mod handler;
pub mod llm;
pub mod mito_server;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod provider;
pub mod telemetry;
pub mod usage;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use auth::{Authenticator, Authorizer, OriginPolicy};
use completion::CompletionService;
use config::Config;
use error::ProviderError;
use llm::OpenAiClient;
use mito_server::{MitoServerClient, MitoServerSettings};
use provider::CompletionClient;
use telemetry::TelemetrySink;
use usage::{JsonFileUsageStore, UsageCounter};

pub const COMPLETIONS_PATH: &str = "/mito-ai/chat-completions";

/// Shared by every connection.
pub struct AppState {
    pub service: Arc<CompletionService>,
    pub authenticator: Arc<dyn Authenticator>,
    pub authorizer: Arc<dyn Authorizer>,
    pub origins: OriginPolicy,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(COMPLETIONS_PATH, get(handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Picks OpenAI when a key is configured, the metered Mito server otherwise.
pub fn client_from_config(
    config: &Config,
    telemetry: Arc<dyn TelemetrySink>,
) -> Result<Arc<dyn CompletionClient>, ProviderError> {
    match &config.openai_api_key {
        Some(api_key) => {
            info!("Using OpenAI model {} with personal key", config.model);
            Ok(Arc::new(OpenAiClient::new(
                api_key.clone(),
                config.model.clone(),
                config.temperature,
                config.max_completion_tokens,
            )))
        }
        None => {
            info!("No OpenAI key configured, using the Mito server at {}", config.mito_ai_url);
            let usage = Arc::new(UsageCounter::new(JsonFileUsageStore::new(
                &config.user_json_path,
            )));
            let settings = MitoServerSettings {
                url: config.mito_ai_url.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
                is_pro: config.is_pro,
                free_tier_limit: config.free_tier_limit,
            };
            Ok(Arc::new(MitoServerClient::new(settings, usage, telemetry)?))
        }
    }
}

pub async fn run_server_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Completion server listening on ws://{}{}", addr, COMPLETIONS_PATH);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
