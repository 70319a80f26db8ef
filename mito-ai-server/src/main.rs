use mito_ai_server::{
    auth::{OriginPolicy, StaticAuthorizer, TokenAuthenticator},
    client_from_config,
    completion::CompletionService,
    config::Config,
    run_server_on_listener,
    telemetry::{TelemetrySink, TracingTelemetry},
    AppState,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    if config.token.is_none() {
        info!("MITO_AI_TOKEN not set, accepting unauthenticated connections");
    }

    let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetry);
    let client = client_from_config(&config, telemetry.clone())?;
    let state = Arc::new(AppState {
        service: Arc::new(CompletionService::new(client, telemetry)),
        authenticator: Arc::new(TokenAuthenticator::new(config.token.clone())),
        authorizer: Arc::new(StaticAuthorizer::allow_all()),
        origins: OriginPolicy::new(config.allowed_origins.clone()),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    run_server_on_listener(listener, state).await
}
