//! Metered completions through the Mito server, used when no OpenAI key is configured.

use std::sync::Arc;

use async_trait::async_trait;
use mito_ai_shared::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{Choice, Completion, CompletionClient, DeltaStream, KeyType};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::usage::UsageCounter;

const USER_AGENT: &str = "Mito-AI client";

#[derive(Debug, Clone)]
pub struct MitoServerSettings {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub is_pro: bool,
    pub free_tier_limit: u64,
}

#[derive(Serialize)]
struct MitoServerRequest<'a> {
    email: Option<String>,
    user_id: Option<String>,
    data: CompletionData<'a>,
    // Only used for logging on the server side.
    user_input: &'a str,
}

#[derive(Serialize)]
struct CompletionData<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct MitoServerResponse {
    #[serde(default)]
    completion: String,
}

pub struct MitoServerClient {
    http: reqwest::Client,
    settings: MitoServerSettings,
    usage: Arc<UsageCounter>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl MitoServerClient {
    pub fn new(
        settings: MitoServerSettings,
        usage: Arc<UsageCounter>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            settings,
            usage,
            telemetry,
        })
    }

    async fn check_free_tier(&self) -> Result<(), ProviderError> {
        if self.settings.is_pro {
            return Ok(());
        }
        let used = self.usage.current().await;
        if used >= self.settings.free_tier_limit {
            warn!(
                "Free tier limit reached: {} of {} metered completions used",
                used, self.settings.free_tier_limit
            );
            self.telemetry.log(TelemetryEvent::free_tier_limit_reached());
            return Err(ProviderError::UsageLimit {
                limit: self.settings.free_tier_limit,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionClient for MitoServerClient {
    fn name(&self) -> &'static str {
        "Mito server"
    }

    fn key_type(&self) -> KeyType {
        KeyType::MitoServer
    }

    fn can_stream(&self) -> bool {
        false
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ProviderError> {
        debug!("Requesting completion from Mito server.");
        self.check_free_tier().await?;

        let identity = self.usage.identity().await;
        let body = MitoServerRequest {
            email: identity.email,
            user_id: identity.user_id,
            data: CompletionData {
                model: &self.settings.model,
                messages,
                temperature: self.settings.temperature,
            },
            user_input: messages.last().map(|m| m.content.as_str()).unwrap_or_default(),
        };

        let response: MitoServerResponse = self
            .http
            .post(&self.settings.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let num_usages = self.usage.increment().await;
        Ok(Completion {
            choices: vec![Choice {
                content: Some(response.completion),
            }],
            num_usages: Some(num_usages),
        })
    }

    async fn complete_stream(
        &self,
        _messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError> {
        Err(ProviderError::StreamingUnsupported {
            provider: self.name(),
        })
    }
}
