use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, CreateChatCompletionStreamResponse, FinishReason,
    },
    Client,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use mito_ai_shared::{ChatMessage, MessageRole};
use std::sync::OnceLock;
use tracing::{debug, error, info};

use crate::error::ProviderError;
use crate::provider::{
    Choice, Completion, CompletionClient, DeltaChoice, DeltaStream, KeyType, StreamDelta,
};

/// Direct OpenAI access with the user's own key.
pub struct OpenAiClient {
    api_key: String,
    model: String,
    temperature: f32,
    max_completion_tokens: Option<u32>,
    client: OnceLock<Client<OpenAIConfig>>,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        model: String,
        temperature: f32,
        max_completion_tokens: Option<u32>,
    ) -> Self {
        info!("Initializing OpenAI client with model: {}", model);
        Self {
            api_key,
            model,
            temperature,
            max_completion_tokens,
            client: OnceLock::new(),
        }
    }

    // Created on first use, then shared by every request.
    fn client(&self) -> &Client<OpenAIConfig> {
        self.client.get_or_init(|| {
            debug!("Creating OpenAI HTTP client");
            let config = OpenAIConfig::new().with_api_key(self.api_key.clone());
            Client::with_config(config)
        })
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, ProviderError> {
        let messages = messages
            .iter()
            .cloned()
            .map(convert_to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(self.temperature);
        if stream {
            args.stream(true);
        }
        if let Some(max_completion_tokens) = self.max_completion_tokens {
            args.max_completion_tokens(max_completion_tokens);
        }
        Ok(args.build()?)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "OpenAI API"
    }

    fn key_type(&self) -> KeyType {
        KeyType::UserKey
    }

    fn can_stream(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ProviderError> {
        debug!("Requesting completion from OpenAI API with personal key.");
        let request = self.build_request(messages, false)?;
        let response = self.client().chat().create(request).await.map_err(|e| {
            error!("OpenAI completion failed: {:?}", e);
            ProviderError::from(e)
        })?;

        Ok(Completion::from(response))
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError> {
        debug!("Opening OpenAI completion stream.");
        let request = self.build_request(messages, true)?;
        let stream = match self.client().chat().create_stream(request).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to create OpenAI stream: {:?}", e);
                return Err(ProviderError::from(e));
            }
        };

        Ok(stream
            .map(|item| item.map(StreamDelta::from).map_err(ProviderError::from))
            .boxed())
    }
}

impl From<CreateChatCompletionResponse> for Completion {
    fn from(response: CreateChatCompletionResponse) -> Self {
        Completion {
            choices: response
                .choices
                .into_iter()
                .map(|choice| Choice {
                    content: choice.message.content,
                })
                .collect(),
            num_usages: None,
        }
    }
}

impl From<CreateChatCompletionStreamResponse> for StreamDelta {
    fn from(response: CreateChatCompletionStreamResponse) -> Self {
        StreamDelta {
            choices: response
                .choices
                .into_iter()
                .map(|choice| DeltaChoice {
                    content: choice.delta.content,
                    finish_reason: choice.finish_reason.map(finish_reason_label),
                })
                .collect(),
        }
    }
}

fn finish_reason_label(reason: FinishReason) -> String {
    serde_json::to_value(&reason)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("{:?}", reason))
}

fn convert_to_openai_message(
    msg: ChatMessage,
) -> Result<ChatCompletionRequestMessage, ProviderError> {
    let message = match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::Assistant => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            // OpenAI rejects empty assistant content
            if !msg.content.is_empty() {
                builder.content(msg.content);
            }
            ChatCompletionRequestMessage::Assistant(builder.build()?)
        }
    };
    Ok(message)
}
