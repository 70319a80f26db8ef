//! Scripted completion client and recording telemetry for tests and local runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use mito_ai_shared::ChatMessage;

use crate::error::ProviderError;
use crate::provider::{
    Choice, Completion, CompletionClient, DeltaChoice, DeltaStream, KeyType, StreamDelta,
};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// One scripted upstream stream event.
#[derive(Debug, Clone)]
pub enum MockDelta {
    Content(String),
    /// Content carrying a finish reason.
    Finished(String),
    /// A delta with an empty choice list.
    NoChoices,
    /// A stream-level failure.
    Error(String),
}

/// Completion client returning fixed choices or deltas.
pub struct MockCompletionClient {
    choices: Vec<Option<String>>,
    deltas: Vec<MockDelta>,
    failure: Option<String>,
    can_stream: bool,
    key_type: KeyType,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockCompletionClient {
    /// Non-streaming client returning `choices` from `complete`.
    pub fn with_choices<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(|c| Some(c.into())).collect(),
            deltas: Vec::new(),
            failure: None,
            can_stream: false,
            key_type: KeyType::UserKey,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Streaming client replaying `deltas`. `complete` returns their concatenated text.
    pub fn streaming(deltas: Vec<MockDelta>) -> Self {
        let text: String = deltas
            .iter()
            .filter_map(|d| match d {
                MockDelta::Content(s) | MockDelta::Finished(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        Self {
            choices: vec![Some(text)],
            deltas,
            can_stream: true,
            ..Self::with_choices(Vec::<String>::new())
        }
    }

    /// Every call fails with a network-style stream error before producing output.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            can_stream: true,
            ..Self::with_choices(Vec::<String>::new())
        }
    }

    pub fn with_can_stream(mut self, can_stream: bool) -> Self {
        self.can_stream = can_stream;
        self
    }

    /// Metered clients report their call count as `num_usages`.
    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, messages: &[ChatMessage]) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap_or_else(|e| e.into_inner()) = messages.to_vec();
        match &self.failure {
            Some(message) => Err(ProviderError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn name(&self) -> &'static str {
        "mock provider"
    }

    fn key_type(&self) -> KeyType {
        self.key_type
    }

    fn can_stream(&self) -> bool {
        self.can_stream
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ProviderError> {
        self.record(messages)?;
        Ok(Completion {
            choices: self
                .choices
                .iter()
                .map(|content| Choice {
                    content: content.clone(),
                })
                .collect(),
            num_usages: match self.key_type {
                KeyType::MitoServer => Some(self.calls() as u64),
                KeyType::UserKey => None,
            },
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError> {
        self.record(messages)?;
        let items: Vec<Result<StreamDelta, ProviderError>> = self
            .deltas
            .iter()
            .map(|delta| match delta {
                MockDelta::Content(text) => Ok(delta_with(text, None)),
                MockDelta::Finished(text) => Ok(delta_with(text, Some("stop"))),
                MockDelta::NoChoices => Ok(StreamDelta::default()),
                MockDelta::Error(message) => Err(ProviderError::Parse(message.clone())),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

fn delta_with(text: &str, finish_reason: Option<&str>) -> StreamDelta {
    StreamDelta {
        choices: vec![DeltaChoice {
            content: Some(text.to_string()),
            finish_reason: finish_reason.map(str::to_string),
        }],
    }
}

/// Keeps every telemetry event in memory.
#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name).collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn log(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
