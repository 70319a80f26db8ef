//! Fire-and-forget completion telemetry.

use tracing::info;

use crate::error::ProviderError;
use crate::provider::KeyType;

pub const MITO_AI_COMPLETION_SUCCESS: &str = "mito_ai_completion_success";
pub const MITO_AI_COMPLETION_ERROR: &str = "mito_ai_completion_error";
pub const MITO_SERVER_FREE_TIER_LIMIT_REACHED: &str = "mito_server_free_tier_limit_reached";

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub key_type: Option<KeyType>,
    /// Metered usage count, set on successful Mito server completions.
    pub num_usages: Option<u64>,
    pub error: Option<String>,
}

impl TelemetryEvent {
    pub fn completion_success(key_type: KeyType, num_usages: Option<u64>) -> Self {
        Self {
            name: MITO_AI_COMPLETION_SUCCESS,
            key_type: Some(key_type),
            num_usages,
            error: None,
        }
    }

    pub fn completion_error(key_type: KeyType, error: &ProviderError) -> Self {
        Self {
            name: MITO_AI_COMPLETION_ERROR,
            key_type: Some(key_type),
            num_usages: None,
            error: Some(error.to_string()),
        }
    }

    pub fn free_tier_limit_reached() -> Self {
        Self {
            name: MITO_SERVER_FREE_TIER_LIMIT_REACHED,
            key_type: Some(KeyType::MitoServer),
            num_usages: None,
            error: None,
        }
    }
}

/// Receives telemetry events. Implementations must not block the caller.
pub trait TelemetrySink: Send + Sync {
    fn log(&self, event: TelemetryEvent);
}

/// Writes events as structured `tracing` records under the `mito_ai::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn log(&self, event: TelemetryEvent) {
        info!(
            target: "mito_ai::telemetry",
            event = event.name,
            key_type = event.key_type.map(KeyType::as_str),
            num_usages = event.num_usages,
            error = event.error.as_deref(),
            "telemetry"
        );
    }
}
