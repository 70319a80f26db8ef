//! Upstream failure type and its mapping onto the wire error shape.

use async_openai::error::OpenAIError;
use mito_ai_shared::{CompletionError, ErrorKind};
use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to a completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to the completion provider failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("completion stream failed: {0}")]
    Stream(String),

    #[error("{0}")]
    Api(String),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Auth(String),

    #[error("Mito server free tier limit of {limit} completions reached")]
    UsageLimit { limit: u64 },

    #[error("{provider} does not support streaming completions")]
    StreamingUnsupported { provider: &'static str },

    #[error("{0}")]
    Internal(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Network(_) | ProviderError::Stream(_) => ErrorKind::Network,
            ProviderError::Api(_) => ErrorKind::Api,
            ProviderError::Parse(_) => ErrorKind::Parse,
            ProviderError::Auth(_) => ErrorKind::Auth,
            ProviderError::UsageLimit { .. } => ErrorKind::UsageLimit,
            ProviderError::StreamingUnsupported { .. } | ProviderError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn to_completion_error(&self) -> CompletionError {
        CompletionError::new(self.kind(), self.to_string(), error_report(self))
    }
}

impl From<OpenAIError> for ProviderError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::Reqwest(e) => ProviderError::from(e),
            OpenAIError::ApiError(api_err) => ProviderError::Api(api_err.message),
            OpenAIError::JSONDeserialize(e, _content) => ProviderError::Parse(e.to_string()),
            OpenAIError::StreamError(e) => ProviderError::Stream(e.to_string()),
            other => ProviderError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN) => {
                ProviderError::Auth(e.to_string())
            }
            _ if e.is_decode() => ProviderError::Parse(e.to_string()),
            _ => ProviderError::Network(e),
        }
    }
}

/// Renders an error and its source chain, one cause per line.
pub fn error_report(error: &(dyn std::error::Error + 'static)) -> String {
    let mut report = format!("{}: {}", type_name_of(error), error);
    let mut source = error.source();
    if source.is_some() {
        report.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        report.push_str(&format!("\n    {}: {}", depth, cause));
        depth += 1;
        source = cause.source();
    }
    report
}

fn type_name_of(error: &(dyn std::error::Error + 'static)) -> String {
    // Debug output starts with the variant name for the enums we produce.
    let debug = format!("{:?}", error);
    debug
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::StreamError;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(ProviderError::Stream("x".into()).kind(), ErrorKind::Network);
        assert_eq!(ProviderError::Api("x".into()).kind(), ErrorKind::Api);
        assert_eq!(ProviderError::Parse("x".into()).kind(), ErrorKind::Parse);
        assert_eq!(ProviderError::UsageLimit { limit: 3 }.kind(), ErrorKind::UsageLimit);
        assert_eq!(
            ProviderError::StreamingUnsupported { provider: "Mito server" }.kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn openai_stream_error_keeps_message() {
        let err = OpenAIError::StreamError(Box::new(StreamError::EventStream(
            "connection reset".to_string(),
        )));
        let provider_err = ProviderError::from(err);
        assert_eq!(provider_err.kind(), ErrorKind::Network);
        assert!(provider_err.to_string().contains("connection reset"));
    }

    #[test]
    fn openai_deserialize_error_is_parse() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = OpenAIError::JSONDeserialize(json_err, "{".to_string());
        let provider_err = ProviderError::from(err);
        assert_eq!(provider_err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn completion_error_uses_kind_label_and_display() {
        let error = ProviderError::UsageLimit { limit: 500 }.to_completion_error();
        assert_eq!(error.r#type, "UsageLimitReached");
        assert_eq!(error.title, "Mito server free tier limit of 500 completions reached");
        assert!(error.traceback.starts_with("UsageLimit: "), "{}", error.traceback);
    }

    #[test]
    fn report_lists_source_chain() {
        #[derive(Debug, Error)]
        #[error("outer failure")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let report = error_report(&err);
        assert!(report.starts_with("Outer: outer failure"), "{}", report);
        assert!(report.contains("Caused by:"));
        assert!(report.contains("0: disk gone"));
    }
}
