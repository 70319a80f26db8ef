use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Request from client to server.
///
/// The notebook frontend also sends a `type` field; it carries no meaning for
/// the server and is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub message_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

/// Failure category of a completion exchange.
///
/// The label is what clients see in [`CompletionError::r#type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Api,
    NoCompletion,
    Parse,
    Auth,
    UsageLimit,
    Internal,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Network => "NetworkError",
            ErrorKind::Api => "ApiError",
            ErrorKind::NoCompletion => "NoCompletion",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::UsageLimit => "UsageLimitReached",
            ErrorKind::Internal => "Exception",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionError {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub traceback: String,
}

impl CompletionError {
    pub fn new(kind: ErrorKind, title: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            r#type: kind.label().to_string(),
            title: title.into(),
            traceback: traceback.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItemError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub insert_text: String,
    pub is_incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CompletionItemError>,
}

impl CompletionItem {
    pub fn complete(insert_text: impl Into<String>) -> Self {
        Self {
            insert_text: insert_text.into(),
            is_incomplete: false,
            token: None,
            error: None,
        }
    }

    /// A fragment of a streamed completion, tagged with the request id.
    pub fn partial(insert_text: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            insert_text: insert_text.into(),
            is_incomplete: true,
            token: Some(token.into()),
            error: None,
        }
    }
}

/// Final answer to a non-streaming request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReply {
    pub items: Vec<CompletionItem>,
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CompletionError>,
}

impl CompletionReply {
    pub fn single(parent_id: impl Into<String>, insert_text: impl Into<String>) -> Self {
        Self {
            items: vec![CompletionItem::complete(insert_text)],
            parent_id: parent_id.into(),
            error: None,
        }
    }

    pub fn failed(parent_id: impl Into<String>, error: CompletionError) -> Self {
        Self {
            items: Vec::new(),
            parent_id: parent_id.into(),
            error: Some(error),
        }
    }
}

/// One fragment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStreamChunk {
    pub chunk: CompletionItem,
    pub parent_id: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CompletionError>,
}

impl CompletionStreamChunk {
    /// The empty chunk that opens every stream.
    pub fn acknowledgement(parent_id: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        Self {
            chunk: CompletionItem::partial("", parent_id.clone()),
            parent_id,
            done: false,
            error: None,
        }
    }

    pub fn content(
        parent_id: impl Into<String>,
        insert_text: impl Into<String>,
        done: bool,
    ) -> Self {
        let parent_id = parent_id.into();
        Self {
            chunk: CompletionItem::partial(insert_text, parent_id.clone()),
            parent_id,
            done,
            error: None,
        }
    }

    /// Terminal chunk carrying `error`. The item error repeats the title so
    /// clients that only look at the chunk still see why the stream ended.
    pub fn failed(parent_id: impl Into<String>, error: CompletionError) -> Self {
        let parent_id = parent_id.into();
        let mut chunk = CompletionItem::partial("", parent_id.clone());
        chunk.error = Some(CompletionItemError {
            message: error.title.clone(),
        });
        Self {
            chunk,
            parent_id,
            done: true,
            error: Some(error),
        }
    }
}

/// Every message the server writes to a completion socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "inline_completion")]
    Reply(CompletionReply),
    #[serde(rename = "stream")]
    Stream(CompletionStreamChunk),
}

impl ServerMessage {
    /// Error answer shaped after the request: a terminal chunk for streaming
    /// requests, an empty reply otherwise.
    pub fn error_for(request: &CompletionRequest, error: CompletionError) -> Self {
        if request.stream {
            ServerMessage::Stream(CompletionStreamChunk::failed(&request.message_id, error))
        } else {
            ServerMessage::Reply(CompletionReply::failed(&request.message_id, error))
        }
    }

    pub fn parent_id(&self) -> &str {
        match self {
            ServerMessage::Reply(reply) => &reply.parent_id,
            ServerMessage::Stream(chunk) => &chunk.parent_id,
        }
    }

    pub fn error(&self) -> Option<&CompletionError> {
        match self {
            ServerMessage::Reply(reply) => reply.error.as_ref(),
            ServerMessage::Stream(chunk) => chunk.error.as_ref(),
        }
    }

    /// True for the last message of an exchange.
    pub fn is_terminal(&self) -> bool {
        match self {
            ServerMessage::Reply(_) => true,
            ServerMessage::Stream(chunk) => chunk.done,
        }
    }
}

impl From<CompletionReply> for ServerMessage {
    fn from(reply: CompletionReply) -> Self {
        ServerMessage::Reply(reply)
    }
}

impl From<CompletionStreamChunk> for ServerMessage {
    fn from(chunk: CompletionStreamChunk) -> Self {
        ServerMessage::Stream(chunk)
    }
}
