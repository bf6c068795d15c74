//! Core types for conversation streaming

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier correlating one streaming turn with a background task on the service.
///
/// Shaped `conversation:{user_id}:{pivot}`; see [`crate::session::generate_session_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A tool invocation reported by the agent while it works
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Tool output; a structured response is kept as its JSON text
    #[serde(default, deserialize_with = "text_or_json")]
    pub tool_response: Option<String>,
    #[serde(default)]
    pub tool_call_details: serde_json::Value,
}

fn text_or_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// Accumulated state of one streaming attempt, handed to update callbacks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamUpdate {
    /// Assistant text so far (append-only)
    pub message: String,
    /// Tool calls in arrival order (append-only)
    pub tool_calls: Vec<ToolCall>,
    /// Most recently reported citations (replaced, never merged)
    pub citations: Vec<String>,
}

/// Final result of a streamed turn.
///
/// Tool calls are only surfaced through the update callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub message: String,
    pub citations: Vec<String>,
}

/// Whether a background task is currently running for a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(alias = "is_active")]
    pub is_active: bool,
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: String,
    #[serde(default, alias = "session_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(
        default,
        alias = "estimated_completion",
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_completion: Option<i64>,
}

impl TaskStatus {
    /// The "nothing running" snapshot used when the status cannot be determined
    pub fn inactive(conversation_id: impl Into<String>) -> Self {
        Self {
            is_active: false,
            conversation_id: conversation_id.into(),
            session_id: None,
            estimated_completion: None,
        }
    }
}

/// Liveness of a remote streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Completed,
    #[serde(other)]
    Unknown,
}

/// Snapshot of a conversation's active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(alias = "session_id")]
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default, alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "started_at")]
    pub started_at: Option<i64>,
    #[serde(default, alias = "last_activity")]
    pub last_activity: Option<i64>,
}

impl SessionInfo {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// A message from conversation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl HistoryMessage {
    pub fn into_outcome(self) -> StreamOutcome {
        StreamOutcome {
            message: self.content,
            citations: self.citations.unwrap_or_default(),
        }
    }
}

/// A selected code-graph node giving the agent extra context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextNode {
    pub node_id: String,
    pub name: String,
}

impl ContextNode {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
        }
    }
}

/// An image uploaded alongside a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Everything the caller supplies for one outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub content: String,
    pub nodes: Vec<ContextNode>,
    pub attachment_ids: Option<Vec<String>>,
    pub images: Vec<ImageAttachment>,
    /// Overrides the generated session id
    pub session_id: Option<SessionId>,
}

impl MessagePayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<ContextNode>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_attachment_ids(mut self, ids: Vec<String>) -> Self {
        self.attachment_ids = Some(ids);
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Which streamed endpoint to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    /// Send a new message
    Message {
        conversation_id: String,
        session_id: SessionId,
        payload: MessagePayload,
    },
    /// Regenerate the last assistant reply
    Regenerate {
        conversation_id: String,
        nodes: Vec<ContextNode>,
    },
    /// Reattach to a running session
    Resume {
        conversation_id: String,
        session_id: SessionId,
    },
}

impl StreamRequest {
    pub fn conversation_id(&self) -> &str {
        match self {
            StreamRequest::Message {
                conversation_id, ..
            }
            | StreamRequest::Regenerate {
                conversation_id, ..
            }
            | StreamRequest::Resume {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Why a session could not be resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFailure {
    /// The service no longer knows the session
    SessionNotFound,
    /// Opening or reading the resumed stream failed
    NetworkError,
}

impl ResumeFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeFailure::SessionNotFound => "session_not_found",
            ResumeFailure::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for ResumeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of trying to reattach to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed(StreamOutcome),
    Failed(ResumeFailure),
}

impl ResumeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResumeOutcome::Resumed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_response_accepts_structured_output() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool_name":"t","tool_response":{"k":1}}"#).unwrap();
        assert_eq!(call.tool_response.as_deref(), Some(r#"{"k":1}"#));

        let call: ToolCall = serde_json::from_str(r#"{"tool_response":null}"#).unwrap();
        assert!(call.tool_response.is_none());

        let call: ToolCall = serde_json::from_str(r#"{"tool_response":"done"}"#).unwrap();
        assert_eq!(call.tool_response.as_deref(), Some("done"));
    }

    #[test]
    fn test_task_status_camel_case() {
        let status: TaskStatus = serde_json::from_str(
            r#"{"isActive":true,"sessionId":"conversation:u:m","conversationId":"c1"}"#,
        )
        .unwrap();
        assert!(status.is_active);
        assert_eq!(status.conversation_id, "c1");
        assert_eq!(status.session_id.as_deref(), Some("conversation:u:m"));
    }

    #[test]
    fn test_task_status_snake_case_alias() {
        let status: TaskStatus =
            serde_json::from_str(r#"{"is_active":false,"conversation_id":"c2"}"#).unwrap();
        assert_eq!(status, TaskStatus::inactive("c2"));
    }

    #[test]
    fn test_session_info_unknown_status() {
        let info: SessionInfo =
            serde_json::from_str(r#"{"sessionId":"s","status":"paused"}"#).unwrap();
        assert_eq!(info.status, SessionStatus::Unknown);
        assert!(!info.is_active());
    }

    #[test]
    fn test_session_info_active() {
        let info: SessionInfo = serde_json::from_str(
            r#"{"sessionId":"s1","status":"active","cursor":"12","conversationId":"c","startedAt":1,"lastActivity":2}"#,
        )
        .unwrap();
        assert!(info.is_active());
        assert_eq!(info.cursor.as_deref(), Some("12"));
        assert_eq!(info.last_activity, Some(2));
    }

    #[test]
    fn test_history_message_null_citations() {
        let msg: HistoryMessage =
            serde_json::from_str(r#"{"id":"m1","content":"hi","type":"AI_GENERATED","citations":null}"#)
                .unwrap();
        assert_eq!(msg.message_type.as_deref(), Some("AI_GENERATED"));
        let outcome = msg.into_outcome();
        assert_eq!(outcome.message, "hi");
        assert!(outcome.citations.is_empty());
    }

    #[test]
    fn test_tool_call_ignores_unknown_fields() {
        let call: ToolCall = serde_json::from_str(
            r#"{"call_id":"1","tool_name":"search","extra":42,"tool_call_details":{"q":"x"}}"#,
        )
        .unwrap();
        assert_eq!(call.tool_name.as_deref(), Some("search"));
        assert_eq!(call.tool_call_details["q"], "x");
        assert!(call.event_type.is_none());
    }

    #[test]
    fn test_resume_failure_reasons() {
        assert_eq!(ResumeFailure::SessionNotFound.as_str(), "session_not_found");
        assert_eq!(ResumeFailure::NetworkError.to_string(), "network_error");
    }
}
