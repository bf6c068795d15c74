//! Transport abstraction over the conversation service

use crate::{
    error::Result,
    types::{HistoryMessage, SessionInfo, StreamRequest, TaskStatus},
};
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Raw reads from a streamed response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Operations the client needs from the remote conversation service
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Look up the conversation's active session; `None` when there is none
    async fn active_session(&self, conversation_id: &str) -> Result<Option<SessionInfo>>;

    /// Fetch the background task status
    async fn task_status(&self, conversation_id: &str) -> Result<TaskStatus>;

    /// Open a streamed endpoint. Non-2xx responses are errors.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream>;

    /// Fetch conversation history, newest first from `start = 0`
    async fn messages(
        &self,
        conversation_id: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;

    /// Ask the service to stop the running background task
    async fn stop(&self, conversation_id: &str) -> Result<()>;
}
