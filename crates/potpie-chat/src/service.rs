//! Top-level streaming client

use crate::{
    api::ConversationApi,
    decode,
    error::{Error, Result},
    retry::{PollConfig, RetryConfig},
    session::generate_session_id,
    types::{
        ContextNode, HistoryMessage, MessagePayload, SessionId, SessionInfo, StreamOutcome,
        StreamRequest, StreamUpdate, TaskStatus,
    },
};
use std::sync::Arc;

/// Streaming chat client for one user.
///
/// Sending a message goes through bounded retries and then falls back to
/// polling conversation history; only the failure of both reaches the
/// caller, as [`Error::StreamFailed`].
///
/// There is no cancellation: dropping the returned future abandons the call.
pub struct ChatService {
    pub(crate) api: Arc<dyn ConversationApi>,
    user_id: String,
    retry_config: RetryConfig,
    pub(crate) poll_config: PollConfig,
}

impl ChatService {
    /// Create a client for `user_id` over the given transport
    pub fn new(api: Arc<dyn ConversationApi>, user_id: impl Into<String>) -> Self {
        Self {
            api,
            user_id: user_id.into(),
            retry_config: RetryConfig::default(),
            poll_config: PollConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Set fallback polling configuration
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poll_config = config;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Session id for a turn of `conversation_id` by this user
    pub fn session_id_for(&self, conversation_id: &str, pivot_message_id: Option<&str>) -> SessionId {
        generate_session_id(conversation_id, &self.user_id, pivot_message_id)
    }

    /// Look up a running session. A missing session is `Ok(None)`; any
    /// other failure is returned as is.
    pub async fn detect_active_session(&self, conversation_id: &str) -> Result<Option<SessionInfo>> {
        self.api.active_session(conversation_id).await
    }

    /// Background task status, reporting "inactive" when it cannot be fetched
    pub async fn check_background_task_status(&self, conversation_id: &str) -> TaskStatus {
        match self.api.task_status(conversation_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    error = %e,
                    "task status check failed, assuming no active task"
                );
                TaskStatus::inactive(conversation_id)
            }
        }
    }

    /// One streaming attempt with a fresh accumulator
    pub async fn stream<F>(&self, request: &StreamRequest, on_update: &mut F) -> Result<StreamOutcome>
    where
        F: FnMut(&StreamUpdate),
    {
        let stream = self.api.open_stream(request).await?;
        decode::drain(stream, on_update).await
    }

    /// Stream with exponential backoff between whole-stream retries.
    ///
    /// After `max_retries` retries the last error is returned.
    pub async fn stream_with_retry<F>(
        &self,
        request: &StreamRequest,
        on_update: &mut F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&StreamUpdate),
    {
        let max_retries = self.retry_config.max_retries;
        let mut retry_count = 0u32;

        loop {
            match self.stream(request, on_update).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > max_retries {
                        tracing::error!(
                            conversation_id = request.conversation_id(),
                            "Stream failed after {} attempts: {}",
                            retry_count,
                            e
                        );
                        return Err(e);
                    }

                    let delay = self.retry_config.delay_before_retry(retry_count);
                    tracing::warn!(
                        conversation_id = request.conversation_id(),
                        transient = e.is_transient(),
                        "Stream failed (attempt {}/{}): {}. Retrying in {:?}...",
                        retry_count,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Send a message and stream the reply.
    ///
    /// Uses the payload's session id if set, otherwise allocates one from
    /// the current time.
    pub async fn stream_message<F>(
        &self,
        conversation_id: &str,
        mut payload: MessagePayload,
        on_update: &mut F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&StreamUpdate),
    {
        let session_id = payload
            .session_id
            .take()
            .unwrap_or_else(|| self.session_id_for(conversation_id, None));

        let request = StreamRequest::Message {
            conversation_id: conversation_id.to_string(),
            session_id,
            payload,
        };
        self.stream_or_poll(&request, on_update).await
    }

    /// Regenerate the last reply, with the same recovery as [`Self::stream_message`]
    pub async fn regenerate_message<F>(
        &self,
        conversation_id: &str,
        nodes: Vec<ContextNode>,
        on_update: &mut F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&StreamUpdate),
    {
        let request = StreamRequest::Regenerate {
            conversation_id: conversation_id.to_string(),
            nodes,
        };
        self.stream_or_poll(&request, on_update).await
    }

    async fn stream_or_poll<F>(&self, request: &StreamRequest, on_update: &mut F) -> Result<StreamOutcome>
    where
        F: FnMut(&StreamUpdate),
    {
        let error = match self.stream_with_retry(request, on_update).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };

        let conversation_id = request.conversation_id();
        tracing::warn!(
            conversation_id,
            "Streaming gave up ({}), polling for the final message",
            error
        );

        match self
            .poll_for_final_message(conversation_id, self.poll_config.timeout)
            .await
        {
            Some(outcome) => {
                on_update(&StreamUpdate {
                    message: outcome.message.clone(),
                    tool_calls: Vec::new(),
                    citations: outcome.citations.clone(),
                });
                Ok(outcome)
            }
            None => Err(Error::StreamFailed),
        }
    }

    /// Page through conversation history
    pub async fn load_messages(
        &self,
        conversation_id: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        self.api.messages(conversation_id, start, limit).await
    }

    /// Stop the conversation's running background task
    pub async fn stop_message(&self, conversation_id: &str) -> Result<()> {
        self.api.stop(conversation_id).await
    }
}
