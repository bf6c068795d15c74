//! Reattaching to a session that is already streaming on the service

use crate::{
    decode,
    error::Result,
    service::ChatService,
    types::{ResumeFailure, ResumeOutcome, SessionId, StreamOutcome, StreamRequest, StreamUpdate},
};

impl ChatService {
    /// Replay a running session's stream from the point of reconnection.
    ///
    /// Never fails: a vanished session is [`ResumeFailure::SessionNotFound`],
    /// anything else that goes wrong is [`ResumeFailure::NetworkError`].
    pub async fn resume_active_session<F>(
        &self,
        conversation_id: &str,
        session_id: &SessionId,
        on_update: &mut F,
    ) -> ResumeOutcome
    where
        F: FnMut(&StreamUpdate),
    {
        let request = StreamRequest::Resume {
            conversation_id: conversation_id.to_string(),
            session_id: session_id.clone(),
        };

        let stream = match self.api.open_stream(&request).await {
            Ok(stream) => stream,
            Err(e) if e.is_not_found() => {
                tracing::info!(conversation_id, %session_id, "session no longer exists");
                return ResumeOutcome::Failed(ResumeFailure::SessionNotFound);
            }
            Err(e) => {
                tracing::warn!(conversation_id, %session_id, error = %e, "failed to resume session");
                return ResumeOutcome::Failed(ResumeFailure::NetworkError);
            }
        };

        match decode::drain(stream, on_update).await {
            Ok(outcome) => ResumeOutcome::Resumed(outcome),
            Err(e) => {
                tracing::warn!(conversation_id, %session_id, error = %e, "resumed stream broke off");
                ResumeOutcome::Failed(ResumeFailure::NetworkError)
            }
        }
    }

    /// Attach to the conversation's active session after a reconnect.
    ///
    /// `Ok(None)` means there was nothing to attach to, or the session could
    /// not be resumed and the caller should start fresh.
    pub async fn reattach<F>(&self, conversation_id: &str, on_update: &mut F) -> Result<Option<StreamOutcome>>
    where
        F: FnMut(&StreamUpdate),
    {
        let Some(info) = self.detect_active_session(conversation_id).await? else {
            return Ok(None);
        };
        if !info.is_active() {
            tracing::debug!(conversation_id, status = ?info.status, "session is not active");
            return Ok(None);
        }

        let session_id = SessionId::new(info.session_id);
        match self
            .resume_active_session(conversation_id, &session_id, on_update)
            .await
        {
            ResumeOutcome::Resumed(outcome) => Ok(Some(outcome)),
            ResumeOutcome::Failed(reason) => {
                tracing::info!(conversation_id, %reason, "could not resume, start a new stream");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        service::ChatService,
        testing::{FakeApi, Scripted},
        types::{ResumeFailure, ResumeOutcome, SessionId, SessionInfo, SessionStatus, StreamRequest, StreamUpdate},
    };
    use std::sync::Arc;

    fn session(status: SessionStatus) -> SessionInfo {
        SessionInfo {
            session_id: "conversation:user1:m1".to_string(),
            status,
            cursor: None,
            conversation_id: Some("c1".to_string()),
            started_at: None,
            last_activity: None,
        }
    }

    fn sid() -> SessionId {
        SessionId::new("conversation:user1:m1")
    }

    #[tokio::test]
    async fn test_resume_decodes_like_a_fresh_stream() {
        let api = Arc::new(FakeApi::new().with_streams(vec![Scripted::chunks(&[
            r#"{"message":"Hel"}{"tool_calls":[{"tool_name":"grep"}]}"#,
            r#"{"message":"lo \\u2764","citations":["a"]}{"citations":["b"]}"#,
        ])]));
        let chat = ChatService::new(api.clone(), "user1");

        let mut updates = 0;
        let mut tool_calls = 0;
        let outcome = chat
            .resume_active_session("c1", &sid(), &mut |u: &StreamUpdate| {
                updates += 1;
                tool_calls = u.tool_calls.len();
            })
            .await;

        match outcome {
            ResumeOutcome::Resumed(outcome) => {
                assert_eq!(outcome.message, "Hello \u{2764}");
                assert_eq!(outcome.citations, vec!["b"]);
            }
            other => panic!("expected resumed, got {:?}", other),
        }
        assert_eq!(updates, 5);
        assert_eq!(tool_calls, 1);
        assert!(matches!(
            api.stream_requests().first(),
            Some(StreamRequest::Resume { session_id, .. }) if session_id.as_str() == "conversation:user1:m1"
        ));
    }

    #[tokio::test]
    async fn test_resume_missing_session() {
        let api = Arc::new(FakeApi::new().with_streams(vec![Scripted::Status(404)]));
        let chat = ChatService::new(api, "user1");

        let outcome = chat.resume_active_session("c1", &sid(), &mut |_: &StreamUpdate| {}).await;
        assert_eq!(outcome, ResumeOutcome::Failed(ResumeFailure::SessionNotFound));
    }

    #[tokio::test]
    async fn test_resume_server_error_is_network_error() {
        let api = Arc::new(FakeApi::new().with_streams(vec![Scripted::Status(500)]));
        let chat = ChatService::new(api, "user1");

        let outcome = chat.resume_active_session("c1", &sid(), &mut |_: &StreamUpdate| {}).await;
        assert_eq!(outcome, ResumeOutcome::Failed(ResumeFailure::NetworkError));
    }

    #[tokio::test]
    async fn test_resume_broken_stream_is_network_error() {
        let api = Arc::new(FakeApi::new().with_streams(vec![Scripted::broken(&[r#"{"message":"par"}"#])]));
        let chat = ChatService::new(api, "user1");

        let mut seen = Vec::new();
        let outcome = chat
            .resume_active_session("c1", &sid(), &mut |u: &StreamUpdate| seen.push(u.message.clone()))
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome, ResumeOutcome::Failed(ResumeFailure::NetworkError));
        assert_eq!(seen, vec!["par"]);
    }

    #[tokio::test]
    async fn test_reattach_without_session() {
        let api = Arc::new(FakeApi::new());
        let chat = ChatService::new(api.clone(), "user1");

        let outcome = chat.reattach("c1", &mut |_: &StreamUpdate| {}).await.unwrap();
        assert!(outcome.is_none());
        assert!(api.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn test_reattach_skips_idle_session() {
        let api = Arc::new(FakeApi::new().with_session(session(SessionStatus::Idle)));
        let chat = ChatService::new(api.clone(), "user1");

        let outcome = chat.reattach("c1", &mut |_: &StreamUpdate| {}).await.unwrap();
        assert!(outcome.is_none());
        assert!(api.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn test_reattach_resumes_active_session() {
        let api = Arc::new(
            FakeApi::new()
                .with_session(session(SessionStatus::Active))
                .with_streams(vec![Scripted::chunks(&[r#"{"message":"still going"}"#])]),
        );
        let chat = ChatService::new(api, "user1");

        let outcome = chat.reattach("c1", &mut |_: &StreamUpdate| {}).await.unwrap();
        assert_eq!(outcome.map(|o| o.message), Some("still going".to_string()));
    }

    #[tokio::test]
    async fn test_reattach_gone_session_is_none() {
        let api = Arc::new(
            FakeApi::new()
                .with_session(session(SessionStatus::Active))
                .with_streams(vec![Scripted::Status(404)]),
        );
        let chat = ChatService::new(api, "user1");

        let outcome = chat.reattach("c1", &mut |_: &StreamUpdate| {}).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_reattach_lookup_error_propagates() {
        let api = Arc::new(FakeApi::new().with_session_error(503));
        let chat = ChatService::new(api, "user1");

        assert!(chat.reattach("c1", &mut |_: &StreamUpdate| {}).await.is_err());
    }
}
