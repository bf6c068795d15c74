//! Scripted in-memory conversation service for unit tests

use crate::{
    api::{ByteStream, ConversationApi},
    error::{Error, Result},
    types::{HistoryMessage, SessionInfo, StreamRequest, TaskStatus},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::time::Instant;

/// What the next `open_stream` call produces
pub(crate) enum Scripted {
    /// Body delivered as these reads
    Chunks(Vec<&'static str>),
    /// These reads, then a read error
    Broken(Vec<&'static str>),
    /// Non-2xx response
    Status(u16),
}

impl Scripted {
    pub(crate) fn chunks(chunks: &[&'static str]) -> Self {
        Scripted::Chunks(chunks.to_vec())
    }

    pub(crate) fn broken(chunks: &[&'static str]) -> Self {
        Scripted::Broken(chunks.to_vec())
    }
}

/// What the next `task_status` call produces
#[derive(Clone, Copy)]
pub(crate) enum StatusScript {
    Active,
    Inactive,
    Fail,
}

pub(crate) fn history_message(content: &str, citations: &[&str]) -> HistoryMessage {
    HistoryMessage {
        id: Some("m1".to_string()),
        content: content.to_string(),
        message_type: Some("AI_GENERATED".to_string()),
        citations: Some(citations.iter().map(|c| c.to_string()).collect()),
        created_at: None,
    }
}

/// A mock service that plays back scripts and records calls.
///
/// Once the stream script runs out every call gets a 500; once the status
/// script runs out every call gets `status_default`.
pub(crate) struct FakeApi {
    streams: Mutex<VecDeque<Scripted>>,
    statuses: Mutex<VecDeque<StatusScript>>,
    status_default: StatusScript,
    history: Mutex<Vec<HistoryMessage>>,
    history_failures: Mutex<usize>,
    session: Option<SessionInfo>,
    session_error: Option<u16>,
    stream_calls: Mutex<Vec<(StreamRequest, Instant)>>,
    status_calls: Mutex<Vec<Instant>>,
    stopped: Mutex<Vec<String>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_default: StatusScript::Inactive,
            history: Mutex::new(Vec::new()),
            history_failures: Mutex::new(0),
            session: None,
            session_error: None,
            stream_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_streams(self, streams: Vec<Scripted>) -> Self {
        *self.streams.lock() = streams.into();
        self
    }

    pub(crate) fn with_statuses(mut self, statuses: Vec<StatusScript>, default: StatusScript) -> Self {
        *self.statuses.lock() = statuses.into();
        self.status_default = default;
        self
    }

    pub(crate) fn with_history(self, history: Vec<HistoryMessage>) -> Self {
        *self.history.lock() = history;
        self
    }

    /// Fail the first `count` history fetches
    pub(crate) fn with_history_failures(self, count: usize) -> Self {
        *self.history_failures.lock() = count;
        self
    }

    pub(crate) fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn with_session_error(mut self, status: u16) -> Self {
        self.session_error = Some(status);
        self
    }

    pub(crate) fn stream_requests(&self) -> Vec<StreamRequest> {
        self.stream_calls.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    pub(crate) fn stream_times(&self) -> Vec<Instant> {
        self.stream_calls.lock().iter().map(|(_, t)| *t).collect()
    }

    pub(crate) fn status_times(&self) -> Vec<Instant> {
        self.status_calls.lock().clone()
    }

    pub(crate) fn stopped(&self) -> Vec<String> {
        self.stopped.lock().clone()
    }
}

fn byte_stream(chunks: Vec<&'static str>, broken: bool) -> ByteStream {
    let mut items: Vec<Result<Vec<u8>>> = chunks
        .into_iter()
        .map(|c| Ok(c.as_bytes().to_vec()))
        .collect();
    if broken {
        items.push(Err(Error::Stream("connection reset".to_string())));
    }
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl ConversationApi for FakeApi {
    async fn active_session(&self, _conversation_id: &str) -> Result<Option<SessionInfo>> {
        if let Some(status) = self.session_error {
            return Err(Error::status(status, "session lookup failed"));
        }
        Ok(self.session.clone())
    }

    async fn task_status(&self, conversation_id: &str) -> Result<TaskStatus> {
        self.status_calls.lock().push(Instant::now());
        let script = self.statuses.lock().pop_front().unwrap_or(self.status_default);
        match script {
            StatusScript::Active => Ok(TaskStatus {
                is_active: true,
                ..TaskStatus::inactive(conversation_id)
            }),
            StatusScript::Inactive => Ok(TaskStatus::inactive(conversation_id)),
            StatusScript::Fail => Err(Error::Stream("status unreachable".to_string())),
        }
    }

    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        self.stream_calls.lock().push((request.clone(), Instant::now()));
        let script = self.streams.lock().pop_front().unwrap_or(Scripted::Status(500));
        match script {
            Scripted::Chunks(chunks) => Ok(byte_stream(chunks, false)),
            Scripted::Broken(chunks) => Ok(byte_stream(chunks, true)),
            Scripted::Status(status) => Err(Error::status(status, "scripted failure")),
        }
    }

    async fn messages(&self, _conversation_id: &str, start: usize, limit: usize) -> Result<Vec<HistoryMessage>> {
        {
            let mut failures = self.history_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::status(502, "history unavailable"));
            }
        }
        Ok(self
            .history
            .lock()
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stop(&self, conversation_id: &str) -> Result<()> {
        self.stopped.lock().push(conversation_id.to_string());
        Ok(())
    }
}
