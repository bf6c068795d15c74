//! HTTP binding of the conversation service API

use crate::{
    api::{ByteStream, ConversationApi},
    error::{Error, Result},
    types::{HistoryMessage, MessagePayload, SessionId, SessionInfo, StreamRequest, TaskStatus},
};
use async_stream::stream;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use std::collections::HashMap;

/// Request configuration injected into the HTTP client
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Service root, e.g. `https://api.potpie.ai`
    pub base_url: String,
    /// Extra headers sent with every request (auth, tracing ids)
    pub headers: HashMap<String, String>,
    /// Overrides the default `User-Agent`
    pub user_agent: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Authenticate with a bearer token
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.with_header("Authorization", value)
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|e| Error::InvalidConfig(format!("header name {:?}: {}", key, e)))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| Error::InvalidConfig(format!("header {:?}: {}", key, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Conversation service client over `reqwest`
pub struct HttpConversationApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpConversationApi {
    /// Build a client from configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = config.base_url.trim();
        if base.is_empty() {
            return Err(Error::InvalidConfig("base_url is empty".to_string()));
        }
        let base_url = Url::parse(base)
            .map_err(|e| Error::InvalidConfig(format!("base_url {:?}: {}", base, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!("base_url {:?} is not a base URL", base)));
        }

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("potpie-chat/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::Client::builder()
            .default_headers(config.header_map()?)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// `{base}/api/v1/conversations/{id}/{tail...}` with every segment
    /// percent-encoded. An empty last segment gives a trailing slash.
    fn conversation_url(&self, conversation_id: &str, tail: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "conversations", conversation_id])
                .extend(tail);
        }
        url
    }

    fn request_for(&self, request: &StreamRequest) -> Result<reqwest::RequestBuilder> {
        let builder = match request {
            StreamRequest::Message {
                conversation_id,
                session_id,
                payload,
            } => self
                .client
                .post(self.conversation_url(conversation_id, &["message", ""]))
                .multipart(message_form(session_id, payload)?),
            StreamRequest::Regenerate {
                conversation_id,
                nodes,
            } => self
                .client
                .post(self.conversation_url(conversation_id, &["regenerate", ""]))
                .json(&serde_json::json!({ "node_ids": nodes })),
            StreamRequest::Resume {
                conversation_id,
                session_id,
            } => self
                .client
                .post(self.conversation_url(conversation_id, &["resume", session_id.as_str()])),
        };
        Ok(builder)
    }
}

fn message_form(session_id: &SessionId, payload: &MessagePayload) -> Result<Form> {
    let mut form = Form::new()
        .text("content", payload.content.clone())
        .text("node_ids", serde_json::to_string(&payload.nodes)?)
        .text("session_id", session_id.to_string());

    if let Some(ids) = &payload.attachment_ids {
        form = form.text("attachment_ids", serde_json::to_string(ids)?);
    }

    for image in &payload.images {
        let part = Part::bytes(image.data.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)?;
        form = form.part("images", part);
    }

    Ok(form)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::status(status.as_u16(), body))
}

fn body_stream(mut response: reqwest::Response) -> ByteStream {
    Box::pin(stream! {
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => yield Ok(bytes.to_vec()),
                Ok(None) => break,
                Err(e) => {
                    yield Err(Error::Stream(e.to_string()));
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn active_session(&self, conversation_id: &str) -> Result<Option<SessionInfo>> {
        let url = self.conversation_url(conversation_id, &["active-session"]);
        let response = self.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn task_status(&self, conversation_id: &str) -> Result<TaskStatus> {
        let url = self.conversation_url(conversation_id, &["task-status"]);
        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        let builder = self.request_for(request)?;
        tracing::debug!(
            conversation_id = request.conversation_id(),
            "opening conversation stream"
        );
        let response = check_status(builder.send().await?).await?;
        Ok(body_stream(response))
    }

    async fn messages(
        &self,
        conversation_id: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let url = self.conversation_url(conversation_id, &["messages", ""]);
        let response = self
            .client
            .get(url)
            .query(&[("start", start), ("limit", limit)])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn stop(&self, conversation_id: &str) -> Result<()> {
        let url = self.conversation_url(conversation_id, &["stop", ""]);
        check_status(self.client.post(url).send().await?).await?;
        Ok(())
    }
}
