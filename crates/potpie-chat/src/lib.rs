//! potpie-chat: resilient streaming client for the Potpie conversation service
//!
//! Sends messages to a conversation and streams the agent's reply, retrying
//! with exponential backoff and falling back to history polling when the
//! stream cannot be established. Sessions that are already running can be
//! reattached after a reconnect.

pub mod api;
pub mod decode;
pub mod error;
pub mod http;
mod poll;
mod resume;
pub mod retry;
pub mod service;
pub mod session;
#[cfg(test)]
mod testing;
pub mod types;

pub use api::{ByteStream, ConversationApi};
pub use error::{Error, Result};
pub use http::{ClientConfig, HttpConversationApi};
pub use retry::{PollConfig, RetryConfig};
pub use service::ChatService;
pub use session::generate_session_id;
pub use types::*;
