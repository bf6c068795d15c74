//! Session id allocation

use crate::types::SessionId;

/// Build the session id for one streaming turn.
///
/// Without a pivot message id the current time in milliseconds is used, so
/// repeated calls for the same user still differ.
pub fn generate_session_id(
    _conversation_id: &str,
    user_id: &str,
    pivot_message_id: Option<&str>,
) -> SessionId {
    let pivot = match pivot_message_id {
        Some(id) => id.to_string(),
        None => chrono::Utc::now().timestamp_millis().to_string(),
    };
    SessionId::new(format!("conversation:{}:{}", user_id, pivot))
}
