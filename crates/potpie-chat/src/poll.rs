//! Polling fallback for when streaming gives up

use crate::{service::ChatService, types::StreamOutcome};
use std::time::Duration;
use tokio::time::Instant;

impl ChatService {
    /// Poll until the background task finishes, then return the newest message.
    ///
    /// Returns `None` if the task is still running after `timeout`; the last
    /// sleep is cut short so the deadline is not overshot. Errors
    /// inside an iteration are logged and the loop carries on.
    pub async fn poll_for_final_message(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Option<StreamOutcome> {
        let started = Instant::now();
        let mut checks = 0u32;

        while started.elapsed() < timeout {
            checks += 1;
            let status = self.check_background_task_status(conversation_id).await;

            if status.is_active {
                tracing::debug!(conversation_id, checks, "background task still running");
            } else {
                match self.api.messages(conversation_id, 0, 1).await {
                    Ok(messages) => match messages.into_iter().next() {
                        Some(latest) => {
                            tracing::info!(conversation_id, checks, "recovered final message by polling");
                            return Some(latest.into_outcome());
                        }
                        None => {
                            tracing::debug!(conversation_id, "task finished but history is empty");
                        }
                    },
                    Err(e) => {
                        tracing::error!(conversation_id, error = %e, "polling for final message failed");
                    }
                }
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(self.poll_config.interval.min(remaining)).await;
        }

        tracing::warn!(
            conversation_id,
            checks,
            "background task still running after {:?}, giving up",
            timeout
        );
        None
    }
}
