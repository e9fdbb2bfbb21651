//! Built-in subscriber rendering system topics through `tracing`.

use async_trait::async_trait;

use crate::bus::{topics, Message, MessageHandler};

/// Logs system-topic traffic in a human-readable form.
///
/// Attach it with [`MessageBus::subscribe_handler`] (the launcher builder
/// does this for `system/registry`, `system/health` and `system/errors`
/// when system logging is enabled).
///
/// [`MessageBus::subscribe_handler`]: crate::bus::MessageBus::subscribe_handler
#[derive(Debug, Default)]
pub struct LogSubscriber;

impl LogSubscriber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for LogSubscriber {
    async fn on_message(&self, message: &Message) {
        match message.topic.as_ref() {
            topics::REGISTRY => {
                if let Some(p) = topics::from_message::<topics::StatusPayload>(message) {
                    tracing::info!(
                        node = %p.node,
                        status = %p.status,
                        restarts = p.restart_count,
                        "status"
                    );
                }
            }
            topics::HEALTH => {
                if let Some(p) = topics::from_message::<topics::HealthPayload>(message) {
                    if p.healthy {
                        tracing::debug!(score = p.score, "health");
                    } else {
                        tracing::warn!(score = p.score, degraded = ?p.degraded, "health degraded");
                    }
                }
            }
            topics::ERRORS => {
                if let Some(p) = topics::from_message::<topics::ErrorPayload>(message) {
                    tracing::error!(
                        id = p.id,
                        node = %p.node,
                        kind = %p.kind,
                        severity = %p.severity,
                        action = %p.action,
                        "{}", p.message
                    );
                }
            }
            other => {
                tracing::debug!(topic = other, source = %message.source, "message");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
