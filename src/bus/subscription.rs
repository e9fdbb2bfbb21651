//! Subscriber-side machinery: streams, handlers, options.
//!
//! Every subscription owns a bounded queue fed by the bus delivery loop.
//! Consumers drain it one of two ways:
//!
//! - **Pull**: `subscribe()` returns a [`MessageStream`] the caller drains.
//! - **Push**: `subscribe_handler()` spawns a dedicated worker that drains
//!   the queue and invokes a [`MessageHandler`] per message. Panics inside
//!   handlers are caught so a misbehaving subscriber never takes down the
//!   worker of another (isolation).
//!
//! On queue overflow the delivery for that subscriber is dropped and
//! counted; other subscribers are unaffected.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::message::Message;

/// Predicate applied before a message is queued for a subscriber.
pub type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Options controlling a new subscription.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Bounded queue size for this subscriber; `None` uses the bus default.
    pub queue_capacity: Option<usize>,
    /// Skip the retained-message replay on subscribe.
    pub skip_replay: bool,
    /// Optional filter predicate; messages failing it are never queued.
    pub filter: Option<MessageFilter>,
}

impl SubscribeOptions {
    /// Options with a filter predicate set.
    pub fn filtered(filter: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        Self {
            filter: Some(Arc::new(filter)),
            ..Self::default()
        }
    }

    /// Options that skip retained-message replay.
    pub fn without_replay() -> Self {
        Self {
            skip_replay: true,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("queue_capacity", &self.queue_capacity)
            .field("skip_replay", &self.skip_replay)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Contract for push-style subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations may be
/// slow (I/O, batching); they never block the delivery loop or other
/// subscribers.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles a single message.
    async fn on_message(&self, message: &Message);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Pull-style receiving end of a subscription.
///
/// Dropping the stream closes the subscription's queue; the bus removes the
/// dead subscription on its next delivery to the topic.
pub struct MessageStream {
    pub(crate) rx: mpsc::Receiver<Arc<Message>>,
}

impl MessageStream {
    /// Receives the next message, or `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.rx.try_recv().ok()
    }
}

/// Bus-side record of one live subscription.
pub(crate) struct Subscription {
    /// Owning node.
    pub node: Arc<str>,
    /// Sending end of the subscriber's bounded queue.
    pub tx: mpsc::Sender<Arc<Message>>,
    /// Optional filter predicate.
    pub filter: Option<MessageFilter>,
    /// When the subscription was created.
    #[allow(dead_code)]
    pub created_at: SystemTime,
}

impl Subscription {
    /// True when the message passes this subscription's filter.
    pub fn accepts(&self, message: &Message) -> bool {
        match &self.filter {
            Some(f) => f(message),
            None => true,
        }
    }
}
