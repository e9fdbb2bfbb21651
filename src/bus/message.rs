//! Messages carried by the bus.
//!
//! A [`Message`] is immutable once published: the bus stores it behind an
//! `Arc` and every subscriber sees the same instance. Each message gets a
//! globally unique, monotonically increasing id at construction time.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{Message, Priority};
//!
//! let msg = Message::new("sensors/temp", "probe-1", serde_json::json!({"c": 21.5}))
//!     .with_priority(Priority::High)
//!     .with_ttl(Duration::from_secs(5));
//!
//! assert_eq!(msg.topic.as_ref(), "sensors/temp");
//! assert_eq!(msg.priority, Priority::High);
//! assert!(msg.id > 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Global counter for message ids.
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Delivery priority of a message.
///
/// Ordering is total: `Low < Normal < High < Critical`. The bus dequeues
/// higher priorities first and preserves FIFO order within one priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background traffic.
    Low,
    /// Regular traffic (default).
    #[default]
    Normal,
    /// Time-sensitive traffic, dequeued ahead of Normal/Low.
    High,
    /// Always dequeued first.
    Critical,
}

/// A published message.
///
/// - `id`: globally unique, monotonically increasing
/// - `at`: wall-clock publish timestamp (TTL is measured from it)
/// - `payload`: opaque JSON value; the bus never inspects it
/// - `reply_to`: private reply topic set by `request()`
#[derive(Clone, Debug)]
pub struct Message {
    /// Globally unique message id.
    pub id: u64,
    /// Destination topic.
    pub topic: Arc<str>,
    /// Name of the publishing node.
    pub source: Arc<str>,
    /// Opaque payload.
    pub payload: Value,
    /// Wall-clock creation timestamp.
    pub at: SystemTime,
    /// Delivery priority.
    pub priority: Priority,
    /// Optional time-to-live, measured from `at`.
    pub ttl: Option<Duration>,
    /// Reply topic for request/response exchanges.
    pub reply_to: Option<Arc<str>>,
}

impl Message {
    /// Creates a new message with the next global id and current timestamp.
    pub fn new(topic: impl Into<Arc<str>>, source: impl Into<Arc<str>>, payload: Value) -> Self {
        Self {
            id: MESSAGE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            topic: topic.into(),
            source: source.into(),
            payload,
            at: SystemTime::now(),
            priority: Priority::Normal,
            ttl: None,
            reply_to: None,
        }
    }

    /// Sets the delivery priority.
    #[inline]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets a time-to-live measured from the creation timestamp.
    #[inline]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the reply topic for request/response exchanges.
    #[inline]
    pub fn with_reply_to(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.reply_to = Some(topic.into());
        self
    }

    /// True when the message's TTL has elapsed relative to `now`.
    ///
    /// A message without a TTL never expires.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match now.duration_since(self.at) {
                Ok(age) => age > ttl,
                // Clock went backwards relative to creation; treat as fresh.
                Err(_) => false,
            },
        }
    }

    /// True when topic and source are both non-empty.
    pub(crate) fn is_valid(&self) -> bool {
        !self.topic.is_empty() && !self.source.is_empty()
    }
}
