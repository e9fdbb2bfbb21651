//! The message bus: prioritized delivery queue, topic index, retention.
//!
//! [`MessageBus`] routes published messages to every live subscription on
//! the destination topic. Publishing is non-blocking for the caller: it
//! pushes onto a bounded priority queue and returns a `bool`. One dedicated
//! delivery loop drains the queue and fans out.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Delivery loop (one):
//!   node A ──┐
//!   node B ──┼── publish() ──► [priority queue] ──► pop (priority, FIFO)
//!   node C ──┘     (bounded,        │                    │
//!                   reject if full) │ Notify             ▼
//!                                   └─────────►  fan-out to topic subs
//!                                                  │ filter → try_send
//!                                                  │ (full = drop 1, counted)
//!                                                  ▼
//!                                            retention ring (late joiners)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; a full queue or an
//!   invalid message returns `false` and bumps a counter. No errors cross
//!   the bus boundary on this path.
//! - **Ordering**: within one topic, delivery is priority-then-FIFO. A
//!   CRITICAL message enqueued after a NORMAL one is still delivered first
//!   if both are queued when the loop drains. No ordering across topics.
//! - **Isolation**: a slow or dead subscriber loses only its own deliveries.
//! - **Lifecycle**: explicit `new → start(token) → cancel → drop`; there is
//!   no global bus instance.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::error::BusError;

use super::message::{Message, Priority};
use super::subscription::{MessageHandler, MessageStream, SubscribeOptions, Subscription};
use super::topics::REPLY_PREFIX;

/// Queue entry ordered by `(priority desc, enqueue sequence asc)`.
struct Queued {
    msg: Arc<Message>,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins; within a priority, lower seq
        // (earlier enqueue) wins.
        self.msg
            .priority
            .cmp(&other.msg.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-topic state: live subscriptions plus the retained ring.
#[derive(Default)]
struct Topic {
    subs: Vec<Subscription>,
    retained: VecDeque<Arc<Message>>,
}

struct BusState {
    queue: BinaryHeap<Queued>,
    topics: HashMap<Arc<str>, Topic>,
}

struct BusInner {
    cfg: BusConfig,
    state: Mutex<BusState>,
    notify: Notify,
    started: AtomicBool,
    enqueue_seq: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    rejected_invalid: AtomicU64,
    rejected_full: AtomicU64,
    expired: AtomicU64,
    dropped_subscriber: AtomicU64,
}

/// Snapshot of bus counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Messages accepted by `publish()`.
    pub published: u64,
    /// Successful placements onto subscriber queues.
    pub delivered: u64,
    /// Publishes rejected for an empty topic or source.
    pub rejected_invalid: u64,
    /// Publishes rejected because the delivery queue was full.
    pub rejected_full: u64,
    /// Messages dropped because their TTL elapsed (at publish or dequeue).
    pub expired: u64,
    /// Single deliveries dropped because a subscriber queue was full.
    pub dropped_subscriber: u64,
}

/// Priority- and TTL-aware publish/subscribe bus.
///
/// Cheap to clone; clones share the same queue, topic index, and counters.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Creates a bus with the given configuration. Delivery does not begin
    /// until [`start`](Self::start) is called.
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                cfg,
                state: Mutex::new(BusState {
                    queue: BinaryHeap::new(),
                    topics: HashMap::new(),
                }),
                notify: Notify::new(),
                started: AtomicBool::new(false),
                enqueue_seq: AtomicU64::new(0),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                rejected_invalid: AtomicU64::new(0),
                rejected_full: AtomicU64::new(0),
                expired: AtomicU64::new(0),
                dropped_subscriber: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns the delivery loop. Idempotent; the loop exits within one
    /// iteration of `token` being cancelled.
    pub fn start(&self, token: CancellationToken) {
        if self.inner.started.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let bus = self.clone();
        tokio::spawn(async move {
            loop {
                while bus.deliver_next() {}
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = bus.inner.notify.notified() => {}
                }
            }
            tracing::debug!("bus delivery loop stopped");
        });
    }

    /// Publishes a message.
    ///
    /// Returns `false` (and bumps the matching counter) when the topic or
    /// source is empty, the TTL has already elapsed relative to the
    /// message's timestamp, or the delivery queue is full. Never blocks.
    pub fn publish(&self, msg: Message) -> bool {
        if !msg.is_valid() {
            self.inner
                .rejected_invalid
                .fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }
        if msg.is_expired(SystemTime::now()) {
            self.inner.expired.fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }

        {
            let mut state = self.lock_state();
            if state.queue.len() >= self.inner.cfg.queue_capacity_clamped() {
                self.inner
                    .rejected_full
                    .fetch_add(1, AtomicOrdering::Relaxed);
                return false;
            }
            state.queue.push(Queued {
                msg: Arc::new(msg),
                seq: self.inner.enqueue_seq.fetch_add(1, AtomicOrdering::Relaxed),
            });
        }
        self.inner.published.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner.notify.notify_one();
        true
    }

    /// Registers a pull-style subscription and returns its stream.
    ///
    /// Unless [`SubscribeOptions::skip_replay`] is set, retained messages for
    /// the topic are replayed into the new subscriber's queue first.
    pub fn subscribe(&self, node: &str, topic: &str, opts: SubscribeOptions) -> MessageStream {
        let cap = opts
            .queue_capacity
            .unwrap_or(self.inner.cfg.subscriber_queue_capacity)
            .max(1);
        let (tx, rx) = mpsc::channel::<Arc<Message>>(cap);

        let sub = Subscription {
            node: Arc::from(node),
            tx,
            filter: opts.filter,
            created_at: SystemTime::now(),
        };

        let mut state = self.lock_state();
        let entry = state.topics.entry(Arc::from(topic)).or_default();
        if !opts.skip_replay {
            let now = SystemTime::now();
            for msg in &entry.retained {
                if msg.is_expired(now) || !sub.accepts(msg) {
                    continue;
                }
                if sub.tx.try_send(Arc::clone(msg)).is_ok() {
                    self.inner.delivered.fetch_add(1, AtomicOrdering::Relaxed);
                } else {
                    self.inner
                        .dropped_subscriber
                        .fetch_add(1, AtomicOrdering::Relaxed);
                }
            }
        }
        entry.subs.push(sub);

        MessageStream { rx }
    }

    /// Registers a push-style subscription driven by a dedicated worker.
    ///
    /// The worker invokes `handler` per message; panics inside the handler
    /// are caught and logged so one subscriber cannot poison delivery to
    /// others. The worker exits when the subscription is removed.
    pub fn subscribe_handler(
        &self,
        node: &str,
        topic: &str,
        opts: SubscribeOptions,
        handler: Arc<dyn MessageHandler>,
    ) {
        let mut stream = self.subscribe(node, topic, opts);
        tokio::spawn(async move {
            while let Some(msg) = stream.recv().await {
                let fut = handler.on_message(msg.as_ref());
                if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    tracing::error!(
                        handler = handler.name(),
                        "message handler panicked: {panic:?}"
                    );
                }
            }
        });
    }

    /// Removes the subscriptions `node` holds on `topic`.
    ///
    /// Returns `true` if at least one subscription was removed.
    pub fn unsubscribe(&self, node: &str, topic: &str) -> bool {
        let mut state = self.lock_state();
        let Some(entry) = state.topics.get_mut(topic) else {
            return false;
        };
        let before = entry.subs.len();
        entry.subs.retain(|s| s.node.as_ref() != node);
        let removed = before != entry.subs.len();
        if entry.subs.is_empty() && entry.retained.is_empty() {
            state.topics.remove(topic);
        }
        removed
    }

    /// Removes every subscription held by `node`, returning how many.
    pub fn unsubscribe_all(&self, node: &str) -> usize {
        let mut state = self.lock_state();
        let mut removed = 0;
        state.topics.retain(|_, entry| {
            let before = entry.subs.len();
            entry.subs.retain(|s| s.node.as_ref() != node);
            removed += before - entry.subs.len();
            !entry.subs.is_empty() || !entry.retained.is_empty()
        });
        removed
    }

    /// Synchronous request/response built from the pub/sub primitives.
    ///
    /// Creates a private reply topic, publishes the request with `reply_to`
    /// set, and waits up to `timeout` for a single reply. The reply
    /// subscription is torn down regardless of the outcome.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        source: &str,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        let reply_topic = format!(
            "{REPLY_PREFIX}/{source}/{}",
            self.inner.enqueue_seq.fetch_add(1, AtomicOrdering::Relaxed)
        );
        let mut stream = self.subscribe(
            source,
            &reply_topic,
            SubscribeOptions {
                queue_capacity: Some(8),
                skip_replay: true,
                filter: None,
            },
        );

        let msg = Message::new(topic, source, payload).with_reply_to(reply_topic.clone());
        if !self.publish(msg) {
            self.unsubscribe(source, &reply_topic);
            return Err(BusError::Rejected {
                reason: "publish rejected",
            });
        }

        let res = tokio::time::timeout(timeout, stream.recv()).await;
        self.unsubscribe(source, &reply_topic);

        match res {
            Ok(Some(reply)) => Ok((*reply).clone()),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::RequestTimeout { timeout }),
        }
    }

    /// Publishes a response to `request.reply_to`.
    ///
    /// Returns `false` when the request carries no reply topic or the
    /// publish itself is rejected.
    pub fn respond(&self, request: &Message, payload: Value, source: &str) -> bool {
        match &request.reply_to {
            Some(reply_to) => self.publish(
                Message::new(Arc::clone(reply_to), source, payload)
                    .with_priority(request.priority),
            ),
            None => false,
        }
    }

    /// Returns a snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(AtomicOrdering::Relaxed),
            delivered: self.inner.delivered.load(AtomicOrdering::Relaxed),
            rejected_invalid: self.inner.rejected_invalid.load(AtomicOrdering::Relaxed),
            rejected_full: self.inner.rejected_full.load(AtomicOrdering::Relaxed),
            expired: self.inner.expired.load(AtomicOrdering::Relaxed),
            dropped_subscriber: self.inner.dropped_subscriber.load(AtomicOrdering::Relaxed),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock_state()
            .topics
            .get(topic)
            .map(|t| t.subs.len())
            .unwrap_or(0)
    }

    /// Number of retained messages on `topic`.
    pub fn retained_count(&self, topic: &str) -> usize {
        self.lock_state()
            .topics
            .get(topic)
            .map(|t| t.retained.len())
            .unwrap_or(0)
    }

    /// Messages currently waiting in the delivery queue.
    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    // ---------------------------
    // Delivery
    // ---------------------------

    /// Pops and fans out one queued message. Returns `false` when the queue
    /// is empty.
    fn deliver_next(&self) -> bool {
        let mut state = self.lock_state();
        let Some(queued) = state.queue.pop() else {
            return false;
        };
        let msg = queued.msg;

        if msg.is_expired(SystemTime::now()) {
            self.inner.expired.fetch_add(1, AtomicOrdering::Relaxed);
            return true;
        }

        let entry = state.topics.entry(Arc::clone(&msg.topic)).or_default();

        // Fan out; a full or closed subscriber queue drops only that single
        // delivery. Closed subscriptions are pruned in place.
        entry.subs.retain(|sub| {
            if !sub.accepts(&msg) {
                return true;
            }
            match sub.tx.try_send(Arc::clone(&msg)) {
                Ok(()) => {
                    self.inner.delivered.fetch_add(1, AtomicOrdering::Relaxed);
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.inner
                        .dropped_subscriber
                        .fetch_add(1, AtomicOrdering::Relaxed);
                    tracing::warn!(
                        node = sub.node.as_ref(),
                        topic = msg.topic.as_ref(),
                        "subscriber queue full, delivery dropped"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        // Retention happens after fan-out so late joiners replay exactly
        // what live subscribers saw.
        let retention = self.inner.cfg.retention_per_topic;
        if retention > 0 {
            entry.retained.push_back(msg);
            while entry.retained.len() > retention {
                entry.retained.pop_front();
            }
        } else if entry.subs.is_empty() {
            let topic = Arc::clone(&msg.topic);
            state.topics.remove(topic.as_ref());
        }

        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn bus_with(cfg: BusConfig) -> (MessageBus, CancellationToken) {
        let bus = MessageBus::new(cfg);
        let token = CancellationToken::new();
        (bus, token)
    }

    fn started_bus() -> (MessageBus, CancellationToken) {
        let (bus, token) = bus_with(BusConfig::default());
        bus.start(token.clone());
        (bus, token)
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let (bus, _token) = started_bus();
        let mut stream = bus.subscribe("n1", "greetings", SubscribeOptions::default());

        assert!(bus.publish(Message::new("greetings", "n0", json!("hi"))));
        let msg = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("delivery within a second")
            .expect("stream open");
        assert_eq!(msg.payload, json!("hi"));
        assert_eq!(msg.source.as_ref(), "n0");
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected_with_counter() {
        let (bus, _token) = started_bus();
        assert!(!bus.publish(Message::new("", "n0", json!(1))));
        assert!(!bus.publish(Message::new("t", "", json!(1))));
        assert_eq!(bus.stats().rejected_invalid, 2);
    }

    #[tokio::test]
    async fn pre_expired_ttl_is_rejected() {
        let (bus, _token) = started_bus();
        let mut msg = Message::new("t", "n0", json!(1)).with_ttl(Duration::from_millis(1));
        msg.at = SystemTime::now() - Duration::from_secs(1);
        assert!(!bus.publish(msg));
        assert_eq!(bus.stats().expired, 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (bus, _token) = bus_with(BusConfig {
            queue_capacity: 2,
            ..BusConfig::default()
        });
        // Not started: nothing drains the queue.
        assert!(bus.publish(Message::new("t", "s", json!(1))));
        assert!(bus.publish(Message::new("t", "s", json!(2))));
        assert!(!bus.publish(Message::new("t", "s", json!(3))));
        assert_eq!(bus.stats().rejected_full, 1);
    }

    #[tokio::test]
    async fn ttl_expiring_in_queue_is_dropped_at_dequeue() {
        let (bus, token) = bus_with(BusConfig::default());
        let mut stream = bus.subscribe("n1", "t", SubscribeOptions::default());

        assert!(bus.publish(
            Message::new("t", "s", json!("stale")).with_ttl(Duration::from_millis(20))
        ));
        // The message expires while parked in the undrained queue.
        tokio::time::sleep(Duration::from_millis(80)).await;
        bus.start(token);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stream.try_recv().is_none());
        assert_eq!(bus.stats().expired, 1);
        assert_eq!(bus.stats().delivered, 0);
        // Expired messages never reach the retention ring either.
        assert_eq!(bus.retained_count("t"), 0);
    }

    #[tokio::test]
    async fn critical_overtakes_earlier_normal() {
        let (bus, token) = bus_with(BusConfig::default());
        let mut stream = bus.subscribe("n1", "t", SubscribeOptions::default());

        // Enqueue before the loop starts so both sit in the queue together.
        assert!(bus.publish(Message::new("t", "s", json!("normal"))));
        assert!(
            bus.publish(Message::new("t", "s", json!("critical")).with_priority(Priority::Critical))
        );
        bus.start(token);

        let first = stream.recv().await.expect("first");
        let second = stream.recv().await.expect("second");
        assert_eq!(first.payload, json!("critical"));
        assert_eq!(second.payload, json!("normal"));
    }

    #[tokio::test]
    async fn fifo_within_same_priority() {
        let (bus, token) = bus_with(BusConfig::default());
        let mut stream = bus.subscribe("n1", "t", SubscribeOptions::default());

        for i in 0..5 {
            assert!(bus.publish(Message::new("t", "s", json!(i))));
        }
        bus.start(token);

        for i in 0..5 {
            let msg = stream.recv().await.expect("message");
            assert_eq!(msg.payload, json!(i));
        }
    }

    #[tokio::test]
    async fn filter_skips_non_matching_messages() {
        let (bus, _token) = started_bus();
        let mut stream = bus.subscribe(
            "n1",
            "t",
            SubscribeOptions::filtered(|m| m.priority >= Priority::High),
        );

        assert!(bus.publish(Message::new("t", "s", json!("low"))));
        assert!(bus.publish(Message::new("t", "s", json!("high")).with_priority(Priority::High)));

        let msg = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("delivery")
            .expect("stream open");
        assert_eq!(msg.payload, json!("high"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_accepted_then_replayed() {
        let (bus, _token) = started_bus();

        assert!(bus.publish(Message::new("t", "s", json!("early"))));
        // Give the delivery loop a beat to move it into retention.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.stats().delivered, 0);
        assert_eq!(bus.retained_count("t"), 1);

        let mut stream = bus.subscribe("late", "t", SubscribeOptions::default());
        let msg = stream.try_recv().expect("replayed retained message");
        assert_eq!(msg.payload, json!("early"));
    }

    #[tokio::test]
    async fn retention_ring_is_bounded() {
        let (bus, _token) = bus_with(BusConfig {
            retention_per_topic: 3,
            ..BusConfig::default()
        });
        let token = CancellationToken::new();
        bus.start(token);

        for i in 0..10 {
            assert!(bus.publish(Message::new("t", "s", json!(i))));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.retained_count("t"), 3);

        let mut stream = bus.subscribe("late", "t", SubscribeOptions::default());
        // Only the newest 3 survive.
        assert_eq!(stream.try_recv().expect("m").payload, json!(7));
        assert_eq!(stream.try_recv().expect("m").payload, json!(8));
        assert_eq!(stream.try_recv().expect("m").payload, json!(9));
    }

    #[tokio::test]
    async fn full_subscriber_queue_drops_only_that_delivery() {
        let (bus, _token) = bus_with(BusConfig {
            retention_per_topic: 0,
            ..BusConfig::default()
        });
        let token = CancellationToken::new();

        let mut tiny = bus.subscribe(
            "tiny",
            "t",
            SubscribeOptions {
                queue_capacity: Some(1),
                ..SubscribeOptions::default()
            },
        );
        let mut roomy = bus.subscribe("roomy", "t", SubscribeOptions::default());

        for i in 0..4 {
            assert!(bus.publish(Message::new("t", "s", json!(i))));
        }
        bus.start(token);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The roomy subscriber got all four; the tiny one kept only the first.
        for i in 0..4 {
            assert_eq!(roomy.try_recv().expect("roomy msg").payload, json!(i));
        }
        assert_eq!(tiny.try_recv().expect("tiny msg").payload, json!(0));
        assert!(tiny.try_recv().is_none());
        assert_eq!(bus.stats().dropped_subscriber, 3);
    }

    #[tokio::test]
    async fn unsubscribe_and_unsubscribe_all() {
        let (bus, _token) = started_bus();
        let _s1 = bus.subscribe("n1", "a", SubscribeOptions::default());
        let _s2 = bus.subscribe("n1", "b", SubscribeOptions::default());
        let _s3 = bus.subscribe("n2", "a", SubscribeOptions::default());

        assert!(bus.unsubscribe("n1", "a"));
        assert!(!bus.unsubscribe("n1", "a"));
        assert_eq!(bus.subscriber_count("a"), 1);

        assert_eq!(bus.unsubscribe_all("n1"), 1);
        assert_eq!(bus.unsubscribe_all("n2"), 1);
    }

    #[tokio::test]
    async fn request_without_responder_times_out() {
        let (bus, _token) = started_bus();
        let started = std::time::Instant::now();
        let res = bus
            .request("nobody/home", json!(null), "asker", Duration::from_millis(200))
            .await;
        assert!(matches!(res, Err(BusError::RequestTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        // Reply subscription torn down.
        assert_eq!(bus.unsubscribe_all("asker"), 0);
    }

    #[tokio::test]
    async fn request_response_roundtrip() {
        let (bus, _token) = started_bus();

        let responder_bus = bus.clone();
        let mut inbox = bus.subscribe("svc", "svc/ping", SubscribeOptions::default());
        tokio::spawn(async move {
            if let Some(req) = inbox.recv().await {
                assert!(responder_bus.respond(&req, json!("pong"), "svc"));
            }
        });

        let reply = bus
            .request("svc/ping", json!("ping"), "client", Duration::from_secs(2))
            .await
            .expect("reply");
        assert_eq!(reply.payload, json!("pong"));
        assert_eq!(reply.source.as_ref(), "svc");
    }

    #[tokio::test]
    async fn respond_without_reply_to_is_noop() {
        let (bus, _token) = started_bus();
        let plain = Message::new("t", "s", json!(1));
        assert!(!bus.respond(&plain, json!(2), "svc"));
    }

    #[tokio::test]
    async fn handler_subscription_receives_messages() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(AtomicUsize);
        #[async_trait::async_trait]
        impl MessageHandler for Counter {
            async fn on_message(&self, _message: &Message) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn name(&self) -> &'static str {
                "counter"
            }
        }

        let (bus, _token) = started_bus();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        bus.subscribe_handler(
            "n1",
            "t",
            SubscribeOptions::default(),
            Arc::clone(&counter) as Arc<dyn MessageHandler>,
        );

        for _ in 0..3 {
            assert!(bus.publish(Message::new("t", "s", json!(1))));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}
