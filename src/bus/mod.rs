//! Message bus: topic routing, prioritized delivery, request/response.
//!
//! This module groups the message **data model**, the **subscription**
//! machinery, and the **bus** that routes published messages to topic
//! subscribers.
//!
//! ## Contents
//! - [`Message`], [`Priority`] message payload and classification
//! - [`MessageStream`], [`MessageHandler`], [`SubscribeOptions`] subscriber API
//! - [`MessageBus`], [`BusStats`] routing, delivery, counters
//! - [`topics`] well-known system topics and their serde payloads
//!
//! See `bus.rs` for the delivery-loop wiring diagram.

#[allow(clippy::module_inception)]
mod bus;
mod message;
mod subscription;
pub mod topics;

pub use bus::{BusStats, MessageBus};
pub use message::{Message, Priority};
pub use subscription::{MessageFilter, MessageHandler, MessageStream, SubscribeOptions};
