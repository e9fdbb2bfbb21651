//! Built-in bus subscribers.

mod log;

pub use log::LogSubscriber;
