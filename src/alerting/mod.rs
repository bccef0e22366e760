//! Turns evaluation signals into notifications and outbound messages.
//!
//! `aggregator` is pure: it decides what to write and what to send.
//! `dispatcher` writes (stage change atomically with its notification),
//! then delivers through the `channels`.

pub mod aggregator;
pub mod channels;
pub mod dispatcher;
pub mod messages;
pub mod types;

pub use aggregator::{aggregate, workflow_announcements, AlertBatch, ResultContext};
pub use dispatcher::NotificationDispatcher;
pub use types::*;
