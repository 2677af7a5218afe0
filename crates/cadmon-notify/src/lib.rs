//! Notification delivery with pluggable channel support.
//!
//! Alarm and composite transitions are routed to one or more
//! [`NotificationChannel`] implementations based on severity. Built-in
//! channels: structured log output and webhook (HTTP POST with bounded
//! retries). Delivery and retry are this crate's concern; the evaluator
//! only hands transitions over.

pub mod channels;
pub mod error;
pub mod manager;
pub mod plugin;


use anyhow::Result;
use async_trait::async_trait;
use cadmon_common::types::Transition;

/// A delivery channel that pushes transition events to an external sink.
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// and held by the [`manager::NotificationManager`].
#[async_trait]
pub trait NotificationChannel: Send + Sync + std::fmt::Debug {
    /// Delivers the transition through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, transition: &Transition) -> Result<()>;

    /// Returns the channel type name (e.g., `"log"`, `"webhook"`).
    fn channel_name(&self) -> &str;
}
