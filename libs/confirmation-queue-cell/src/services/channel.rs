use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use shared_models::NotificationMessage;

use crate::{ChannelStats, InboundMessage, QueueError};

/// Sending side of a country channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    fn channel_name(&self) -> String;

    /// Hands the message to the channel. Once this returns `Ok` the channel
    /// guarantees at-least-once delivery to its consumers.
    async fn publish(&self, message: &NotificationMessage) -> Result<Uuid, QueueError>;
}

/// Receiving side of a country channel with explicit settlement.
#[async_trait]
pub trait NotificationSubscriber: Send + Sync {
    fn name(&self) -> String;

    /// Takes up to `max` messages, waiting at most `wait` for the first one.
    /// Received messages stay invisible to other consumers until settled.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<InboundMessage>, QueueError>;

    /// Removes the message from the channel for good.
    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), QueueError>;

    /// Makes the message visible again so it is redelivered.
    async fn release(&self, message: &InboundMessage) -> Result<(), QueueError>;

    /// Parks the message on the channel's dead-letter list.
    async fn dead_letter(&self, message: &InboundMessage) -> Result<(), QueueError>;

    /// Returns messages left in flight by a previous run of this consumer to
    /// the channel. Returns how many were recovered.
    async fn recover(&self) -> Result<u64, QueueError>;

    async fn stats(&self) -> Result<ChannelStats, QueueError>;
}
