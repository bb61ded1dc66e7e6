use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::NotificationMessage;

use crate::{
    ChannelStats, Envelope, InboundMessage, NotificationPublisher, NotificationSubscriber, QueueError,
};

/// One country channel implemented as a Redis reliable queue.
///
/// Keys:
/// - `{name}:pending` - published, not yet received (LPUSH / RPOPLPUSH)
/// - `{name}:processing:{worker}` - received by `worker`, not yet settled
/// - `{name}:dead` - gave up after too many failed deliveries
pub struct RedisNotificationChannel {
    pool: Pool,
    name: String,
    worker_id: String,
}

impl RedisNotificationChannel {
    pub async fn new(config: &AppConfig, name: &str, worker_id: &str) -> Result<Self, QueueError> {
        let pool = Config::from_url(config.redis_url.clone())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::PoolError(format!("Pool creation error: {}", e)))?;

        let channel = Self::from_pool(pool, name, worker_id);

        // Test connection
        let mut conn = channel.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis channel {} initialized for worker {}", name, worker_id);

        Ok(channel)
    }

    pub fn from_pool(pool: Pool, name: &str, worker_id: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
            worker_id: worker_id.to_string(),
        }
    }

    fn pending_key(&self) -> String {
        format!("{}:pending", self.name)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing:{}", self.name, self.worker_id)
    }

    fn dead_letter_key(&self) -> String {
        format!("{}:dead", self.name)
    }

    async fn get_connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::PoolError(format!("Failed to get Redis connection: {}", e)))
    }

    fn to_inbound(&self, raw: String) -> InboundMessage {
        match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => InboundMessage::new(raw, envelope),
            Err(e) => {
                // Not one of our envelopes; hand the raw payload to the validator.
                warn!("Channel {} holds a non-envelope entry: {}", self.name, e);
                let envelope = Envelope {
                    message_id: Uuid::new_v4(),
                    body: raw.clone(),
                    receive_count: 0,
                    published_at: chrono::Utc::now(),
                };
                InboundMessage::new(raw, envelope)
            }
        }
    }

    /// Atomically removes the delivery from this worker's processing list and
    /// pushes `replacement` onto `destination`.
    async fn settle_into(&self, message: &InboundMessage, destination: String) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;
        let replacement = serde_json::to_string(&message.envelope.redelivered())?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM").arg(self.processing_key()).arg(1).arg(&message.receipt).ignore()
            .cmd("LPUSH").arg(destination).arg(replacement).ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationPublisher for RedisNotificationChannel {
    fn channel_name(&self) -> String {
        self.name.clone()
    }

    async fn publish(&self, message: &NotificationMessage) -> Result<Uuid, QueueError> {
        let mut conn = self.get_connection().await?;

        let envelope = Envelope::new(message);
        let data = serde_json::to_string(&envelope)?;

        let _: () = conn.lpush(self.pending_key(), data).await?;

        debug!("Message {} published to {}", envelope.message_id, self.name);
        Ok(envelope.message_id)
    }
}

#[async_trait]
impl NotificationSubscriber for RedisNotificationChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<InboundMessage>, QueueError> {
        let mut conn = self.get_connection().await?;
        let pending = self.pending_key();
        let processing = self.processing_key();

        // BRPOPLPUSH treats 0 as "block forever".
        let wait_seconds = wait.as_secs().max(1);
        let first: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&pending)
            .arg(&processing)
            .arg(wait_seconds)
            .query_async(&mut conn)
            .await?;

        let Some(first) = first else {
            return Ok(Vec::new());
        };

        let mut messages = vec![self.to_inbound(first)];
        while messages.len() < max {
            let next: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(&pending)
                .arg(&processing)
                .query_async(&mut conn)
                .await?;

            match next {
                Some(raw) => messages.push(self.to_inbound(raw)),
                None => break,
            }
        }

        debug!("Worker {} received {} messages from {}", self.worker_id, messages.len(), self.name);
        Ok(messages)
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.lrem(self.processing_key(), 1, &message.receipt).await?;

        debug!("Message {} acknowledged on {}", message.message_id, self.name);
        Ok(())
    }

    async fn release(&self, message: &InboundMessage) -> Result<(), QueueError> {
        self.settle_into(message, self.pending_key()).await?;

        debug!(
            "Message {} released on {} after {} deliveries",
            message.message_id, self.name, message.receive_count
        );
        Ok(())
    }

    async fn dead_letter(&self, message: &InboundMessage) -> Result<(), QueueError> {
        self.settle_into(message, self.dead_letter_key()).await?;

        warn!("Message {} moved to dead-letter list of {}", message.message_id, self.name);
        Ok(())
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self.get_connection().await?;
        let mut recovered = 0;

        loop {
            let moved: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(self.processing_key())
                .arg(self.pending_key())
                .query_async(&mut conn)
                .await?;

            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} in-flight messages on {} for worker {}", recovered, self.name, self.worker_id);
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<ChannelStats, QueueError> {
        let mut conn = self.get_connection().await?;

        let pending: u64 = conn.llen(self.pending_key()).await?;
        let in_flight: u64 = conn.llen(self.processing_key()).await?;
        let dead_lettered: u64 = conn.llen(self.dead_letter_key()).await?;

        Ok(ChannelStats {
            channel: self.name.clone(),
            pending,
            in_flight,
            dead_lettered,
        })
    }
}
