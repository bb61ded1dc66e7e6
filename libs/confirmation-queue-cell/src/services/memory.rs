//! In-process channel with the same settlement semantics as the Redis one.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::debug;
use uuid::Uuid;

use shared_models::NotificationMessage;

use crate::{
    ChannelStats, Envelope, InboundMessage, NotificationPublisher, NotificationSubscriber, QueueError,
};

#[derive(Default)]
struct ChannelState {
    pending: VecDeque<Envelope>,
    in_flight: HashMap<String, Envelope>,
    dead: Vec<Envelope>,
}

pub struct InMemoryChannel {
    name: String,
    state: Mutex<ChannelState>,
    available: Notify,
    fail_publish: AtomicBool,
    fail_settlement: AtomicBool,
    publish_delay: Mutex<Option<Duration>>,
    published: AtomicUsize,
}

impl InMemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ChannelState::default()),
            available: Notify::new(),
            fail_publish: AtomicBool::new(false),
            fail_settlement: AtomicBool::new(false),
            publish_delay: Mutex::new(None),
            published: AtomicUsize::new(0),
        }
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes acknowledge / release / dead_letter fail.
    pub fn fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        *self.publish_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of successful publishes.
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn dead_letter_len(&self) -> usize {
        self.lock().dead.len()
    }

    pub fn dead_letters(&self) -> Vec<Envelope> {
        self.lock().dead.clone()
    }

    /// Bodies currently waiting to be received, oldest first.
    pub fn pending_bodies(&self) -> Vec<String> {
        self.lock().pending.iter().map(|e| e.body.clone()).collect()
    }

    /// Enqueues an arbitrary body, bypassing the publisher contract.
    pub fn push_raw(&self, body: impl Into<String>) -> Uuid {
        let envelope = Envelope::new(&NotificationMessage::from_body(body));
        let message_id = envelope.message_id;
        self.lock().pending.push_back(envelope);
        self.available.notify_one();
        message_id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_settlement(&self) -> Result<(), QueueError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(QueueError::DeliveryError {
                channel: self.name.clone(),
                reason: "injected settlement failure".to_string(),
            });
        }
        Ok(())
    }

    fn take_batch(&self, max: usize) -> Vec<InboundMessage> {
        let mut state = self.lock();
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(envelope) = state.pending.pop_front() else {
                break;
            };
            let receipt = Uuid::new_v4().to_string();
            state.in_flight.insert(receipt.clone(), envelope.clone());
            batch.push(InboundMessage::new(receipt, envelope));
        }

        batch
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryChannel {
    fn channel_name(&self) -> String {
        self.name.clone()
    }

    async fn publish(&self, message: &NotificationMessage) -> Result<Uuid, QueueError> {
        let delay = *self.publish_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::DeliveryError {
                channel: self.name.clone(),
                reason: "injected publish failure".to_string(),
            });
        }

        let envelope = Envelope::new(message);
        let message_id = envelope.message_id;
        self.lock().pending.push_back(envelope);
        self.published.fetch_add(1, Ordering::SeqCst);
        self.available.notify_one();

        debug!("Message {} published to {}", message_id, self.name);
        Ok(message_id)
    }
}

#[async_trait]
impl NotificationSubscriber for InMemoryChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<InboundMessage>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.available.notified();

            let batch = self.take_batch(max.max(1));
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || timeout(remaining, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), QueueError> {
        self.check_settlement()?;
        self.lock().in_flight.remove(&message.receipt);
        Ok(())
    }

    async fn release(&self, message: &InboundMessage) -> Result<(), QueueError> {
        self.check_settlement()?;
        {
            let mut state = self.lock();
            if let Some(envelope) = state.in_flight.remove(&message.receipt) {
                state.pending.push_back(envelope.redelivered());
            }
        }
        self.available.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, message: &InboundMessage) -> Result<(), QueueError> {
        self.check_settlement()?;
        let mut state = self.lock();
        if let Some(envelope) = state.in_flight.remove(&message.receipt) {
            state.dead.push(envelope.redelivered());
        }
        Ok(())
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        let recovered = {
            let mut state = self.lock();
            let stranded: Vec<Envelope> = state.in_flight.drain().map(|(_, envelope)| envelope).collect();
            let count = stranded.len() as u64;
            state.pending.extend(stranded);
            count
        };

        if recovered > 0 {
            self.available.notify_one();
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<ChannelStats, QueueError> {
        let state = self.lock();
        Ok(ChannelStats {
            channel: self.name.clone(),
            pending: state.pending.len() as u64,
            in_flight: state.in_flight.len() as u64,
            dead_lettered: state.dead.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn message(body: &str) -> NotificationMessage {
        NotificationMessage::from_body(body)
    }

    #[tokio::test]
    async fn received_messages_are_hidden_until_settled() {
        let channel = InMemoryChannel::new("pe");
        channel.publish(&message("a")).await.unwrap();
        channel.publish(&message("b")).await.unwrap();

        let batch = channel.receive(1, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message.body(), "a");
        assert_eq!(channel.pending_len(), 1);
        assert_eq!(channel.in_flight_len(), 1);

        channel.acknowledge(&batch[0]).await.unwrap();
        assert_eq!(channel.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn released_message_comes_back_with_higher_receive_count() {
        let channel = InMemoryChannel::new("pe");
        let id = channel.publish(&message("a")).await.unwrap();

        let first = channel.receive(10, Duration::from_millis(10)).await.unwrap();
        channel.release(&first[0]).await.unwrap();

        let second = channel.receive(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, id);
        assert_eq!(second[0].receive_count, 2);
    }

    #[tokio::test]
    async fn receive_times_out_on_empty_channel() {
        let channel = InMemoryChannel::new("cl");
        let batch = channel.receive(5, Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn receive_wakes_up_on_publish() {
        let channel = std::sync::Arc::new(InMemoryChannel::new("cl"));
        let publisher = std::sync::Arc::clone(&channel);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(&NotificationMessage::from_body("late")).await.unwrap();
        });

        let batch = channel.receive(5, Duration::from_secs(2)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn recover_returns_in_flight_messages() {
        let channel = InMemoryChannel::new("pe");
        channel.push_raw("a");
        channel.push_raw("b");
        channel.receive(10, Duration::from_millis(10)).await.unwrap();

        assert_eq!(channel.recover().await.unwrap(), 2);
        assert_eq!(channel.pending_len(), 2);
        assert_eq!(channel.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn injected_publish_failure_is_a_delivery_error() {
        let channel = InMemoryChannel::new("pe");
        channel.fail_publish(true);

        assert_matches!(
            channel.publish(&message("a")).await,
            Err(QueueError::DeliveryError { channel, .. }) if channel == "pe"
        );
        assert_eq!(channel.published_count(), 0);
    }
}
