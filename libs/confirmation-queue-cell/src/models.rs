use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{CountryCode, NotificationMessage};

/// What actually sits on a channel: the notification body plus delivery
/// bookkeeping. `receive_count` counts deliveries that ended without an
/// acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: Uuid,
    pub body: String,
    pub receive_count: u32,
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(message: &NotificationMessage) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body: message.body().to_string(),
            receive_count: 0,
            published_at: Utc::now(),
        }
    }

    /// Copy of this envelope recording one more unacknowledged delivery.
    pub fn redelivered(&self) -> Self {
        Self {
            receive_count: self.receive_count + 1,
            ..self.clone()
        }
    }
}

/// A message handed to a consumer. `receipt` identifies this particular
/// delivery for acknowledge / release.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub receipt: String,
    pub message_id: Uuid,
    /// 1 on first delivery, incremented on every redelivery.
    pub receive_count: u32,
    pub envelope: Envelope,
    pub message: NotificationMessage,
}

impl InboundMessage {
    pub fn new(receipt: String, envelope: Envelope) -> Self {
        Self {
            receipt,
            message_id: envelope.message_id,
            receive_count: envelope.receive_count + 1,
            message: NotificationMessage::from_body(envelope.body.clone()),
            envelope,
        }
    }
}

/// Returned by the fan-out router once a notification has been handed off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedNotification {
    pub appointment_id: String,
    pub country_code: CountryCode,
    pub channel: String,
    pub message_id: Uuid,
}

/// Terminal state of one inbound message after the consumer handled it.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Persisted, reconciled and removed from the channel.
    Acknowledged { appointment_id: String },
    /// Malformed; removed from the channel without retry.
    Dropped { reason: String },
    /// Persistence failed; made visible again for redelivery.
    Released { error: String },
    /// Persistence kept failing past the receive limit.
    DeadLettered { error: String },
    /// The channel itself refused the acknowledge/release; the message
    /// stays in flight until it is recovered.
    Unsettled { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub acknowledged: u32,
    pub dropped: u32,
    pub released: u32,
    pub dead_lettered: u32,
    pub unsettled: u32,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Acknowledged { .. } => self.acknowledged += 1,
            MessageOutcome::Dropped { .. } => self.dropped += 1,
            MessageOutcome::Released { .. } => self.released += 1,
            MessageOutcome::DeadLettered { .. } => self.dead_lettered += 1,
            MessageOutcome::Unsettled { .. } => self.unsettled += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.acknowledged + self.dropped + self.released + self.dead_lettered + self.unsettled
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel: String,
    pub pending: u64,
    pub in_flight: u64,
    pub dead_lettered: u64,
}

/// Worker id used when `WORKER_ID` is unset. Processing lists are keyed by it,
/// so it must survive restarts for `recover` to find in-flight messages.
pub const DEFAULT_WORKER_ID: &str = "confirmation-worker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: u32,
    pub batch_size: usize,
    pub receive_wait_ms: u64,
    pub idle_backoff_ms: u64,
    pub error_backoff_ms: u64,
    pub max_receive_count: u32,
    pub persistence_timeout_ms: u64,
    pub health_check_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: DEFAULT_WORKER_ID.to_string(),
            concurrency: 2,
            batch_size: 10,
            receive_wait_ms: 1000,
            idle_backoff_ms: 100,
            error_backoff_ms: 5000,
            max_receive_count: 5,
            persistence_timeout_ms: 5000,
            health_check_interval_seconds: 60,
        }
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            worker_id: config.worker_id.clone().unwrap_or(defaults.worker_id),
            concurrency: config.worker_concurrency.max(1),
            batch_size: config.worker_batch_size.max(1),
            max_receive_count: config.max_receive_count.max(1),
            persistence_timeout_ms: config.persistence_timeout_ms,
            ..defaults
        }
    }

    pub fn receive_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.receive_wait_ms)
    }

    pub fn persistence_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persistence_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::AppointmentRecord;

    #[test]
    fn inbound_message_counts_current_delivery() {
        let record = AppointmentRecord::new("456", "123", CountryCode::Peru);
        let envelope = Envelope::new(&NotificationMessage::from_record(&record).unwrap());

        let first = InboundMessage::new("r1".to_string(), envelope.clone());
        assert_eq!(first.receive_count, 1);

        let second = InboundMessage::new("r2".to_string(), envelope.redelivered());
        assert_eq!(second.receive_count, 2);
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.message.decode().unwrap(), record);
    }

    #[test]
    fn batch_report_tallies_outcomes() {
        let mut report = BatchReport::default();
        report.record(&MessageOutcome::Acknowledged { appointment_id: "1".to_string() });
        report.record(&MessageOutcome::Dropped { reason: "bad".to_string() });
        report.record(&MessageOutcome::Released { error: "db".to_string() });

        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.released, 1);
        assert_eq!(report.total(), 3);
        assert!(!report.is_empty());
    }

    #[test]
    fn worker_config_follows_app_config() {
        let app = AppConfig {
            worker_id: Some("pe-worker".to_string()),
            worker_concurrency: 0,
            worker_batch_size: 25,
            max_receive_count: 3,
            ..AppConfig::default()
        };

        let config = WorkerConfig::from_app_config(&app);
        assert_eq!(config.worker_id, "pe-worker");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_receive_count, 3);
    }

    #[test]
    fn default_worker_id_is_stable_across_runs() {
        let app = AppConfig::default();

        let first = WorkerConfig::from_app_config(&app);
        let second = WorkerConfig::from_app_config(&app);

        assert_eq!(first.worker_id, second.worker_id);
        assert_eq!(first.worker_id, DEFAULT_WORKER_ID);
    }
}
