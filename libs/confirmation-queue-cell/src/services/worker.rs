use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use shared_database::{AppointmentStore, ConfirmedAppointmentStore, StoreError};
use shared_models::{AppointmentRecord, CountryCode};

use crate::{
    BatchReport, InboundMessage, MessageOutcome, NotificationSubscriber, QueueError, StatusReconciler,
    WorkerConfig,
};

/// Drains one country channel into that country's confirmed store.
///
/// Per message: validate, upsert into the country store, reconcile the
/// master record, acknowledge. Malformed messages are acknowledged and
/// dropped. Any persistence or reconciliation failure leaves the message
/// unacknowledged so the channel redelivers it.
pub struct CountryConsumer {
    country: CountryCode,
    channel: Arc<dyn NotificationSubscriber>,
    store: Arc<dyn ConfirmedAppointmentStore>,
    reconciler: StatusReconciler,
    config: WorkerConfig,
}

impl CountryConsumer {
    pub fn new(
        country: CountryCode,
        channel: Arc<dyn NotificationSubscriber>,
        store: Arc<dyn ConfirmedAppointmentStore>,
        master_store: Arc<dyn AppointmentStore>,
        config: WorkerConfig,
    ) -> Result<Self, QueueError> {
        if store.country() != country {
            return Err(QueueError::ConfigurationError(format!(
                "consumer for {} was given the {} store",
                country,
                store.country()
            )));
        }

        Ok(Self {
            country,
            channel,
            store,
            reconciler: StatusReconciler::new(master_store),
            config,
        })
    }

    pub fn country(&self) -> CountryCode {
        self.country
    }

    pub fn channel(&self) -> &Arc<dyn NotificationSubscriber> {
        &self.channel
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Receives one batch and processes it. An empty report means the
    /// channel had nothing within the receive wait.
    pub async fn poll_once(&self) -> Result<BatchReport, QueueError> {
        let messages = self
            .channel
            .receive(self.config.batch_size, self.config.receive_wait())
            .await?;

        if messages.is_empty() {
            return Ok(BatchReport::default());
        }

        Ok(self.process_batch(messages).await)
    }

    /// Messages are handled concurrently; one failure never holds back the
    /// settlement of its siblings.
    pub async fn process_batch(&self, messages: Vec<InboundMessage>) -> BatchReport {
        let outcomes = join_all(messages.iter().map(|message| self.process_message(message))).await;

        let mut report = BatchReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }

        if report.released > 0 || report.dead_lettered > 0 || report.unsettled > 0 {
            warn!("{} batch finished with failures: {:?}", self.country, report);
        } else {
            debug!("{} batch finished: {:?}", self.country, report);
        }
        report
    }

    #[instrument(skip(self, message), fields(country = %self.country, message_id = %message.message_id, appointment_id))]
    pub async fn process_message(&self, message: &InboundMessage) -> MessageOutcome {
        let record = match self.validate(message) {
            Ok(record) => record,
            Err(reason) => {
                error!("Dropping malformed message {}: {}", message.message_id, reason);
                return self.settle_dropped(message, reason).await;
            }
        };

        tracing::Span::current().record("appointment_id", record.appointment_id());

        match self.confirm(&record).await {
            Ok(()) => match self.channel.acknowledge(message).await {
                Ok(()) => {
                    info!("Appointment {} confirmed for {}", record.appointment_id(), self.country);
                    MessageOutcome::Acknowledged {
                        appointment_id: record.appointment_id().to_string(),
                    }
                }
                Err(e) => {
                    error!("Failed to acknowledge message {}: {}", message.message_id, e);
                    MessageOutcome::Unsettled { error: e.to_string() }
                }
            },
            Err(e) => self.settle_failed(message, e).await,
        }
    }

    fn validate(&self, message: &InboundMessage) -> Result<AppointmentRecord, String> {
        let record = message.message.decode().map_err(|e| e.to_string())?;

        if record.country_code() != self.country {
            return Err(format!(
                "appointment {} belongs to {}, not {}",
                record.appointment_id(),
                record.country_code(),
                self.country
            ));
        }

        Ok(record)
    }

    async fn confirm(&self, record: &AppointmentRecord) -> Result<(), QueueError> {
        let store = Arc::clone(&self.store);
        let snapshot = record.clone();
        self.with_timeout(async move { store.upsert_confirmed(&snapshot).await.map_err(QueueError::from) })
            .await?;

        let reconciler = self.reconciler.clone();
        let appointment_id = record.appointment_id().to_string();
        self.with_timeout(async move { reconciler.reconcile(&appointment_id).await })
            .await?;

        Ok(())
    }

    /// Runs the operation on its own task. On timeout only the wait is
    /// abandoned; the store call still runs to completion.
    async fn with_timeout<T, F>(&self, operation: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, QueueError>> + Send + 'static,
    {
        let limit: Duration = self.config.persistence_timeout();
        match timeout(limit, tokio::spawn(operation)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(QueueError::PersistenceError(StoreError::Backend(format!(
                "persistence task failed: {}",
                e
            )))),
            Err(_) => Err(QueueError::Timeout(limit)),
        }
    }

    async fn settle_dropped(&self, message: &InboundMessage, reason: String) -> MessageOutcome {
        match self.channel.acknowledge(message).await {
            Ok(()) => MessageOutcome::Dropped { reason },
            Err(e) => {
                error!("Failed to drop message {}: {}", message.message_id, e);
                MessageOutcome::Unsettled { error: e.to_string() }
            }
        }
    }

    async fn settle_failed(&self, message: &InboundMessage, failure: QueueError) -> MessageOutcome {
        let error = failure.to_string();

        if message.receive_count >= self.config.max_receive_count {
            error!(
                "Message {} failed {} times, dead-lettering: {}",
                message.message_id, message.receive_count, error
            );
            return match self.channel.dead_letter(message).await {
                Ok(()) => MessageOutcome::DeadLettered { error },
                Err(e) => {
                    error!("Failed to dead-letter message {}: {}", message.message_id, e);
                    MessageOutcome::Unsettled { error: e.to_string() }
                }
            };
        }

        warn!(
            "Releasing message {} for redelivery (attempt {}): {}",
            message.message_id, message.receive_count, error
        );
        match self.channel.release(message).await {
            Ok(()) => MessageOutcome::Released { error },
            Err(e) => {
                error!("Failed to release message {}: {}", message.message_id, e);
                MessageOutcome::Unsettled { error: e.to_string() }
            }
        }
    }
}
