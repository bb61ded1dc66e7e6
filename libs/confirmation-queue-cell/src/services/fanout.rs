use std::sync::Arc;

use tracing::{debug, error, instrument};

use shared_models::{AppointmentRecord, CountryCode, NotificationMessage};

use crate::{NotificationPublisher, QueueError, RoutedNotification};

/// Sends each record snapshot to exactly one country channel.
///
/// Delivery failures are returned to the caller as they are; retrying is
/// left to the channel infrastructure.
#[derive(Clone)]
pub struct FanOutRouter {
    peru: Arc<dyn NotificationPublisher>,
    chile: Arc<dyn NotificationPublisher>,
}

impl FanOutRouter {
    pub fn new(peru: Arc<dyn NotificationPublisher>, chile: Arc<dyn NotificationPublisher>) -> Self {
        Self { peru, chile }
    }

    pub fn channel_for(&self, country: CountryCode) -> &Arc<dyn NotificationPublisher> {
        match country {
            CountryCode::Peru => &self.peru,
            CountryCode::Chile => &self.chile,
        }
    }

    #[instrument(skip(self, record), fields(appointment_id = %record.appointment_id(), country = %record.country_code()))]
    pub async fn route(&self, record: &AppointmentRecord) -> Result<RoutedNotification, QueueError> {
        let channel = self.channel_for(record.country_code());
        let channel_name = channel.channel_name();

        let message = NotificationMessage::from_record(record)?;

        let message_id = channel.publish(&message).await.map_err(|e| {
            error!("Failed to deliver appointment {} to {}: {}", record.appointment_id(), channel_name, e);
            match e {
                QueueError::DeliveryError { .. } => e,
                other => QueueError::DeliveryError {
                    channel: channel_name.clone(),
                    reason: other.to_string(),
                },
            }
        })?;

        debug!("Appointment {} routed to {} as {}", record.appointment_id(), channel_name, message_id);

        Ok(RoutedNotification {
            appointment_id: record.appointment_id().to_string(),
            country_code: record.country_code(),
            channel: channel_name,
            message_id,
        })
    }
}
