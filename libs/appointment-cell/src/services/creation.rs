use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use confirmation_queue_cell::FanOutRouter;
use shared_config::AppConfig;
use shared_database::AppointmentStore;
use shared_models::{AppointmentRecord, CountryCode};

use crate::models::{
    AppointmentError, CreateAppointmentRequest, MISSING_FIELDS_MESSAGE, UNSUPPORTED_COUNTRY_MESSAGE,
};

/// Validates creation requests, stores the `pending` record and hands it to
/// the fan-out router.
pub struct AppointmentCreationService {
    store: Arc<dyn AppointmentStore>,
    router: FanOutRouter,
    persistence_timeout: Duration,
    delivery_timeout: Duration,
}

impl AppointmentCreationService {
    pub fn new(store: Arc<dyn AppointmentStore>, router: FanOutRouter, config: &AppConfig) -> Self {
        Self::with_timeouts(store, router, config.persistence_timeout(), config.delivery_timeout())
    }

    pub fn with_timeouts(
        store: Arc<dyn AppointmentStore>,
        router: FanOutRouter,
        persistence_timeout: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            router,
            persistence_timeout,
            delivery_timeout,
        }
    }

    /// Builds the `pending` record for a request without touching any store.
    pub fn build_record(request: &CreateAppointmentRequest) -> Result<AppointmentRecord, AppointmentError> {
        let insured_id = request.insured_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
        let schedule_id = request.schedule_id.filter(|id| *id != 0);
        let country = request.country_iso.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let (Some(insured_id), Some(schedule_id), Some(country)) = (insured_id, schedule_id, country) else {
            return Err(AppointmentError::ValidationError(MISSING_FIELDS_MESSAGE.to_string()));
        };

        let country: CountryCode = country
            .parse()
            .map_err(|_| AppointmentError::ValidationError(UNSUPPORTED_COUNTRY_MESSAGE.to_string()))?;

        Ok(AppointmentRecord::new(schedule_id.to_string(), insured_id, country))
    }

    /// Persists before routing. A routing failure is reported but the stored
    /// record stays `pending`.
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: &CreateAppointmentRequest) -> Result<AppointmentRecord, AppointmentError> {
        let record = Self::build_record(request)?;
        debug!("Creating appointment {} for insured {}", record.appointment_id(), record.insured_id());

        let store = Arc::clone(&self.store);
        let pending = record.clone();
        let stored = bounded(self.persistence_timeout, async move { store.upsert(&pending).await })
            .await
            .map_err(AppointmentError::PersistenceError)?;

        if stored.is_completed() {
            // Retry of a request whose confirmation already landed.
            info!("Appointment {} already completed, skipping fan-out", stored.appointment_id());
            return Ok(stored);
        }

        let router = self.router.clone();
        let snapshot = record.clone();
        match bounded(self.delivery_timeout, async move { router.route(&snapshot).await }).await {
            Ok(routed) => {
                info!(
                    "Appointment {} pending scheduling on {} ({})",
                    routed.appointment_id, routed.channel, routed.message_id
                );
                Ok(stored)
            }
            Err(e) => {
                warn!("Appointment {} stored as pending but not routed: {}", record.appointment_id(), e);
                Err(AppointmentError::DeliveryError(e))
            }
        }
    }
}

/// Runs the operation on its own task and waits at most `limit`. A timed-out
/// store or publish call is not cancelled; it still runs to completion.
async fn bounded<T, E, F>(limit: Duration, operation: F) -> Result<T, String>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    match timeout(limit, tokio::spawn(operation)).await {
        Ok(Ok(result)) => result.map_err(|e| e.to_string()),
        Ok(Err(e)) => Err(format!("operation task failed: {}", e)),
        Err(_) => Err(format!("operation timed out after {:?}", limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use confirmation_queue_cell::InMemoryChannel;
    use tokio_test::{assert_err, assert_ok};
    use shared_database::InMemoryAppointmentStore;
    use shared_models::AppointmentStatus;

    struct Fixture {
        store: Arc<InMemoryAppointmentStore>,
        pe: Arc<InMemoryChannel>,
        cl: Arc<InMemoryChannel>,
        service: AppointmentCreationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let pe = Arc::new(InMemoryChannel::new("appointments-pe"));
        let cl = Arc::new(InMemoryChannel::new("appointments-cl"));
        let service = AppointmentCreationService::with_timeouts(
            store.clone(),
            FanOutRouter::new(pe.clone(), cl.clone()),
            Duration::from_millis(200),
            Duration::from_millis(200),
        );
        Fixture { store, pe, cl, service }
    }

    #[test]
    fn missing_fields_are_checked_before_country() {
        let request = CreateAppointmentRequest {
            insured_id: Some("123".to_string()),
            schedule_id: None,
            country_iso: Some("US".to_string()),
        };

        assert_matches!(
            AppointmentCreationService::build_record(&request),
            Err(AppointmentError::ValidationError(message)) if message == MISSING_FIELDS_MESSAGE
        );
    }

    #[test]
    fn zero_schedule_and_blank_insured_count_as_missing() {
        for request in [
            CreateAppointmentRequest::new("123", 0, "PE"),
            CreateAppointmentRequest::new("  ", 456, "PE"),
            CreateAppointmentRequest::new("123", 456, ""),
        ] {
            assert_matches!(
                AppointmentCreationService::build_record(&request),
                Err(AppointmentError::ValidationError(message)) if message == MISSING_FIELDS_MESSAGE
            );
        }
    }

    #[test]
    fn unknown_country_is_unsupported() {
        assert_matches!(
            AppointmentCreationService::build_record(&CreateAppointmentRequest::new("123", 456, "US")),
            Err(AppointmentError::ValidationError(message)) if message == UNSUPPORTED_COUNTRY_MESSAGE
        );
    }

    #[test]
    fn schedule_id_becomes_appointment_id() {
        let record = AppointmentCreationService::build_record(&CreateAppointmentRequest::new("123", 456, "CL")).unwrap();
        assert_eq!(record.appointment_id(), "456");
        assert_eq!(record.insured_id(), "123");
        assert_eq!(record.country_code(), CountryCode::Chile);
        assert_eq!(record.status(), AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn create_stores_pending_record_and_routes_once() {
        let f = fixture();
        let record = assert_ok!(f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await);

        assert_eq!(record.status(), AppointmentStatus::Pending);
        assert_eq!(f.store.get("456").await.unwrap(), Some(record));
        assert_eq!(f.pe.published_count(), 1);
        assert_eq!(f.cl.published_count(), 0);
    }

    #[tokio::test]
    async fn invalid_request_touches_nothing() {
        let f = fixture();
        let result = f.service.create(&CreateAppointmentRequest::new("123", 456, "AR")).await;

        assert_matches!(result, Err(AppointmentError::ValidationError(_)));
        assert!(f.store.is_empty());
        assert_eq!(f.pe.published_count() + f.cl.published_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_prevents_routing() {
        let f = fixture();
        f.store.fail_writes(true);

        let result = f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await;

        assert_matches!(result, Err(AppointmentError::PersistenceError(_)));
        assert_eq!(f.pe.published_count(), 0);
    }

    #[tokio::test]
    async fn routing_failure_keeps_pending_record() {
        let f = fixture();
        f.cl.fail_publish(true);

        let result = f.service.create(&CreateAppointmentRequest::new("123", 789, "CL")).await;

        assert_matches!(result, Err(AppointmentError::DeliveryError(_)));
        let stored = f.store.get("789").await.unwrap().expect("record must not be rolled back");
        assert_eq!(stored.status(), AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn slow_channel_times_out_as_delivery_error() {
        let f = fixture();
        f.pe.set_publish_delay(Some(Duration::from_secs(5)));

        let result = f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await;

        assert_matches!(result, Err(AppointmentError::DeliveryError(message)) if message.contains("timed out"));
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn timed_out_publish_still_completes() {
        let f = fixture();
        f.pe.set_publish_delay(Some(Duration::from_millis(300)));

        assert_err!(f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await);
        assert_eq!(f.pe.published_count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(f.pe.published_count(), 1);
    }

    #[tokio::test]
    async fn repeated_schedule_id_overwrites() {
        let f = fixture();
        f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await.unwrap();
        f.service.create(&CreateAppointmentRequest::new("123", 456, "PE")).await.unwrap();

        assert_eq!(f.store.len(), 1);
        assert_eq!(f.pe.published_count(), 2);
    }
}
