use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::AppointmentStore;
use shared_models::AppointmentView;

use crate::models::{AppointmentError, MISSING_INSURED_ID_MESSAGE};

pub struct AppointmentQueryService {
    store: Arc<dyn AppointmentStore>,
    read_timeout: Duration,
}

impl AppointmentQueryService {
    pub fn new(store: Arc<dyn AppointmentStore>, config: &AppConfig) -> Self {
        Self::with_timeout(store, config.persistence_timeout())
    }

    pub fn with_timeout(store: Arc<dyn AppointmentStore>, read_timeout: Duration) -> Self {
        Self { store, read_timeout }
    }

    /// All appointments of an insured party in insertion order. No records is
    /// an empty list, not an error.
    pub async fn list_for_insured(&self, insured_id: &str) -> Result<Vec<AppointmentView>, AppointmentError> {
        let insured_id = insured_id.trim();
        if insured_id.is_empty() {
            return Err(AppointmentError::ValidationError(MISSING_INSURED_ID_MESSAGE.to_string()));
        }

        let records = match timeout(self.read_timeout, self.store.find_by_insured(insured_id)).await {
            Ok(result) => result.map_err(|e| AppointmentError::PersistenceError(e.to_string()))?,
            Err(_) => {
                return Err(AppointmentError::PersistenceError(format!(
                    "query timed out after {:?}",
                    self.read_timeout
                )))
            }
        };

        debug!("Found {} appointments for insured {}", records.len(), insured_id);
        Ok(records.iter().map(AppointmentView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_database::InMemoryAppointmentStore;
    use shared_models::{AppointmentRecord, CountryCode};

    fn service(store: Arc<InMemoryAppointmentStore>) -> AppointmentQueryService {
        AppointmentQueryService::with_timeout(store, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn unknown_insured_yields_empty_list() {
        let views = service(Arc::new(InMemoryAppointmentStore::new()))
            .list_for_insured("nobody")
            .await
            .unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn returns_only_that_insured_in_insertion_order() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        store.upsert(&AppointmentRecord::new("2", "123", CountryCode::Peru)).await.unwrap();
        store.upsert(&AppointmentRecord::new("1", "123", CountryCode::Chile)).await.unwrap();
        store.upsert(&AppointmentRecord::new("3", "999", CountryCode::Peru)).await.unwrap();

        let views = service(store).list_for_insured("123").await.unwrap();
        let ids: Vec<&str> = views.iter().map(|v| v.appointment_id.as_str()).collect();

        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn store_failure_is_a_persistence_error() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        store.fail_reads(true);

        assert_matches!(
            service(store).list_for_insured("123").await,
            Err(AppointmentError::PersistenceError(_))
        );
    }

    #[tokio::test]
    async fn blank_insured_id_is_rejected() {
        assert_matches!(
            service(Arc::new(InMemoryAppointmentStore::new())).list_for_insured(" ").await,
            Err(AppointmentError::ValidationError(_))
        );
    }
}
