use std::sync::Arc;

use tracing::{debug, warn};

use shared_database::AppointmentStore;
use shared_models::AppointmentRecord;

use crate::QueueError;

/// Advances a master record from `pending` to `completed` once its country
/// confirmation is stored.
#[derive(Clone)]
pub struct StatusReconciler {
    store: Arc<dyn AppointmentStore>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Idempotent: reconciling an already completed record returns it
    /// unchanged. A missing master record is an error so the confirmation
    /// is retried once the creation write lands.
    pub async fn reconcile(&self, appointment_id: &str) -> Result<AppointmentRecord, QueueError> {
        match self.store.mark_completed(appointment_id).await? {
            Some(record) => {
                debug!("Appointment {} reconciled to {}", appointment_id, record.status());
                Ok(record)
            }
            None => {
                warn!("No master record for appointment {} to reconcile", appointment_id);
                Err(QueueError::ReconciliationError(format!(
                    "appointment {} not found in the master store",
                    appointment_id
                )))
            }
        }
    }
}
