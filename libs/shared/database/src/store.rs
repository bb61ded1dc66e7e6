use async_trait::async_trait;

use shared_models::{AppointmentRecord, CountryCode};

use crate::StoreError;

/// Master store holding every appointment record, keyed by `appointmentId`.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Idempotent write keyed by `appointmentId`: a retry overwrites instead of
    /// duplicating. A record that is already `completed` is left untouched.
    /// Returns the record as it is stored after the call.
    async fn upsert(&self, record: &AppointmentRecord) -> Result<AppointmentRecord, StoreError>;

    async fn get(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError>;

    /// Records belonging to `insured_id` in insertion order.
    async fn find_by_insured(&self, insured_id: &str) -> Result<Vec<AppointmentRecord>, StoreError>;

    /// Advances the record to `completed`. Applying it twice is a no-op and it
    /// never moves a record back to `pending`. Returns `None` if no record exists.
    async fn mark_completed(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError>;
}

/// Country-specific store of confirmed appointments.
#[async_trait]
pub trait ConfirmedAppointmentStore: Send + Sync {
    fn country(&self) -> CountryCode;

    /// Upsert keyed by `appointmentId`; re-processing the same record never
    /// creates a second row.
    async fn upsert_confirmed(&self, record: &AppointmentRecord) -> Result<(), StoreError>;
}
