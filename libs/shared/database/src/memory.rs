//! In-process store implementations used by tests and single-process runs.
//!
//! Both stores support failure injection (`fail_writes`) and an artificial
//! write delay so callers can exercise their error and timeout paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use shared_models::{AppointmentRecord, CountryCode};

use crate::{AppointmentStore, ConfirmedAppointmentStore, StoreError};

#[derive(Default)]
struct FaultInjection {
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl FaultInjection {
    async fn before_write(&self) -> Result<(), StoreError> {
        let delay = *self.write_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }

    fn before_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    // Insertion order is the vector order; re-upserts replace in place.
    records: Mutex<Vec<AppointmentRecord>>,
    faults: FaultInjection,
    writes: AtomicUsize,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.faults.write_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful write calls (upserts and status updates).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<AppointmentRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AppointmentRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn upsert(&self, record: &AppointmentRecord) -> Result<AppointmentRecord, StoreError> {
        self.faults.before_write().await?;
        let mut records = self.lock();

        let stored = match records.iter_mut().find(|r| r.appointment_id() == record.appointment_id()) {
            Some(existing) if existing.is_completed() => existing.clone(),
            Some(existing) => {
                *existing = record.clone();
                record.clone()
            }
            None => {
                records.push(record.clone());
                record.clone()
            }
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn get(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError> {
        self.faults.before_read()?;
        Ok(self.lock().iter().find(|r| r.appointment_id() == appointment_id).cloned())
    }

    async fn find_by_insured(&self, insured_id: &str) -> Result<Vec<AppointmentRecord>, StoreError> {
        self.faults.before_read()?;
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.insured_id() == insured_id)
            .cloned()
            .collect())
    }

    async fn mark_completed(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError> {
        self.faults.before_write().await?;
        let mut records = self.lock();

        let updated = records
            .iter_mut()
            .find(|r| r.appointment_id() == appointment_id)
            .map(|record| {
                record.mark_completed();
                record.clone()
            });

        if updated.is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(updated)
    }
}

pub struct InMemoryConfirmedStore {
    country: CountryCode,
    rows: Mutex<HashMap<String, AppointmentRecord>>,
    faults: FaultInjection,
    writes: AtomicUsize,
}

impl InMemoryConfirmedStore {
    pub fn new(country: CountryCode) -> Self {
        Self {
            country,
            rows: Mutex::new(HashMap::new()),
            faults: FaultInjection::default(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.faults.write_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn row_count(&self) -> usize {
        self.lock().len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn row(&self, appointment_id: &str) -> Option<AppointmentRecord> {
        self.lock().get(appointment_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AppointmentRecord>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConfirmedAppointmentStore for InMemoryConfirmedStore {
    fn country(&self) -> CountryCode {
        self.country
    }

    async fn upsert_confirmed(&self, record: &AppointmentRecord) -> Result<(), StoreError> {
        self.faults.before_write().await?;
        self.lock().insert(record.appointment_id().to_string(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
