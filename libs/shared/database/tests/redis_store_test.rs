//! Live Redis tests. Run with `REDIS_TEST_URL=redis://... cargo test -- --ignored`.

use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{AppointmentStore, RedisAppointmentStore};
use shared_models::{AppointmentRecord, AppointmentStatus, CountryCode};

async fn test_store() -> RedisAppointmentStore {
    let config = AppConfig {
        redis_url: std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        appointments_key_prefix: format!("test_{}", Uuid::new_v4().simple()),
        ..AppConfig::default()
    };

    RedisAppointmentStore::new(&config).await.expect("Failed to connect to Redis")
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_upsert_is_idempotent_and_query_orders_by_insertion() {
    let store = test_store().await;
    let insured = "insured-1";

    let first = AppointmentRecord::new("100", insured, CountryCode::Peru);
    let second = AppointmentRecord::new("200", insured, CountryCode::Chile);

    store.upsert(&first).await.expect("Failed to upsert first");
    store.upsert(&second).await.expect("Failed to upsert second");
    store.upsert(&first).await.expect("Failed to re-upsert first");

    let records = store.find_by_insured(insured).await.expect("Failed to query");
    let ids: Vec<&str> = records.iter().map(|r| r.appointment_id()).collect();
    assert_eq!(ids, vec!["100", "200"]);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_mark_completed_is_sticky() {
    let store = test_store().await;
    let record = AppointmentRecord::new("300", "insured-2", CountryCode::Peru);

    store.upsert(&record).await.expect("Failed to upsert");

    let completed = store.mark_completed("300").await.expect("Failed to complete");
    assert_eq!(completed.map(|r| r.status()), Some(AppointmentStatus::Completed));

    let again = store.mark_completed("300").await.expect("Failed to complete twice");
    assert_eq!(again.map(|r| r.status()), Some(AppointmentStatus::Completed));

    let after_retry = store.upsert(&record).await.expect("Failed to re-upsert");
    assert_eq!(after_retry.status(), AppointmentStatus::Completed);

    assert!(store.mark_completed("missing").await.expect("Failed to query").is_none());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_query_for_unknown_insured_is_empty() {
    let store = test_store().await;
    let records = store.find_by_insured("nobody").await.expect("Failed to query");
    assert!(records.is_empty());
}
