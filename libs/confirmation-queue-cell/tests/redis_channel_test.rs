//! Live Redis tests. Run with `REDIS_TEST_URL=redis://... cargo test -- --ignored`.

use std::time::Duration;

use redis::AsyncCommands;
use uuid::Uuid;

use confirmation_queue_cell::*;
use shared_config::AppConfig;
use shared_models::{AppointmentRecord, CountryCode, NotificationMessage};

struct TestChannel {
    channel: RedisNotificationChannel,
    name: String,
    config: AppConfig,
}

impl TestChannel {
    async fn new() -> Self {
        let config = AppConfig {
            redis_url: std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ..AppConfig::default()
        };
        let name = format!("test_{}", Uuid::new_v4().simple());
        let channel = RedisNotificationChannel::new(&config, &name, "worker-a")
            .await
            .expect("Failed to connect to Redis");

        Self { channel, name, config }
    }

    async fn cleanup(&self) {
        let client = redis::Client::open(self.config.redis_url.as_str()).expect("Invalid Redis URL");
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");
        let keys: Vec<String> = conn.keys(format!("{}*", self.name)).await.expect("Failed to list keys");
        if !keys.is_empty() {
            let _: () = conn.del(keys).await.expect("Failed to delete keys");
        }
    }
}

fn message(id: &str) -> NotificationMessage {
    NotificationMessage::from_record(&AppointmentRecord::new(id, "123", CountryCode::Peru)).unwrap()
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_publish_receive_acknowledge() {
    let t = TestChannel::new().await;

    let first = t.channel.publish(&message("1")).await.expect("Failed to publish");
    t.channel.publish(&message("2")).await.expect("Failed to publish");

    let received = t.channel.receive(10, Duration::from_secs(1)).await.expect("Failed to receive");
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].message_id, first);
    assert_eq!(received[0].receive_count, 1);

    let stats = t.channel.stats().await.unwrap();
    assert_eq!((stats.pending, stats.in_flight), (0, 2));

    for message in &received {
        t.channel.acknowledge(message).await.expect("Failed to acknowledge");
    }
    assert_eq!(t.channel.stats().await.unwrap().in_flight, 0);

    t.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_release_redelivers_and_dead_letter_parks() {
    let t = TestChannel::new().await;
    t.channel.publish(&message("1")).await.unwrap();

    let first = t.channel.receive(1, Duration::from_secs(1)).await.unwrap();
    t.channel.release(&first[0]).await.expect("Failed to release");

    let second = t.channel.receive(1, Duration::from_secs(1)).await.unwrap();
    assert_eq!(second[0].message_id, first[0].message_id);
    assert_eq!(second[0].receive_count, 2);

    t.channel.dead_letter(&second[0]).await.expect("Failed to dead-letter");
    let stats = t.channel.stats().await.unwrap();
    assert_eq!((stats.pending, stats.in_flight, stats.dead_lettered), (0, 0, 1));

    t.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_recover_returns_stranded_messages() {
    let t = TestChannel::new().await;
    t.channel.publish(&message("1")).await.unwrap();
    t.channel.receive(1, Duration::from_secs(1)).await.unwrap();

    assert_eq!(t.channel.recover().await.unwrap(), 1);
    assert_eq!(t.channel.stats().await.unwrap().pending, 1);

    t.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn test_receive_on_empty_channel_returns_nothing() {
    let t = TestChannel::new().await;
    let received = t.channel.receive(5, Duration::from_secs(1)).await.unwrap();
    assert!(received.is_empty());
    t.cleanup().await;
}
