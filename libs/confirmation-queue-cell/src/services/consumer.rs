use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::{ChannelStats, CountryConsumer, QueueError};

/// Runs every country consumer with its configured number of worker loops,
/// plus a monitoring loop, until `shutdown` is called.
pub struct ConsumerService {
    consumers: Vec<Arc<CountryConsumer>>,
    is_running: Arc<RwLock<bool>>,
}

impl ConsumerService {
    pub fn new(consumers: Vec<CountryConsumer>) -> Self {
        Self {
            consumers: consumers.into_iter().map(Arc::new).collect(),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Blocks until `shutdown` is called and every loop has exited.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), QueueError> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                warn!("Consumer service is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting consumer service with {} country consumers", self.consumers.len());

        // Anything a previous run left in flight goes back to pending first.
        for consumer in &self.consumers {
            if let Err(e) = consumer.channel().recover().await {
                error!("Failed to recover in-flight messages on {}: {}", consumer.channel().name(), e);
            }
        }

        let mut handles = Vec::new();

        for consumer in &self.consumers {
            for i in 0..consumer.config().concurrency {
                let loop_name = format!("{}-{}-{}", consumer.config().worker_id, consumer.country(), i);
                let consumer = Arc::clone(consumer);
                let is_running = Arc::clone(&self.is_running);

                handles.push(tokio::spawn(async move {
                    worker_loop(consumer, is_running, loop_name).await
                }));
            }
        }

        let consumers = self.consumers.clone();
        let is_running = Arc::clone(&self.is_running);
        handles.push(tokio::spawn(async move {
            monitoring_loop(consumers, is_running).await
        }));

        self.wait_for_shutdown().await;
        info!("Shutdown signal received, waiting for worker loops");

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Consumer task ended abnormally: {}", e);
            }
        }

        info!("Consumer service stopped");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating consumer service shutdown");
        *self.is_running.write().await = false;
    }

    pub async fn stats(&self) -> Vec<ChannelStats> {
        let mut stats = Vec::with_capacity(self.consumers.len());
        for consumer in &self.consumers {
            match consumer.channel().stats().await {
                Ok(channel_stats) => stats.push(channel_stats),
                Err(e) => warn!("Failed to read stats for {}: {}", consumer.channel().name(), e),
            }
        }
        stats
    }

    async fn wait_for_shutdown(&self) {
        while *self.is_running.read().await {
            sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn worker_loop(consumer: Arc<CountryConsumer>, is_running: Arc<RwLock<bool>>, loop_name: String) {
    debug!("Worker loop started: {}", loop_name);

    let idle_backoff = Duration::from_millis(consumer.config().idle_backoff_ms);
    let error_backoff = Duration::from_millis(consumer.config().error_backoff_ms);

    while *is_running.read().await {
        match consumer.poll_once().await {
            Ok(report) if report.is_empty() => sleep(idle_backoff).await,
            Ok(report) => debug!("Worker {} processed {} messages", loop_name, report.total()),
            Err(e) => {
                error!("Worker {} failed to receive from {}: {}", loop_name, consumer.channel().name(), e);
                sleep(error_backoff).await;
            }
        }
    }

    debug!("Worker loop ended: {}", loop_name);
}

async fn monitoring_loop(consumers: Vec<Arc<CountryConsumer>>, is_running: Arc<RwLock<bool>>) {
    let period = consumers
        .iter()
        .map(|c| c.config().health_check_interval_seconds)
        .min()
        .unwrap_or(60)
        .max(1);
    let mut ticker = interval(Duration::from_secs(period));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = sleep(Duration::from_millis(200)) => {
                if !*is_running.read().await {
                    break;
                }
                continue;
            }
        }

        if !*is_running.read().await {
            break;
        }

        for consumer in &consumers {
            match consumer.channel().stats().await {
                Ok(stats) => {
                    info!(
                        "Channel {} - pending: {}, in flight: {}, dead-lettered: {}",
                        stats.channel, stats.pending, stats.in_flight, stats.dead_lettered
                    );
                    if stats.dead_lettered > 0 {
                        warn!("Channel {} has {} dead-lettered messages", stats.channel, stats.dead_lettered);
                    }
                }
                Err(e) => error!("Failed to read stats for {}: {}", consumer.channel().name(), e),
            }
        }
    }

    debug!("Monitoring loop ended");
}
