use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::AppointmentRecord;

use crate::{AppointmentStore, StoreError};

// A completed record is sticky: a late creation retry must not regress it.
const UPSERT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and decoded['status'] == 'completed' then
        return current
    end
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], 'NX', ARGV[2], ARGV[3])
return ARGV[1]
"#;

const MARK_COMPLETED_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return false
end
local decoded = cjson.decode(current)
if decoded['status'] ~= 'completed' then
    decoded['status'] = 'completed'
    current = cjson.encode(decoded)
    redis.call('SET', KEYS[1], current)
end
return current
"#;

/// Master appointment store on Redis.
///
/// Each record lives as a JSON string under `{prefix}:record:{appointmentId}`;
/// a sorted set `{prefix}:insured:{insuredId}` scored by creation time keeps
/// the per-insured insertion order.
pub struct RedisAppointmentStore {
    pool: Pool,
    prefix: String,
    upsert_script: redis::Script,
    mark_completed_script: redis::Script,
}

impl RedisAppointmentStore {
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let pool = Config::from_url(config.redis_url.clone())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(format!("Pool creation error: {}", e)))?;

        let store = Self::from_pool(pool, &config.appointments_key_prefix);

        // Test connection
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis appointment store initialized successfully");

        Ok(store)
    }

    pub fn from_pool(pool: Pool, prefix: &str) -> Self {
        Self {
            pool,
            prefix: prefix.to_string(),
            upsert_script: redis::Script::new(UPSERT_SCRIPT),
            mark_completed_script: redis::Script::new(MARK_COMPLETED_SCRIPT),
        }
    }

    fn record_key(&self, appointment_id: &str) -> String {
        format!("{}:record:{}", self.prefix, appointment_id)
    }

    fn insured_key(&self, insured_id: &str) -> String {
        format!("{}:insured:{}", self.prefix, insured_id)
    }

    async fn get_connection(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl AppointmentStore for RedisAppointmentStore {
    async fn upsert(&self, record: &AppointmentRecord) -> Result<AppointmentRecord, StoreError> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(record)?;
        let score = record.created_at().timestamp_micros() as f64;

        let stored: String = self
            .upsert_script
            .key(self.record_key(record.appointment_id()))
            .key(self.insured_key(record.insured_id()))
            .arg(&data)
            .arg(score)
            .arg(record.appointment_id())
            .invoke_async(&mut conn)
            .await?;

        debug!("Appointment {} upserted", record.appointment_id());
        Ok(serde_json::from_str(&stored)?)
    }

    async fn get(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError> {
        let mut conn = self.get_connection().await?;
        let data: Option<String> = conn.get(self.record_key(appointment_id)).await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_by_insured(&self, insured_id: &str) -> Result<Vec<AppointmentRecord>, StoreError> {
        let mut conn = self.get_connection().await?;

        let ids: Vec<String> = conn.zrange(self.insured_key(insured_id), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.record_key(id)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut records = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(data) = value else { continue };
            match serde_json::from_str::<AppointmentRecord>(&data) {
                // The index entry can outlive a record rewritten for another insured party.
                Ok(record) if record.insured_id() == insured_id => records.push(record),
                Ok(_) => {}
                Err(e) => error!("Skipping unreadable appointment {}: {}", id, e),
            }
        }

        Ok(records)
    }

    async fn mark_completed(&self, appointment_id: &str) -> Result<Option<AppointmentRecord>, StoreError> {
        let mut conn = self.get_connection().await?;

        let stored: Option<String> = self
            .mark_completed_script
            .key(self.record_key(appointment_id))
            .invoke_async(&mut conn)
            .await?;

        match stored {
            Some(data) => {
                debug!("Appointment {} marked completed", appointment_id);
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}
