use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: String,
    pub appointments_key_prefix: String,
    pub channel_pe_name: String,
    pub channel_cl_name: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub confirmed_table_pe: String,
    pub confirmed_table_cl: String,
    pub persistence_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    pub server_port: u16,
    pub worker_id: Option<String>,
    pub worker_concurrency: u32,
    pub worker_batch_size: usize,
    pub max_receive_count: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            redis_url: string_or("REDIS_URL", "redis://localhost:6379"),
            appointments_key_prefix: string_or("APPOINTMENTS_KEY_PREFIX", "appointments"),
            channel_pe_name: string_or("CHANNEL_PE_NAME", "appointments-pe"),
            channel_cl_name: string_or("CHANNEL_CL_NAME", "appointments-cl"),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            confirmed_table_pe: string_or("CONFIRMED_TABLE_PE", "appointments_pe"),
            confirmed_table_cl: string_or("CONFIRMED_TABLE_CL", "appointments_cl"),
            persistence_timeout_ms: parse_or("PERSISTENCE_TIMEOUT_MS", 5000),
            delivery_timeout_ms: parse_or("DELIVERY_TIMEOUT_MS", 5000),
            server_port: parse_or("SERVER_PORT", 3000),
            worker_id: env::var("WORKER_ID").ok().filter(|id| !id.trim().is_empty()),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 2),
            worker_batch_size: parse_or("WORKER_BATCH_SIZE", 10),
            max_receive_count: parse_or("MAX_RECEIVE_COUNT", 5),
        };

        if config.worker_id.is_none() {
            warn!("WORKER_ID not set, workers share the default processing lists");
        }

        if !config.is_confirmed_store_configured() {
            warn!("Confirmed appointment store not configured - country consumers cannot persist");
        }

        config
    }

    pub fn is_confirmed_store_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            appointments_key_prefix: "appointments".to_string(),
            channel_pe_name: "appointments-pe".to_string(),
            channel_cl_name: "appointments-cl".to_string(),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            confirmed_table_pe: "appointments_pe".to_string(),
            confirmed_table_cl: "appointments_cl".to_string(),
            persistence_timeout_ms: 5000,
            delivery_timeout_ms: 5000,
            server_port: 3000,
            worker_id: None,
            worker_concurrency: 2,
            worker_batch_size: 10,
            max_receive_count: 5,
        }
    }
}

fn string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using default {}", key, default);
        default.to_string()
    })
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw, default),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}

fn parse_value<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{} has invalid value {:?}, using default {}", key, raw, default);
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_accepts_numbers_and_trims() {
        assert_eq!(parse_value("X", " 250 ", 5000u64), 250);
        assert_eq!(parse_value("X", "8080", 3000u16), 8080);
    }

    #[test]
    fn parse_value_falls_back_on_garbage() {
        assert_eq!(parse_value("X", "soon", 5000u64), 5000);
        assert_eq!(parse_value("X", "-1", 2u32), 2);
    }

    #[test]
    fn parse_or_uses_default_when_unset() {
        assert_eq!(parse_or("APPOINTMENT_CONFIG_TEST_UNSET_KEY", 7u32), 7);
    }

    #[test]
    fn default_config_uses_country_channels_and_tables() {
        let config = AppConfig::default();
        assert_eq!(config.channel_pe_name, "appointments-pe");
        assert_eq!(config.channel_cl_name, "appointments-cl");
        assert_eq!(config.confirmed_table_pe, "appointments_pe");
        assert_eq!(config.confirmed_table_cl, "appointments_cl");
        assert_eq!(config.persistence_timeout(), Duration::from_secs(5));
        assert!(!config.is_confirmed_store_configured());
    }
}
