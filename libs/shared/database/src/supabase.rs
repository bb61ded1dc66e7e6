use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::{AppointmentRecord, CountryCode};

use crate::{ConfirmedAppointmentStore, StoreError};

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_credentials(&config.supabase_url, &config.supabase_anon_key)
    }

    pub fn with_credentials(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn get_headers(&self, prefer: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_str(prefer)?);
        }

        Ok(headers)
    }

    fn build(&self, method: Method, path: &str, prefer: Option<&str>, body: Option<Value>) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut req = self.client.request(method, &url).headers(self.get_headers(prefer)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        Ok(req)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }
        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.build(method, path, None, body)?.send().await?;
        let data = Self::check(response).await?.json::<T>().await?;
        Ok(data)
    }

    /// Sends a request whose response body is irrelevant (e.g. `return=minimal` writes).
    pub async fn execute(&self, method: Method, path: &str, prefer: Option<&str>, body: Option<Value>) -> Result<()> {
        let response = self.build(method, path, prefer, body)?.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// Row shape of the per-country confirmed appointment tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedAppointmentRow {
    pub appointment_id: String,
    pub insured_id: String,
    pub country_code: CountryCode,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&AppointmentRecord> for ConfirmedAppointmentRow {
    fn from(record: &AppointmentRecord) -> Self {
        Self {
            appointment_id: record.appointment_id().to_string(),
            insured_id: record.insured_id().to_string(),
            country_code: record.country_code(),
            status: record.status().to_string(),
            created_at: record.created_at(),
        }
    }
}

/// Confirmed appointment store for one country, backed by a PostgREST table
/// with a unique `appointment_id` column.
pub struct SupabaseConfirmedStore {
    client: SupabaseClient,
    country: CountryCode,
    table: String,
}

impl SupabaseConfirmedStore {
    pub fn new(client: SupabaseClient, country: CountryCode, table: impl Into<String>) -> Self {
        Self {
            client,
            country,
            table: table.into(),
        }
    }

    pub fn for_country(config: &AppConfig, country: CountryCode) -> Self {
        let table = match country {
            CountryCode::Peru => &config.confirmed_table_pe,
            CountryCode::Chile => &config.confirmed_table_cl,
        };
        info!("Confirmed store for {} bound to table {}", country, table);
        Self::new(SupabaseClient::new(config), country, table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl ConfirmedAppointmentStore for SupabaseConfirmedStore {
    fn country(&self) -> CountryCode {
        self.country
    }

    async fn upsert_confirmed(&self, record: &AppointmentRecord) -> Result<(), StoreError> {
        let row = serde_json::to_value(ConfirmedAppointmentRow::from(record))?;
        let path = format!("/rest/v1/{}?on_conflict=appointment_id", self.table);

        self.client
            .execute(
                Method::POST,
                &path,
                Some("resolution=merge-duplicates,return=minimal"),
                Some(Value::Array(vec![row])),
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!("Confirmed appointment {} stored in {}", record.appointment_id(), self.table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> SupabaseConfirmedStore {
        SupabaseConfirmedStore::new(
            SupabaseClient::with_credentials(&server.uri(), "test-anon-key"),
            CountryCode::Peru,
            "appointments_pe",
        )
    }

    #[tokio::test]
    async fn upsert_posts_merge_duplicates_to_country_table() {
        let server = MockServer::start().await;
        let record = AppointmentRecord::new("456", "123", CountryCode::Peru);

        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments_pe"))
            .and(query_param("on_conflict", "appointment_id"))
            .and(header("apikey", "test-anon-key"))
            .and(headers("Prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
            .and(body_json(json!([{
                "appointment_id": "456",
                "insured_id": "123",
                "country_code": "PE",
                "status": "pending",
                "created_at": record.created_at(),
            }])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let result = store.upsert_confirmed(&record).await;

        assert!(result.is_ok(), "Upsert should succeed: {:?}", result);
        assert_eq!(store.country(), CountryCode::Peru);
    }

    #[tokio::test]
    async fn upsert_surfaces_backend_failures() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments_pe"))
            .respond_with(ResponseTemplate::new(503).set_body_string("database unavailable"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let record = AppointmentRecord::new("456", "123", CountryCode::Peru);

        assert_matches!(
            store.upsert_confirmed(&record).await,
            Err(StoreError::Backend(msg)) if msg.contains("database unavailable")
        );
    }

    #[tokio::test]
    async fn request_decodes_json_payloads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments_pe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"appointment_id": "456"}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::with_credentials(&server.uri(), "test-anon-key");
        let rows: Vec<Value> = client
            .request(Method::GET, "/rest/v1/appointments_pe", None)
            .await
            .expect("Request should succeed");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["appointment_id"], "456");
    }
}
