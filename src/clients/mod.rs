/// External API clients module
use crate::config::SatCheckerConfig;
use crate::domain::{EphemerisQueryResult, EphemerisRecord, NameLookupRecord};
use crate::errors::TransportError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &SatCheckerConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("score-ingest/0.1")
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// Parameters of an ephemeris lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EphemerisQuery {
    pub catalog_number: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_m: f64,
    pub julian_date: f64,
}

/// Outbound surface of the ephemeris service
#[async_trait]
pub trait EphemerisSource: Send + Sync {
    /// Topocentric ephemeris for a catalog number at a time and place
    async fn query_ephemeris(
        &self,
        query: &EphemerisQuery,
    ) -> Result<EphemerisQueryResult, TransportError>;

    /// Every name a catalog number has been known by
    async fn names_by_catalog_number(
        &self,
        catalog_number: u32,
    ) -> Result<Vec<NameLookupRecord>, TransportError>;

    /// Every catalog number a name has been attached to
    async fn catalog_numbers_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<NameLookupRecord>, TransportError>;
}

/// Wire shape of the ephemeris endpoint: parallel `fields` and `data` arrays
#[derive(Debug, Default, Deserialize)]
struct EphemerisPayload {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

impl EphemerisPayload {
    fn into_records(self) -> Vec<EphemerisRecord> {
        self.data
            .iter()
            .map(|row| EphemerisRecord::from_columns(&self.fields, row))
            .collect()
    }
}

/// Decode a name lookup body, skipping entries that are not records
fn decode_name_records(body: Value) -> Vec<NameLookupRecord> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// SatChecker client
pub struct SatCheckerClient {
    http_client: HttpClient,
    base_url: String,
}

impl SatCheckerClient {
    pub fn new(config: &SatCheckerConfig) -> Result<Self, TransportError> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn lookup(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<NameLookupRecord>, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }

        let body: Value = resp.json().await?;
        Ok(decode_name_records(body))
    }
}

#[async_trait]
impl EphemerisSource for SatCheckerClient {
    async fn query_ephemeris(
        &self,
        query: &EphemerisQuery,
    ) -> Result<EphemerisQueryResult, TransportError> {
        let url = format!("{}/ephemeris/catalog-number/", self.base_url);
        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(&[
                ("catalog", query.catalog_number.to_string()),
                ("latitude", query.latitude_deg.to_string()),
                ("longitude", query.longitude_deg.to_string()),
                ("elevation", query.elevation_m.to_string()),
                ("julian_date", query.julian_date.to_string()),
                ("min_altitude", "-90".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        debug!(
            catalog = query.catalog_number,
            status = status.as_u16(),
            "ephemeris response"
        );
        if status != StatusCode::OK {
            return Ok(EphemerisQueryResult {
                status: status.as_u16(),
                records: Vec::new(),
            });
        }

        let payload: EphemerisPayload = resp.json().await?;
        Ok(EphemerisQueryResult {
            status: status.as_u16(),
            records: payload.into_records(),
        })
    }

    async fn names_by_catalog_number(
        &self,
        catalog_number: u32,
    ) -> Result<Vec<NameLookupRecord>, TransportError> {
        self.lookup(
            "/tools/names-from-norad-id/",
            &[("id", catalog_number.to_string())],
        )
        .await
    }

    async fn catalog_numbers_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<NameLookupRecord>, TransportError> {
        self.lookup("/tools/norad-ids-from-name/", &[("name", name.to_string())])
            .await
    }
}
