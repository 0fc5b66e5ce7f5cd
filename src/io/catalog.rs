//! STAC item search: request construction, response models and the
//! blocking HTTP client.

use crate::types::{FieldError, FieldResult};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Source of catalog search results
pub trait CatalogSearch {
    /// Run an item search with a complete request body
    fn search(&self, request: &Value) -> FieldResult<Value>;
}

/// Look-back window ending at midnight UTC of `today`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    /// `days` before `today`; a start before the calendar range is `InvalidInput`
    pub fn lookback(today: NaiveDate, days: u32) -> FieldResult<Self> {
        let start = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                FieldError::InvalidInput(format!(
                    "Look-back of {} days from {} is out of the date range",
                    days, today
                ))
            })?;
        Ok(Self { start, end: today })
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}T00:00:00Z/{}T00:00:00Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Copy the caller's filter and inject the `datetime` range
pub fn build_search_request(filter: &Map<String, Value>, range: &TimeRange) -> Value {
    let mut request = filter.clone();
    request.insert("datetime".to_string(), Value::String(range.to_string()));
    Value::Object(request)
}

/// A STAC Item Collection (GeoJSON FeatureCollection)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type", default)]
    pub type_: Option<String>,

    pub features: Vec<StacItem>,
}

/// A single STAC Item (GeoJSON Feature)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub assets: BTreeMap<String, StacAsset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

impl StacItem {
    /// EPSG code from `proj:epsg`, or `proj:code` of the form `EPSG:n`
    pub fn epsg(&self) -> Option<u32> {
        if let Some(code) = self.properties.get("proj:epsg").and_then(Value::as_u64) {
            return u32::try_from(code).ok();
        }
        self.properties
            .get("proj:code")
            .and_then(Value::as_str)
            .and_then(|code| code.strip_prefix("EPSG:"))
            .and_then(|code| code.parse().ok())
    }

    /// MGRS UTM zone, stored as a number or a string depending on the catalog
    pub fn utm_zone(&self) -> Option<String> {
        match self.properties.get("mgrs:utm_zone")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// `created`, falling back to `datetime`
    pub fn timestamp(&self) -> Option<&str> {
        self.properties
            .get("created")
            .and_then(Value::as_str)
            .or_else(|| self.properties.get("datetime").and_then(Value::as_str))
    }
}

/// Blocking client for a STAC `/search` endpoint
pub struct StacCatalogClient {
    client: reqwest::blocking::Client,
    search_url: String,
}

impl StacCatalogClient {
    pub fn new(search_url: &str, timeout: std::time::Duration, user_agent: &str) -> FieldResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FieldError::Catalog(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            search_url: search_url.to_string(),
        })
    }
}

impl CatalogSearch for StacCatalogClient {
    fn search(&self, request: &Value) -> FieldResult<Value> {
        log::info!("Searching catalog: {}", self.search_url);
        log::debug!("Search request: {}", request);

        let response = self
            .client
            .post(&self.search_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .json(request)
            .send()
            .map_err(|e| FieldError::Catalog(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FieldError::Catalog(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                self.search_url
            )));
        }

        response
            .json::<Value>()
            .map_err(|e| FieldError::Parse(format!("Search response is not JSON: {}", e)))
    }
}
