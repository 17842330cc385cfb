//! Reverse geocoding over HTTP (Nominatim-compatible `/reverse` endpoint)
//!
//! Request: `GET {base}/reverse?format=json&lat={lat}&lon={lng}` with a
//! descriptive User-Agent. The response's `address` block is read through
//! field chains; non-2xx responses and missing fields are a clean miss
//! (`Ok(None)`). Transport failures and undecodable bodies are errors.

use crate::domain::record::{join_unique, FieldChain, Record};
use crate::domain::types::Coordinates;
use crate::error::GeocodeError;
use crate::infra::config::Config;
use serde::Deserialize;
use tracing::debug;

/// Locality-level fields, most specific first
const LOCALITY: FieldChain = FieldChain::new(&["village", "town", "city", "municipality", "hamlet"]);
/// District-level fields
const DISTRICT: FieldChain = FieldChain::new(&["district", "state_district", "county"]);

/// Common words Nominatim appends to district names
const DISTRICT_SUFFIX: &str = " district";

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Record>,
}

/// Place name from an `address` block: `"{locality}, {district}"` when both
/// are present, either one alone otherwise
pub fn place_from_address(address: &Record) -> Option<String> {
    let locality = LOCALITY.text(address);
    let district = DISTRICT.text(address).map(|d| trim_district_suffix(&d).to_string());
    join_unique([locality.as_deref(), district.as_deref()])
}

fn trim_district_suffix(district: &str) -> &str {
    let cut = district.len().saturating_sub(DISTRICT_SUFFIX.len());
    match (district.get(..cut), district.get(cut..)) {
        (Some(head), Some(tail)) if cut > 0 && tail.eq_ignore_ascii_case(DISTRICT_SUFFIX) => head,
        _ => district,
    }
}

pub struct NominatimClient {
    http: reqwest::Client,
    base_url: String,
    language: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, language: &str) -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder().user_agent(user_agent.to_string()).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GeocodeError> {
        Self::new(config.geocode_base_url(), config.geocode_user_agent(), config.geocode_language())
    }

    /// Reverse geocode one fix. `Ok(None)` is a miss.
    pub async fn reverse(&self, coords: Coordinates) -> Result<Option<String>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", coords.lat.to_string()),
                ("lon", coords.lng.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
                ("accept-language", self.language.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status.as_u16(), coords = %coords, "nominatim_non_success");
            return Ok(None);
        }

        let body = response.text().await?;
        let parsed: ReverseResponse = serde_json::from_str(&body)?;

        Ok(parsed.address.as_ref().and_then(place_from_address))
    }
}
