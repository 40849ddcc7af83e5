//! HTTP client for the air-quality backend API.
//!
//! Every request has a timeout and is retried once on a transient failure
//! (connect error, timeout, 5xx). Bodies are converted into domain types at
//! this boundary so the rest of the crate never sees wire shapes.

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::AqVizError;
use crate::models::{Catalog, CitiesResponse, CityDataResponse, DateRange, Site, SitesResponse};

const USER_AGENT: &str = concat!("aqviz/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    /// Always ends with `/`, e.g. `http://localhost:8000/api/`.
    api_base: Url,
}

impl BackendClient {
    /// `api_base` is the backend's `/api` root, with or without trailing `/`.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, AqVizError> {
        let normalized = format!("{}/", api_base.trim_end_matches('/'));
        let api_base = Url::parse(&normalized).map_err(|e| {
            AqVizError::InvalidUrl(format!("'{}': {}", api_base, e))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, AqVizError> {
        let mut url = self.api_base.join(path).map_err(|e| {
            AqVizError::InvalidUrl(format!("endpoint '{}': {}", path, e))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, AqVizError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AqVizError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AqVizError> {
        debug!(%url, "GET");
        match self.get_once(&url).await {
            Err(e) if e.is_transient() => {
                warn!(%url, error = %e, "transient backend failure, retrying once");
                self.get_once(&url).await
            }
            other => other,
        }
    }

    /// `GET /api/cities`.
    pub async fn fetch_cities(&self) -> Result<Catalog, AqVizError> {
        let url = self.endpoint("cities", &[])?;
        let response: CitiesResponse = self.get_json(url).await?;
        let catalog = Catalog::from_response(response)?;
        info!(
            cities = catalog.cities.len(),
            sites = catalog.total_sites(),
            "loaded city catalog"
        );
        Ok(catalog)
    }

    /// `GET /api/sites?city=<name>` (mock readings).
    pub async fn fetch_sites(&self, city: &str) -> Result<Vec<Site>, AqVizError> {
        let url = self.endpoint("sites", &[("city", city)])?;
        let response: SitesResponse = self.get_json(url).await?;
        Ok(response.into_sites())
    }

    /// `GET /api/city-data?city=&start=&end=` (real aggregated readings).
    pub async fn fetch_city_data(
        &self,
        city: &str,
        range: &DateRange,
    ) -> Result<Vec<Site>, AqVizError> {
        let (start, end) = (range.start_param(), range.end_param());
        let url = self.endpoint(
            "city-data",
            &[("city", city), ("start", &start), ("end", &end)],
        )?;
        let response: CityDataResponse = self.get_json(url).await?;
        response.into_sites()
    }
}
