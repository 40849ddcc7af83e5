//! Data models for the backend responses and the dashboard domain.
//!
//! The `*Record` and `*Response` types mirror the backend JSON loosely (every
//! field the backend may omit is optional). They are converted once, at the
//! boundary, into the domain types [`City`], [`Site`] and [`Catalog`], which
//! the aggregation and chart modules work on.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AqVizError;

/// `{lat, lon}` object nested under a site's `coordinates` key.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CoordinatesRecord {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

/// A site as the backend sends it, in any of its shapes.
///
/// `/cities` nests coordinates under `coordinates`, `/sites` flattens them to
/// `lat`/`lon`. Readings arrive as `pm2_5` (or `pm25`) and `pm10`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteRecord {
    pub name: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub coordinates: Option<CoordinatesRecord>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, alias = "pm25")]
    pub pm2_5: Option<f64>,
    #[serde(default)]
    pub pm10: Option<f64>,
}

/// One entry of `GET /api/cities`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CityRecord {
    pub city: String,
    #[serde(default)]
    pub sites_count: Option<usize>,
    #[serde(default)]
    pub sites: Option<Vec<SiteRecord>>,
}

/// Body of `GET /api/cities`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CitiesResponse {
    #[serde(default)]
    pub cities: Vec<CityRecord>,
    #[serde(default)]
    pub total_cities: Option<usize>,
    #[serde(default)]
    pub total_sites: Option<usize>,
}

/// Body of `GET /api/sites?city=<name>`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SitesResponse {
    pub city: String,
    #[serde(default)]
    pub sites: Vec<SiteRecord>,
}

/// One timestamped aggregate in a `/city-data` series.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AggregatedPoint {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub sites_reporting: Option<usize>,
}

/// Explicit keyed reading for one site, when the backend provides it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteReadingRecord {
    pub name: String,
    #[serde(default, alias = "pm25")]
    pub pm2_5: Option<f64>,
    #[serde(default)]
    pub pm10: Option<f64>,
}

/// Body of `GET /api/city-data?city=&start=&end=`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CityDataResponse {
    pub city: String,
    #[serde(default)]
    pub sites_included: Vec<String>,
    #[serde(default)]
    pub pm25_aggregated: Vec<AggregatedPoint>,
    #[serde(default)]
    pub pm10_aggregated: Vec<AggregatedPoint>,
    /// Parallel to `sites_included` when present.
    #[serde(default)]
    pub per_site: Option<Vec<SiteReadingRecord>>,
}

/// Keeps only physically meaningful concentrations.
fn reading(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn coordinate(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// A single monitoring station.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    /// Name of the parent city.
    pub city: String,
    pub site_id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

impl Site {
    /// Builds a site from its wire record, tagging it with `parent_city`.
    ///
    /// A complete nested `coordinates` pair wins over flat `lat`/`lon`; the
    /// two shapes are never mixed. Negative or non-finite
    /// readings are dropped to `None`.
    pub fn from_record(record: SiteRecord, parent_city: &str) -> Self {
        let (lat, lon) = match record.coordinates {
            Some(CoordinatesRecord {
                lat: Some(lat),
                lon: Some(lon),
            }) => (Some(lat), Some(lon)),
            _ => (record.lat, record.lon),
        };
        Self {
            name: record.name,
            city: record.city.unwrap_or_else(|| parent_city.to_string()),
            site_id: record.site_id,
            lat: coordinate(lat),
            lon: coordinate(lon),
            pm25: reading(record.pm2_5),
            pm10: reading(record.pm10),
        }
    }

    /// `(lat, lon)` when both are present; sites without it are not mapped.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

/// An administrative grouping of sites.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub sites: Vec<Site>,
    /// Equals `sites.len()` whenever the backend sent the list.
    pub sites_count: usize,
}

impl City {
    pub fn from_record(record: CityRecord) -> Self {
        let name = record.city;
        match record.sites {
            Some(list) => {
                let sites: Vec<Site> = list
                    .into_iter()
                    .map(|s| Site::from_record(s, &name))
                    .collect();
                if let Some(declared) = record.sites_count {
                    if declared != sites.len() {
                        warn!(
                            city = %name,
                            declared,
                            actual = sites.len(),
                            "sites_count disagrees with site list, using list length"
                        );
                    }
                }
                let sites_count = sites.len();
                Self {
                    name,
                    sites,
                    sites_count,
                }
            }
            None => Self {
                name,
                sites: Vec::new(),
                sites_count: record.sites_count.unwrap_or(0),
            },
        }
    }
}

/// The full city list from one `/cities` response.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Catalog {
    pub cities: Vec<City>,
    declared_total_cities: Option<usize>,
    declared_total_sites: Option<usize>,
}

impl Catalog {
    pub fn new(cities: Vec<City>) -> Self {
        Self {
            cities,
            declared_total_cities: None,
            declared_total_sites: None,
        }
    }

    /// Converts a `/cities` body, rejecting duplicate city names.
    pub fn from_response(response: CitiesResponse) -> Result<Self, AqVizError> {
        let mut seen = HashSet::new();
        for record in &response.cities {
            if !seen.insert(record.city.as_str()) {
                return Err(AqVizError::InvalidApiResponse(format!(
                    "duplicate city '{}' in /cities",
                    record.city
                )));
            }
        }
        Ok(Self {
            declared_total_cities: response.total_cities,
            declared_total_sites: response.total_sites,
            ..Self::new(response.cities.into_iter().map(City::from_record).collect())
        })
    }

    pub fn city(&self, name: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.name == name)
    }

    pub fn total_cities(&self) -> usize {
        self.declared_total_cities.unwrap_or(self.cities.len())
    }

    pub fn total_sites(&self) -> usize {
        self.declared_total_sites
            .unwrap_or_else(|| self.cities.iter().map(|c| c.sites_count).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

impl SitesResponse {
    pub fn into_sites(self) -> Vec<Site> {
        let city = self.city;
        self.sites
            .into_iter()
            .map(|s| Site::from_record(s, &city))
            .collect()
    }
}

impl CityDataResponse {
    /// Reshapes aggregated city data into per-site readings.
    ///
    /// With `per_site`, the list must be parallel to `sites_included` (same
    /// length, same names in the same order) or the response is rejected.
    /// Without it, the last mean of each series is the city's current value
    /// and is attached to every included site.
    pub fn into_sites(self) -> Result<Vec<Site>, AqVizError> {
        let city = self.city;
        if let Some(per_site) = self.per_site {
            if per_site.len() != self.sites_included.len() {
                return Err(AqVizError::InvalidApiResponse(format!(
                    "city-data for {}: {} per-site readings for {} included sites",
                    city,
                    per_site.len(),
                    self.sites_included.len()
                )));
            }
            return per_site
                .into_iter()
                .zip(self.sites_included)
                .map(|(r, included)| {
                    if r.name != included {
                        return Err(AqVizError::InvalidApiResponse(format!(
                            "city-data for {}: reading for '{}' where '{}' was expected",
                            city, r.name, included
                        )));
                    }
                    Ok(Site {
                        name: r.name,
                        city: city.clone(),
                        site_id: None,
                        lat: None,
                        lon: None,
                        pm25: reading(r.pm2_5),
                        pm10: reading(r.pm10),
                    })
                })
                .collect();
        }

        let pm25 = reading(self.pm25_aggregated.last().and_then(|p| p.mean));
        let pm10 = reading(self.pm10_aggregated.last().and_then(|p| p.mean));
        Ok(self
            .sites_included
            .into_iter()
            .map(|name| Site {
                name,
                city: city.clone(),
                site_id: None,
                lat: None,
                lon: None,
                pm25,
                pm10,
            })
            .collect())
    }
}

/// Pollutant tracked by a time-series record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pollutant {
    #[default]
    #[serde(rename = "pm25", alias = "pm2_5", alias = "pm2.5")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
}

impl Pollutant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
        }
    }
}

/// Categorical tag attached to an inference record.
///
/// `none` is the legacy spelling of `normal`. Labels outside the known set
/// deserialize to `Unknown` and count as anomalies.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum AnomalyLabel {
    #[serde(alias = "none")]
    Normal,
    Spike,
    Drop,
    SensorError,
    #[serde(other)]
    Unknown,
}

impl AnomalyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::Normal => "normal",
            AnomalyLabel::Spike => "spike",
            AnomalyLabel::Drop => "drop",
            AnomalyLabel::SensorError => "sensorError",
            AnomalyLabel::Unknown => "unknown",
        }
    }

    pub fn is_anomaly(&self) -> bool {
        *self != AnomalyLabel::Normal
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ML inference record for the anomaly view.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    /// ISO-8601 timestamp.
    pub timestamp: String,
    pub site: String,
    #[serde(default)]
    pub pollutant: Pollutant,
    pub value: f64,
    pub anomaly: AnomalyLabel,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Forecast values for future offsets, nearest first.
    #[serde(default)]
    pub forecast: Vec<f64>,
}

/// Format of the backend's `start`/`end` query parameters.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn parse_date_time(input: &str) -> Result<NaiveDateTime, AqVizError> {
    let trimmed = input.trim();
    NaiveDateTime::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|source| AqVizError::DateParse {
            input: input.to_string(),
            source,
        })
}

/// Validated `[start, end]` window for real-data requests.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    /// Parses both ends and requires `start <= end`.
    pub fn parse(start: &str, end: &str) -> Result<Self, AqVizError> {
        let (start_dt, end_dt) = (parse_date_time(start)?, parse_date_time(end)?);
        if start_dt > end_dt {
            return Err(AqVizError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start: start_dt,
            end: end_dt,
        })
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}
