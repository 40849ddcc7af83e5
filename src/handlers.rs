use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::Context;
use tracing::{error, warn};

use crate::aqi::{band_table, AqiBand};
use crate::chart::{marker_color, series_by_site, to_site_bars};
use crate::controller::{DataSource, Tab};
use crate::data::{anomaly_summary, AnomalyCount};
use crate::error::AqVizError;
use crate::geo::{city_centroids, compute_bounds, flatten_sites};
use crate::metrics::{average_pm, PmAverages};
use crate::models::{AnomalyLabel, Pollutant, TimeSeriesRecord};
use crate::state::AppState;

/// Query parameters for the tab switch.
#[derive(Debug, Deserialize)]
pub struct TabQuery {
    pub tab: Tab,
}

#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub city: String,
}

#[derive(Debug, Deserialize)]
pub struct SiteQuery {
    pub site: String,
}

/// Query parameters for the mock/real toggle. `start`/`end` only matter
/// for `source=real`; omitting them keeps the current range.
#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub source: DataSource,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub end: Option<String>,
}

/// Query parameters for the anomaly page and series endpoint.
#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    #[serde(default)]
    pub pollutant: Pollutant,
    /// Keep every Nth record of each site's series.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub every: Option<usize>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub site: Option<String>,
    /// Highlighted point, position in the un-sampled series.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub index: Option<usize>,
}

fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn empty_string_as_none_str<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => Ok(Some(s)),
    }
}

fn render_template(
    tera: &tera::Tera,
    template: &str,
    context: &Context,
) -> Result<Html<String>, (StatusCode, &'static str)> {
    tera.render(template, context).map(Html).map_err(|e| {
        error!("Template render error for '{}': {}", template, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Render error")
    })
}

fn selection_error(e: AqVizError) -> (StatusCode, String) {
    warn!(error = %e, "rejected selection");
    match e {
        AqVizError::UnknownCity(_) | AqVizError::UnknownSite(_) => {
            (StatusCode::NOT_FOUND, e.to_string())
        }
        _ => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// An average with its AQI band, as shown in the sites panel.
#[derive(Debug, Serialize, PartialEq)]
pub struct AverageView {
    pub pollutant: &'static str,
    pub value: Option<f64>,
    pub band: Option<&'static str>,
    pub color: Option<&'static str>,
}

fn average_views(averages: &PmAverages) -> [AverageView; 2] {
    let (pm25_band, pm10_band) = averages.bands();
    let view = |pollutant: Pollutant, value: Option<f64>, band: Option<AqiBand>| AverageView {
        pollutant: pollutant.display_name(),
        value,
        band: band.map(|b| b.label()),
        color: band.map(|b| b.color()),
    };
    [
        view(Pollutant::Pm25, averages.pm25, pm25_band),
        view(Pollutant::Pm10, averages.pm10, pm10_band),
    ]
}

/// One site's records for `pollutant`, in fixture order. Positions match
/// the `index` of the points `series_by_site` produces for that site.
fn site_series<'a>(
    records: &'a [TimeSeriesRecord],
    pollutant: Pollutant,
    site: &str,
) -> Vec<&'a TimeSeriesRecord> {
    records
        .iter()
        .filter(|r| r.pollutant == pollutant && r.site == site)
        .collect()
}

#[derive(Debug, Serialize)]
struct LegendEntry {
    label: &'static str,
    color: &'static str,
}

fn legend(pollutant: Pollutant) -> Vec<LegendEntry> {
    [
        AnomalyLabel::Spike,
        AnomalyLabel::Drop,
        AnomalyLabel::SensorError,
        AnomalyLabel::Unknown,
    ]
    .into_iter()
    .map(|label| LegendEntry {
        label: label.as_str(),
        color: marker_color(label, pollutant == Pollutant::Pm10),
    })
    .collect()
}

/// GET / - Landing page.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.snapshot().await;

    let mut context = Context::new();
    context.insert(
        "total_cities",
        &dashboard.cities.data().map(|c| c.total_cities()),
    );
    context.insert(
        "total_sites",
        &dashboard.cities.data().map(|c| c.total_sites()),
    );
    render_template(&state.tera, "home.html", &context)
}

/// GET /aqi-info - AQI reference table.
pub async fn aqi_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut context = Context::new();
    context.insert("bands", &band_table());
    render_template(&state.tera, "aqi_info.html", &context)
}

/// GET /dashboard - Raw data dashboard.
pub async fn dashboard_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.snapshot().await;
    let sites = dashboard.current_sites().to_vec();
    let averages = average_pm(&sites);

    let mut context = Context::new();
    context.insert("dashboard", &dashboard);
    context.insert("sites", &sites);
    context.insert("averages", &average_views(&averages));
    context.insert("start", &dashboard.view.date_range.start_param());
    context.insert("end", &dashboard.view.date_range.end_param());
    render_template(&state.tera, "dashboard.html", &context)
}

fn anomaly_context(
    records: &[TimeSeriesRecord],
    query: &AnomalyQuery,
    series: &[&TimeSeriesRecord],
    selected_index: Option<usize>,
    summary: &[AnomalyCount],
) -> Context {
    let sites: Vec<&str> = records
        .iter()
        .map(|r| r.site.as_str())
        .sorted_unstable()
        .dedup()
        .collect();
    let selected = selected_index.and_then(|i| series.get(i).copied());

    let mut context = Context::new();
    context.insert("pollutant", query.pollutant.as_str());
    context.insert("pollutant_name", query.pollutant.display_name());
    context.insert("every", &query.every.unwrap_or(1));
    context.insert("site", &query.site);
    context.insert("sites", &sites);
    context.insert("last_index", &series.len().checked_sub(1));
    context.insert("selected_index", &selected_index);
    context.insert("selected", &selected);
    context.insert("summary", summary);
    context.insert("legend", &legend(query.pollutant));
    context
}

/// GET /anomaly - Anomaly detection view over the inference fixture.
///
/// A point can only be highlighted within one site's series; its index is
/// the same one the chart points carry.
pub async fn anomaly_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomalyQuery>,
) -> impl IntoResponse {
    let records = &state.anomalies.records;
    let series = match query.site.as_deref() {
        Some(site) => site_series(records, query.pollutant, site),
        None => Vec::new(),
    };
    let selected_index = state
        .dashboard
        .select_time_index(query.index, series.len())
        .await;

    let summary = match anomaly_summary(&state.anomalies.df) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Anomaly summary error: {}", e);
            Vec::new()
        }
    };

    let context = anomaly_context(records, &query, &series, selected_index, &summary);
    render_template(&state.tera, "anomaly.html", &context)
}

/// GET /dashboard/tab - Switch between map and sites.
pub async fn select_tab(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TabQuery>,
) -> Redirect {
    state.dashboard.select_tab(query.tab).await;
    Redirect::to("/dashboard")
}

/// GET /dashboard/city - Select a city and load its sites.
pub async fn select_city(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> Result<Redirect, (StatusCode, String)> {
    state
        .dashboard
        .select_city(&query.city)
        .await
        .map_err(selection_error)?;
    Ok(Redirect::to("/dashboard"))
}

/// GET /dashboard/site - Select a site of the current city.
pub async fn select_site(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SiteQuery>,
) -> Result<Redirect, (StatusCode, String)> {
    state
        .dashboard
        .select_site(&query.site)
        .await
        .map_err(selection_error)?;
    Ok(Redirect::to("/dashboard"))
}

/// GET /dashboard/source - Toggle mock/real readings.
///
/// A rejected date range is reported through the dashboard notice, so the
/// visitor is sent back to the dashboard either way.
pub async fn select_source(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Redirect {
    let _ = state
        .dashboard
        .set_data_source(query.source, query.start.as_deref(), query.end.as_deref())
        .await;
    Redirect::to("/dashboard")
}

/// GET /api/map - Bounds, city markers and site markers.
pub async fn api_map(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.snapshot().await;
    let Some(catalog) = dashboard.cities.data() else {
        return Json(serde_json::json!({
            "status": dashboard.cities,
            "bounds": null,
            "centroids": [],
            "sites": [],
            "total_cities": 0,
            "total_sites": 0
        }));
    };

    let sites = flatten_sites(&catalog.cities);
    let bounds = compute_bounds(&sites);
    let centroids: Vec<_> = city_centroids(&catalog.cities)
        .into_iter()
        .filter(|c| c.centroid.is_renderable())
        .collect();
    let mappable: Vec<_> = sites.iter().filter(|s| s.position().is_some()).collect();

    Json(serde_json::json!({
        "status": "ready",
        "bounds": bounds,
        "center": bounds.map(|b| b.center()),
        "centroids": centroids,
        "sites": mappable,
        "selected_city": dashboard.view.selected_city,
        "total_cities": catalog.total_cities(),
        "total_sites": catalog.total_sites()
    }))
}

/// GET /api/site-bars - Bar chart data and averages for the selected city.
pub async fn api_site_bars(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.snapshot().await;
    let sites = dashboard.current_sites();
    let averages = average_pm(sites);

    Json(serde_json::json!({
        "city": dashboard.view.selected_city,
        "source": dashboard.view.data_source,
        "bars": to_site_bars(sites),
        "averages": average_views(&averages)
    }))
}

/// GET /api/anomaly-series - Downsampled per-site series grouped by label.
pub async fn api_anomaly_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomalyQuery>,
) -> impl IntoResponse {
    let every = query.every.unwrap_or(1);
    let series = series_by_site(
        &state.anomalies.records,
        query.pollutant,
        query.site.as_deref(),
        every,
    );
    Json(serde_json::json!({
        "pollutant": query.pollutant,
        "every": every,
        "series": series,
        "legend": legend(query.pollutant)
    }))
}

/// GET /api/anomaly-summary - Anomaly counts per site and label using Polars.
pub async fn api_anomaly_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match anomaly_summary(&state.anomalies.df) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!("Polars aggregation error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Aggregation error").into_response()
        }
    }
}

/// GET /health - Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
