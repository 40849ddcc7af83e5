//! Dashboard view state and fetch orchestration.
//!
//! [`ViewState`] is an immutable value; every user action produces a new one
//! through a `with_*` transition. [`DashboardController`] owns the current
//! state plus one [`PanelState`] per panel, and drives backend fetches.
//!
//! Fetches are never cancelled. Each one takes a [`Ticket`] from the
//! [`RequestTracker`] before it starts; when it completes, its result is
//! applied only if that ticket is still the latest for its panel and the
//! selection it was issued for is still current. A slow, superseded
//! response is dropped on arrival.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::AqVizError;
use crate::fetcher::BackendClient;
use crate::models::{Catalog, DateRange, Site};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Map,
    Sites,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Mock,
    Real,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ViewState {
    pub active_tab: Tab,
    pub selected_city: Option<String>,
    pub selected_site: Option<String>,
    pub data_source: DataSource,
    /// Used when `data_source` is `Real`; always a valid range.
    pub date_range: DateRange,
    /// Highlighted point in the anomaly series.
    pub selected_time_index: Option<usize>,
}

/// The selection a sites-panel fetch is issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum SitesQuery {
    Mock { city: String },
    Real { city: String, range: DateRange },
}

impl ViewState {
    pub fn new(date_range: DateRange) -> Self {
        Self {
            active_tab: Tab::default(),
            selected_city: None,
            selected_site: None,
            data_source: DataSource::default(),
            date_range,
            selected_time_index: None,
        }
    }

    pub fn with_tab(&self, tab: Tab) -> Self {
        Self {
            active_tab: tab,
            ..self.clone()
        }
    }

    /// Selects `city` and resets the site to the city's first site.
    pub fn with_city(&self, catalog: &Catalog, city: &str) -> Result<Self, AqVizError> {
        let entry = catalog
            .city(city)
            .ok_or_else(|| AqVizError::UnknownCity(city.to_string()))?;
        Ok(Self {
            selected_city: Some(entry.name.clone()),
            selected_site: entry.sites.first().map(|s| s.name.clone()),
            ..self.clone()
        })
    }

    pub fn with_site(&self, sites: &[Site], site: &str) -> Result<Self, AqVizError> {
        let entry = sites
            .iter()
            .find(|s| s.name == site)
            .ok_or_else(|| AqVizError::UnknownSite(site.to_string()))?;
        Ok(Self {
            selected_site: Some(entry.name.clone()),
            ..self.clone()
        })
    }

    /// Switches the data source; `range` replaces the current one when given.
    pub fn with_source(&self, source: DataSource, range: Option<DateRange>) -> Self {
        Self {
            data_source: source,
            date_range: range.unwrap_or_else(|| self.date_range.clone()),
            ..self.clone()
        }
    }

    /// Re-anchors the selection after a new catalog replaced the old one.
    ///
    /// A city that survived keeps its selection; otherwise the first city
    /// (and its first site) is selected, or nothing for an empty catalog.
    pub fn with_catalog(&self, catalog: &Catalog) -> Self {
        match self.selected_city.as_deref().and_then(|name| catalog.city(name)) {
            Some(city) => {
                let site_known = city.sites.is_empty()
                    || self
                        .selected_site
                        .as_deref()
                        .is_some_and(|name| city.sites.iter().any(|s| s.name == name));
                if site_known {
                    self.clone()
                } else {
                    Self {
                        selected_site: city.sites.first().map(|s| s.name.clone()),
                        ..self.clone()
                    }
                }
            }
            None => {
                let first = catalog.cities.first();
                Self {
                    selected_city: first.map(|c| c.name.clone()),
                    selected_site: first
                        .and_then(|c| c.sites.first())
                        .map(|s| s.name.clone()),
                    ..self.clone()
                }
            }
        }
    }

    /// Keeps the selected site if the freshly loaded list still has it,
    /// otherwise falls back to the first loaded site.
    pub fn with_sites_loaded(&self, sites: &[Site]) -> Self {
        let still_present = self
            .selected_site
            .as_deref()
            .is_some_and(|name| sites.iter().any(|s| s.name == name));
        if still_present {
            return self.clone();
        }
        Self {
            selected_site: sites.first().map(|s| s.name.clone()),
            ..self.clone()
        }
    }

    /// Clamps `index` into a series of `series_len` points.
    pub fn with_time_index(&self, index: Option<usize>, series_len: usize) -> Self {
        let clamped = match (index, series_len) {
            (_, 0) | (None, _) => None,
            (Some(i), n) => Some(i.min(n - 1)),
        };
        Self {
            selected_time_index: clamped,
            ..self.clone()
        }
    }

    pub fn sites_query(&self) -> Option<SitesQuery> {
        let city = self.selected_city.clone()?;
        Some(match self.data_source {
            DataSource::Mock => SitesQuery::Mock { city },
            DataSource::Real => SitesQuery::Real {
                city,
                range: self.date_range.clone(),
            },
        })
    }
}

/// Independently failing regions of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    Cities,
    Sites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    panel: Panel,
    token: u64,
}

/// Monotonic request-sequence tokens, one counter per panel.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    latest: HashMap<Panel, u64>,
}

impl RequestTracker {
    pub fn issue(&mut self, panel: Panel) -> Ticket {
        let token = self.latest.entry(panel).or_insert(0);
        *token += 1;
        Ticket {
            panel,
            token: *token,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.panel) == Some(&ticket.token)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum PanelState<T> {
    Idle,
    Loading,
    /// Valid response with nothing in it.
    Empty,
    Ready(T),
    Error(String),
}

impl<T> PanelState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            PanelState::Ready(data) => Some(data),
            _ => None,
        }
    }
}

/// Everything the dashboard page renders.
#[derive(Debug, Serialize, Clone)]
pub struct Dashboard {
    pub view: ViewState,
    pub cities: PanelState<Catalog>,
    pub sites: PanelState<Vec<Site>>,
    /// Last local validation failure, shown next to the controls.
    pub notice: Option<String>,
    /// Set when a refresh failed while an older catalog stays on display.
    pub refresh_error: Option<String>,
    #[serde(skip)]
    tracker: RequestTracker,
}

impl Dashboard {
    fn new(date_range: DateRange) -> Self {
        Self {
            view: ViewState::new(date_range),
            cities: PanelState::Idle,
            sites: PanelState::Idle,
            notice: None,
            refresh_error: None,
            tracker: RequestTracker::default(),
        }
    }

    /// Sites of the selected city: the loaded list, else the catalog's.
    pub fn current_sites(&self) -> &[Site] {
        if let Some(sites) = self.sites.data() {
            return sites;
        }
        self.view
            .selected_city
            .as_deref()
            .and_then(|name| self.cities.data().and_then(|c| c.city(name)))
            .map(|city| city.sites.as_slice())
            .unwrap_or(&[])
    }
}

pub struct DashboardController {
    backend: BackendClient,
    dashboard: RwLock<Dashboard>,
}

impl DashboardController {
    pub fn new(backend: BackendClient, date_range: DateRange) -> Self {
        Self {
            backend,
            dashboard: RwLock::new(Dashboard::new(date_range)),
        }
    }

    pub async fn snapshot(&self) -> Dashboard {
        self.dashboard.read().await.clone()
    }

    /// Fetches the city catalog, replacing the previous one, then reloads
    /// the sites panel if the selection moved (or was never loaded).
    ///
    /// A loaded catalog stays in place while a refresh is in flight and is
    /// only replaced by a newer response; a failed refresh is reported in
    /// `refresh_error` instead.
    pub async fn load_cities(&self) {
        let ticket = {
            let mut d = self.dashboard.write().await;
            if d.cities.data().is_none() {
                d.cities = PanelState::Loading;
            }
            d.tracker.issue(Panel::Cities)
        };

        let result = self.backend.fetch_cities().await;

        let reload_sites = {
            let mut d = self.dashboard.write().await;
            if !d.tracker.is_current(&ticket) {
                debug!("discarding superseded city catalog response");
                return;
            }
            let before = d.view.sites_query();
            match result {
                Ok(catalog) => {
                    d.view = d.view.with_catalog(&catalog);
                    d.refresh_error = None;
                    d.cities = if catalog.is_empty() {
                        PanelState::Empty
                    } else {
                        PanelState::Ready(catalog)
                    };
                }
                Err(e) if d.cities.data().is_some() => {
                    warn!(
                        panel = "cities",
                        error = %e,
                        "catalog refresh failed, keeping previous catalog"
                    );
                    d.refresh_error = Some(e.to_string());
                }
                Err(e) => {
                    error!(panel = "cities", error = %e, "failed to load city catalog");
                    d.cities = PanelState::Error(e.to_string());
                }
            }
            d.view.sites_query() != before || matches!(d.sites, PanelState::Idle)
        };

        if reload_sites {
            self.load_sites().await;
        }
    }

    /// Fetches readings for the current selection into the sites panel.
    pub async fn load_sites(&self) {
        let (ticket, query) = {
            let mut d = self.dashboard.write().await;
            let ticket = d.tracker.issue(Panel::Sites);
            let Some(query) = d.view.sites_query() else {
                d.sites = PanelState::Idle;
                return;
            };
            d.sites = PanelState::Loading;
            (ticket, query)
        };

        let result = match &query {
            SitesQuery::Mock { city } => self.backend.fetch_sites(city).await,
            SitesQuery::Real { city, range } => self.backend.fetch_city_data(city, range).await,
        };

        let mut d = self.dashboard.write().await;
        if !d.tracker.is_current(&ticket) || d.view.sites_query().as_ref() != Some(&query) {
            info!(?query, "discarding superseded sites response");
            return;
        }
        match result {
            Ok(sites) => {
                d.view = d.view.with_sites_loaded(&sites);
                d.sites = if sites.is_empty() {
                    PanelState::Empty
                } else {
                    PanelState::Ready(sites)
                };
            }
            Err(e) => {
                error!(panel = "sites", ?query, error = %e, "failed to load sites");
                d.sites = PanelState::Error(e.to_string());
            }
        }
    }

    pub async fn select_tab(&self, tab: Tab) {
        let mut d = self.dashboard.write().await;
        d.view = d.view.with_tab(tab);
    }

    pub async fn select_city(&self, city: &str) -> Result<(), AqVizError> {
        {
            let mut d = self.dashboard.write().await;
            let next = match d.cities.data() {
                Some(catalog) => d.view.with_city(catalog, city)?,
                None => return Err(AqVizError::UnknownCity(city.to_string())),
            };
            d.view = next;
            d.notice = None;
        }
        self.load_sites().await;
        Ok(())
    }

    pub async fn select_site(&self, site: &str) -> Result<(), AqVizError> {
        let mut d = self.dashboard.write().await;
        let next = d.view.with_site(d.current_sites(), site)?;
        d.view = next;
        Ok(())
    }

    /// Switches between mock and real readings.
    ///
    /// For `Real`, a supplied `start`/`end` pair must parse and satisfy
    /// `start <= end`; otherwise nothing changes, no request is sent, and the
    /// failure is recorded as the dashboard notice.
    pub async fn set_data_source(
        &self,
        source: DataSource,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<(), AqVizError> {
        let range = match (source, start, end) {
            (DataSource::Real, Some(start), Some(end)) => match DateRange::parse(start, end) {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(error = %e, "rejected date range, request not sent");
                    self.dashboard.write().await.notice = Some(e.to_string());
                    return Err(e);
                }
            },
            _ => None,
        };
        {
            let mut d = self.dashboard.write().await;
            d.view = d.view.with_source(source, range);
            d.notice = None;
        }
        self.load_sites().await;
        Ok(())
    }

    /// Stores the highlighted point and returns it after clamping.
    pub async fn select_time_index(
        &self,
        index: Option<usize>,
        series_len: usize,
    ) -> Option<usize> {
        let mut d = self.dashboard.write().await;
        d.view = d.view.with_time_index(index, series_len);
        d.view.selected_time_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{client, spawn_backend};
    use crate::models::City;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn range() -> DateRange {
        DateRange::parse("2024-03-10T00:00", "2024-03-15T23:59").unwrap()
    }

    fn site(name: &str, city: &str) -> Site {
        Site {
            name: name.into(),
            city: city.into(),
            site_id: None,
            lat: Some(18.5),
            lon: Some(73.8),
            pm25: Some(40.0),
            pm10: Some(80.0),
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            City {
                name: "Mumbai".into(),
                sites: vec![site("Bandra", "Mumbai"), site("Colaba", "Mumbai")],
                sites_count: 2,
            },
            City {
                name: "Pune".into(),
                sites: vec![site("Shivajinagar", "Pune")],
                sites_count: 1,
            },
            City {
                name: "Nagpur".into(),
                sites: vec![],
                sites_count: 0,
            },
        ])
    }

    mod view_state_tests {
        use super::*;

        #[test]
        fn test_city_change_resets_site() {
            let view = ViewState::new(range())
                .with_city(&catalog(), "Mumbai")
                .unwrap()
                .with_site(&catalog().cities[0].sites, "Colaba")
                .unwrap();
            assert_eq!(view.selected_site.as_deref(), Some("Colaba"));

            let view = view.with_city(&catalog(), "Pune").unwrap();
            assert_eq!(view.selected_city.as_deref(), Some("Pune"));
            assert_eq!(view.selected_site.as_deref(), Some("Shivajinagar"));
        }

        #[test]
        fn test_city_without_sites_clears_site() {
            let view = ViewState::new(range())
                .with_city(&catalog(), "Nagpur")
                .unwrap();
            assert_eq!(view.selected_site, None);
        }

        #[test]
        fn test_unknown_city_rejected() {
            let err = ViewState::new(range())
                .with_city(&catalog(), "Atlantis")
                .unwrap_err();
            assert!(matches!(err, AqVizError::UnknownCity(_)));
        }

        #[test]
        fn test_transitions_do_not_mutate_original() {
            let view = ViewState::new(range());
            let sites_tab = view.with_tab(Tab::Sites);
            assert_eq!(view.active_tab, Tab::Map);
            assert_eq!(sites_tab.active_tab, Tab::Sites);
        }

        #[test]
        fn test_catalog_refresh_drops_vanished_city() {
            let view = ViewState::new(range())
                .with_city(&catalog(), "Pune")
                .unwrap();
            let smaller = Catalog::new(vec![catalog().cities[0].clone()]);
            let view = view.with_catalog(&smaller);
            assert_eq!(view.selected_city.as_deref(), Some("Mumbai"));
            assert_eq!(view.selected_site.as_deref(), Some("Bandra"));

            let view = view.with_catalog(&Catalog::default());
            assert_eq!(view.selected_city, None);
            assert_eq!(view.selected_site, None);
        }

        #[test]
        fn test_sites_loaded_reconciles_selection() {
            let view = ViewState::new(range())
                .with_city(&catalog(), "Mumbai")
                .unwrap();
            let view = view.with_sites_loaded(&[site("site_201", "Mumbai")]);
            assert_eq!(view.selected_site.as_deref(), Some("site_201"));
            let view = view.with_sites_loaded(&[]);
            assert_eq!(view.selected_site, None);
        }

        #[test]
        fn test_time_index_clamped() {
            let view = ViewState::new(range());
            assert_eq!(view.with_time_index(Some(40), 10).selected_time_index, Some(9));
            assert_eq!(view.with_time_index(Some(3), 10).selected_time_index, Some(3));
            assert_eq!(view.with_time_index(Some(3), 0).selected_time_index, None);
        }

        #[test]
        fn test_sites_query_follows_source() {
            let view = ViewState::new(range());
            assert_eq!(view.sites_query(), None);
            let view = view.with_city(&catalog(), "Pune").unwrap();
            assert_eq!(
                view.sites_query(),
                Some(SitesQuery::Mock {
                    city: "Pune".into()
                })
            );
            let view = view.with_source(DataSource::Real, None);
            assert_eq!(
                view.sites_query(),
                Some(SitesQuery::Real {
                    city: "Pune".into(),
                    range: range()
                })
            );
        }
    }

    mod tracker_tests {
        use super::*;

        #[test]
        fn test_newer_ticket_supersedes() {
            let mut tracker = RequestTracker::default();
            let first = tracker.issue(Panel::Sites);
            let second = tracker.issue(Panel::Sites);
            assert!(!tracker.is_current(&first));
            assert!(tracker.is_current(&second));
        }

        #[test]
        fn test_panels_are_independent() {
            let mut tracker = RequestTracker::default();
            let cities = tracker.issue(Panel::Cities);
            tracker.issue(Panel::Sites);
            assert!(tracker.is_current(&cities));
        }
    }

    mod controller_tests {
        use super::*;

        fn cities_body() -> serde_json::Value {
            serde_json::json!({
                "cities": [
                    {"city": "Mumbai", "sites": [{"name": "Bandra", "lat": 19.05, "lon": 72.84}]},
                    {"city": "Pune", "sites": [{"name": "Shivajinagar", "lat": 18.53, "lon": 73.85}]}
                ]
            })
        }

        /// `/sites` answers Pune after 300 ms and every other city at once.
        fn backend(city_data_hits: Arc<AtomicUsize>) -> Router {
            Router::new()
                .route("/api/cities", get(|| async { Json(cities_body()) }))
                .route(
                    "/api/sites",
                    get(|Query(params): Query<HashMap<String, String>>| async move {
                        let city = params.get("city").cloned().unwrap_or_default();
                        if city == "Pune" {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                        }
                        let site_name = format!("{}-1", city.to_lowercase());
                        Json(serde_json::json!({
                            "city": city,
                            "sites": [{"name": site_name, "pm2_5": 30.0, "pm10": 60.0}]
                        }))
                    }),
                )
                .route(
                    "/api/city-data",
                    get(move || {
                        let hits = city_data_hits.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            Json(serde_json::json!({
                                "city": "Mumbai",
                                "sites_included": ["site_201"],
                                "pm25_aggregated": [{"mean": 71.2}],
                                "pm10_aggregated": [{"mean": 140.0}]
                            }))
                        }
                    }),
                )
        }

        async fn controller(hits: Arc<AtomicUsize>) -> Arc<DashboardController> {
            let base = spawn_backend(backend(hits)).await;
            Arc::new(DashboardController::new(client(&base), range()))
        }

        #[tokio::test]
        async fn test_mount_selects_first_city() {
            let c = controller(Arc::new(AtomicUsize::new(0))).await;
            c.load_cities().await;
            let d = c.snapshot().await;
            assert_eq!(d.view.selected_city.as_deref(), Some("Mumbai"));
            let sites = d.sites.data().unwrap();
            assert_eq!(sites[0].name, "mumbai-1");
            assert_eq!(d.view.selected_site.as_deref(), Some("mumbai-1"));
        }

        #[tokio::test]
        async fn test_late_response_discarded() {
            let c = controller(Arc::new(AtomicUsize::new(0))).await;
            c.load_cities().await;

            let slow = c.clone();
            let pune = tokio::spawn(async move { slow.select_city("Pune").await });
            tokio::time::sleep(Duration::from_millis(50)).await;
            c.select_city("Mumbai").await.unwrap();
            pune.await.unwrap().unwrap();

            let d = c.snapshot().await;
            assert_eq!(d.view.selected_city.as_deref(), Some("Mumbai"));
            let names: Vec<_> = d.sites.data().unwrap().iter().map(|s| s.name.clone()).collect();
            assert_eq!(names, ["mumbai-1"]);
        }

        #[tokio::test]
        async fn test_invalid_range_blocks_request() {
            let hits = Arc::new(AtomicUsize::new(0));
            let c = controller(hits.clone()).await;
            c.load_cities().await;

            let err = c
                .set_data_source(
                    DataSource::Real,
                    Some("2024-03-15T00:00"),
                    Some("2024-03-10T00:00"),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AqVizError::InvalidDateRange { .. }));
            assert_eq!(hits.load(Ordering::SeqCst), 0);

            let d = c.snapshot().await;
            assert_eq!(d.view.data_source, DataSource::Mock);
            assert!(d.notice.is_some());
            assert!(d.sites.data().is_some());
        }

        #[tokio::test]
        async fn test_real_source_uses_city_data() {
            let hits = Arc::new(AtomicUsize::new(0));
            let c = controller(hits.clone()).await;
            c.load_cities().await;
            c.set_data_source(
                DataSource::Real,
                Some("2024-03-10T00:00"),
                Some("2024-03-11T00:00"),
            )
            .await
            .unwrap();

            assert_eq!(hits.load(Ordering::SeqCst), 1);
            let d = c.snapshot().await;
            let sites = d.sites.data().unwrap();
            assert_eq!(sites[0].name, "site_201");
            assert_eq!(sites[0].pm25, Some(71.2));
            assert_eq!(d.view.selected_site.as_deref(), Some("site_201"));
        }

        #[tokio::test]
        async fn test_sites_failure_stays_in_sites_panel() {
            let router = Router::new()
                .route("/api/cities", get(|| async { Json(cities_body()) }))
                .route(
                    "/api/sites",
                    get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
                );
            let base = spawn_backend(router).await;
            let c = DashboardController::new(client(&base), range());
            c.load_cities().await;

            let d = c.snapshot().await;
            assert!(matches!(d.sites, PanelState::Error(_)));
            assert!(d.cities.data().is_some());
        }

        #[tokio::test]
        async fn test_empty_catalog_is_not_an_error() {
            let router = Router::new().route(
                "/api/cities",
                get(|| async { Json(serde_json::json!({"cities": []})) }),
            );
            let base = spawn_backend(router).await;
            let c = DashboardController::new(client(&base), range());
            c.load_cities().await;

            let d = c.snapshot().await;
            assert_eq!(d.cities, PanelState::Empty);
            assert_eq!(d.sites, PanelState::Idle);
            assert_eq!(d.view.selected_city, None);
        }

        #[tokio::test]
        async fn test_unknown_site_rejected() {
            let c = controller(Arc::new(AtomicUsize::new(0))).await;
            c.load_cities().await;
            assert!(c.select_site("nowhere").await.is_err());
            c.select_site("mumbai-1").await.unwrap();
        }

        #[tokio::test]
        async fn test_time_index_returned_clamped() {
            let c = controller(Arc::new(AtomicUsize::new(0))).await;
            assert_eq!(c.select_time_index(Some(99), 48).await, Some(47));
            assert_eq!(c.select_time_index(None, 48).await, None);
            assert_eq!(c.snapshot().await.view.selected_time_index, None);
        }

        /// `/cities` answers the first call at once. Later calls fail with
        /// 404 when `refresh_fails`, otherwise they answer after 300 ms.
        fn refreshing_backend(hits: Arc<AtomicUsize>, refresh_fails: bool) -> Router {
            Router::new()
                .route(
                    "/api/cities",
                    get(move || {
                        let hits = hits.clone();
                        async move {
                            if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                                return Ok(Json(cities_body()));
                            }
                            if refresh_fails {
                                return Err(StatusCode::NOT_FOUND);
                            }
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            Ok(Json(cities_body()))
                        }
                    }),
                )
                .route(
                    "/api/sites",
                    get(|Query(params): Query<HashMap<String, String>>| async move {
                        let city = params.get("city").cloned().unwrap_or_default();
                        let site_name = format!("{}-1", city.to_lowercase());
                        Json(serde_json::json!({
                            "city": city,
                            "sites": [{"name": site_name, "pm2_5": 30.0}]
                        }))
                    }),
                )
        }

        #[tokio::test]
        async fn test_city_selectable_during_refresh() {
            let hits = Arc::new(AtomicUsize::new(0));
            let base = spawn_backend(refreshing_backend(hits, false)).await;
            let c = Arc::new(DashboardController::new(client(&base), range()));
            c.load_cities().await;

            let refresher = c.clone();
            let refresh = tokio::spawn(async move { refresher.load_cities().await });
            tokio::time::sleep(Duration::from_millis(50)).await;

            assert!(c.snapshot().await.cities.data().is_some());
            c.select_city("Pune").await.unwrap();
            refresh.await.unwrap();

            let d = c.snapshot().await;
            assert_eq!(d.view.selected_city.as_deref(), Some("Pune"));
            assert_eq!(d.sites.data().unwrap()[0].name, "pune-1");
            assert_eq!(d.refresh_error, None);
        }

        #[tokio::test]
        async fn test_cities_failure_stays_in_cities_panel() {
            let hits = Arc::new(AtomicUsize::new(0));
            let base = spawn_backend(refreshing_backend(hits.clone(), true)).await;
            let c = DashboardController::new(client(&base), range());
            c.load_cities().await;
            c.load_cities().await;

            let d = c.snapshot().await;
            assert_eq!(hits.load(Ordering::SeqCst), 2);
            assert!(d.refresh_error.is_some());
            assert_eq!(d.cities.data().unwrap().cities.len(), 2);
            assert_eq!(d.sites.data().unwrap()[0].name, "mumbai-1");
            assert_eq!(d.view.selected_city.as_deref(), Some("Mumbai"));
        }

        #[tokio::test]
        async fn test_first_cities_failure_is_panel_error() {
            let router = Router::new().route(
                "/api/cities",
                get(|| async { StatusCode::NOT_FOUND }),
            );
            let base = spawn_backend(router).await;
            let c = DashboardController::new(client(&base), range());
            c.load_cities().await;

            let d = c.snapshot().await;
            assert!(matches!(d.cities, PanelState::Error(_)));
            assert_eq!(d.sites, PanelState::Idle);
        }
    }
}
