use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tera::Tera;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::controller::DashboardController;
use crate::data::AnomalyData;
use crate::error::AqVizError;
use crate::models::DateRange;

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend root, without the `/api` suffix.
    pub backend_url: String,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Cron expression for the city catalog refresh.
    pub refresh_cron: String,
    pub fetch_timeout: Duration,
    pub anomaly_fixture: PathBuf,
    pub default_start: String,
    pub default_end: String,
}

impl Config {
    /// Creates Config from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        let fetch_timeout = lookup("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(10);

        Self {
            backend_url: var("BACKEND_URL", "http://localhost:8000"),
            bind_address: var("BIND_ADDRESS", "0.0.0.0:8201"),
            refresh_cron: var("REFRESH_CRON", "0 */15 * * * *"),
            fetch_timeout: Duration::from_secs(fetch_timeout),
            anomaly_fixture: PathBuf::from(var("ANOMALY_FIXTURE", "data/anomaly_fixture.json")),
            default_start: var("DEFAULT_START", "2024-03-10T00:00"),
            default_end: var("DEFAULT_END", "2024-03-15T23:59"),
        }
    }

    /// The backend's `/api` root.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.backend_url.trim_end_matches('/'))
    }

    /// Initial date range for real readings.
    pub fn default_range(&self) -> Result<DateRange, AqVizError> {
        DateRange::parse(&self.default_start, &self.default_end)
    }
}

/// Shared application state passed to all request handlers.
pub struct AppState {
    /// Template engine for rendering HTML pages.
    pub tera: Tera,
    /// Dashboard selection and panels, shared by every visitor.
    pub dashboard: DashboardController,
    /// Fixture records are loaded once and never change.
    pub anomalies: AnomalyData,
}

impl AppState {
    pub fn new(tera: Tera, dashboard: DashboardController, anomalies: AnomalyData) -> Self {
        Self {
            tera,
            dashboard,
            anomalies,
        }
    }
}

/// Parses every template matching `glob`.
///
/// # Errors
///
/// Returns `AqVizError::Template` if any template fails to parse.
pub fn load_templates(glob: &str) -> Result<Tera, AqVizError> {
    let tera = Tera::new(glob)?;
    info!(templates = tera.get_template_names().count(), "loaded templates");
    Ok(tera)
}

/// Starts a scheduler that reloads the city catalog on `cron`.
///
/// # Errors
///
/// Returns `AqVizError::Scheduler` for an invalid cron expression or if the
/// scheduler cannot start.
pub async fn schedule_refresh(
    state: Arc<AppState>,
    cron: &str,
) -> Result<JobScheduler, AqVizError> {
    let job = Job::new_async(cron, move |_uuid, _l| {
        let state = state.clone();
        Box::pin(async move {
            info!("refreshing city catalog");
            state.dashboard.load_cities().await;
        })
    })?;
    let sched = JobScheduler::new().await?;
    sched.add(job).await?;
    sched.start().await?;
    info!(cron, "scheduled catalog refresh");
    Ok(sched)
}
