mod aqi;
mod chart;
mod controller;
mod data;
mod error;
mod fetcher;
mod geo;
mod handlers;
mod metrics;
mod models;
mod state;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::controller::DashboardController;
use crate::data::{load_anomaly_records, AnomalyData};
use crate::fetcher::BackendClient;
use crate::state::{load_templates, schedule_refresh, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aqviz=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = Config::from_env();
    info!(?config, "starting aqviz");

    let tera = load_templates("templates/**/*.html")?;

    let records = load_anomaly_records(&config.anomaly_fixture)?;
    let anomalies = AnomalyData::new(records)?;
    info!(
        records = anomalies.records.len(),
        "loaded anomaly fixture from {}",
        config.anomaly_fixture.display()
    );

    let backend = BackendClient::new(&config.api_base(), config.fetch_timeout)?;
    let dashboard = DashboardController::new(backend, config.default_range()?);

    let state = Arc::new(AppState::new(tera, dashboard, anomalies));

    // The backend may still be starting; a failed first load leaves the
    // cities panel in its error state until the next refresh.
    state.dashboard.load_cities().await;

    let _sched = schedule_refresh(state.clone(), &config.refresh_cron).await?;

    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/aqi-info", get(handlers::aqi_info))
        .route("/dashboard", get(handlers::dashboard_page))
        .route("/dashboard/tab", get(handlers::select_tab))
        .route("/dashboard/city", get(handlers::select_city))
        .route("/dashboard/site", get(handlers::select_site))
        .route("/dashboard/source", get(handlers::select_source))
        .route("/anomaly", get(handlers::anomaly_page))
        .route("/api/map", get(handlers::api_map))
        .route("/api/site-bars", get(handlers::api_site_bars))
        .route("/api/anomaly-series", get(handlers::api_anomaly_series))
        .route("/api/anomaly-summary", get(handlers::api_anomaly_summary))
        .route("/health", get(handlers::health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
