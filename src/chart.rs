//! Chart-ready projections of sites and inference records.

use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;

use crate::models::{AnomalyLabel, Pollutant, Site, TimeSeriesRecord};

/// One bar group of the sites chart. Missing readings stay `None`; how gaps
/// are drawn is up to the renderer.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SiteBar {
    pub name: String,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    /// Position in the original, un-sampled record list.
    pub index: usize,
    pub timestamp: String,
    pub site: String,
    pub value: f64,
    pub label: AnomalyLabel,
    pub is_anomaly: bool,
}

pub fn to_site_bars(sites: &[Site]) -> Vec<SiteBar> {
    sites
        .iter()
        .map(|s| SiteBar {
            name: s.name.clone(),
            pm25: s.pm25,
            pm10: s.pm10,
        })
        .collect()
}

/// Keeps every `every_nth` record starting from the first. No interpolation;
/// order is preserved. `every_nth == 0` is treated as 1.
pub fn to_time_series(records: &[TimeSeriesRecord], every_nth: usize) -> Vec<TimeSeriesPoint> {
    records
        .iter()
        .enumerate()
        .step_by(every_nth.max(1))
        .map(|(index, r)| TimeSeriesPoint {
            index,
            timestamp: r.timestamp.clone(),
            site: r.site.clone(),
            value: r.value,
            label: r.anomaly,
            is_anomaly: r.anomaly.is_anomaly(),
        })
        .collect()
}

/// Groups points by label, keeping order within each group. Labels absent
/// from the input have no entry at all.
pub fn split_by_anomaly_type(
    points: &[TimeSeriesPoint],
) -> HashMap<AnomalyLabel, Vec<TimeSeriesPoint>> {
    points.iter().cloned().into_group_map_by(|p| p.label)
}

/// Downsampled series of one site, with its points grouped by label for
/// per-category markers.
#[derive(Debug, Serialize, Clone)]
pub struct SiteSeries {
    pub site: String,
    pub points: Vec<TimeSeriesPoint>,
    pub by_label: HashMap<AnomalyLabel, Vec<TimeSeriesPoint>>,
}

/// One series per site for `pollutant`, sites sorted by name. `site`
/// restricts the output to a single site.
pub fn series_by_site(
    records: &[TimeSeriesRecord],
    pollutant: Pollutant,
    site: Option<&str>,
    every_nth: usize,
) -> Vec<SiteSeries> {
    records
        .iter()
        .filter(|r| r.pollutant == pollutant && site.is_none_or(|s| r.site == s))
        .cloned()
        .into_group_map_by(|r| r.site.clone())
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(site, records)| {
            let points = to_time_series(&records, every_nth);
            let by_label = split_by_anomaly_type(&points);
            SiteSeries {
                site,
                points,
                by_label,
            }
        })
        .collect()
}

/// Marker colour per anomaly label and pollutant, as shown in the anomaly
/// view legend.
pub fn marker_color(label: AnomalyLabel, pm10: bool) -> &'static str {
    match (label, pm10) {
        (AnomalyLabel::Spike, false) => "#ef4444",
        (AnomalyLabel::Spike, true) => "#f97316",
        (AnomalyLabel::Drop, false) => "#3b82f6",
        (AnomalyLabel::Drop, true) => "#22d3ee",
        (AnomalyLabel::SensorError, false) => "#eab308",
        (AnomalyLabel::SensorError, true) => "#facc15",
        (AnomalyLabel::Unknown, _) => "#a855f7",
        (AnomalyLabel::Normal, _) => "#9ca3af",
    }
}
