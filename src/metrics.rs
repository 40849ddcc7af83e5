//! PM2.5/PM10 averages for the sites panel.

use serde::Serialize;

use crate::aqi::{self, AqiBand};
use crate::models::{Pollutant, Site};

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Default)]
pub struct PmAverages {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

impl PmAverages {
    /// AQI band of each average, `None` where the average is unavailable.
    pub fn bands(&self) -> (Option<AqiBand>, Option<AqiBand>) {
        (
            self.pm25.and_then(|v| aqi::band_for(Pollutant::Pm25, v)),
            self.pm10.and_then(|v| aqi::band_for(Pollutant::Pm10, v)),
        )
    }
}

/// Mean over the values that are present. Sites without a reading do not
/// count towards the divisor; no present values means `None`.
fn mean_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| round2(sum / count as f64))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn average_pm(sites: &[Site]) -> PmAverages {
    PmAverages {
        pm25: mean_present(sites.iter().map(|s| s.pm25)),
        pm10: mean_present(sites.iter().map(|s| s.pm10)),
    }
}
