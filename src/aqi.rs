//! AQI bands and PM sub-index.
//!
//! Bands follow the AQI information page. Sub-indices interpolate linearly
//! over the national AQI breakpoints for PM2.5 and PM10 (µg/m³).

use serde::Serialize;

use crate::models::Pollutant;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AqiBand {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiBand {
    pub const ALL: [AqiBand; 6] = [
        AqiBand::Good,
        AqiBand::Moderate,
        AqiBand::UnhealthyForSensitiveGroups,
        AqiBand::Unhealthy,
        AqiBand::VeryUnhealthy,
        AqiBand::Hazardous,
    ];

    /// Inclusive index range covered by the band.
    pub fn range(&self) -> (u32, u32) {
        match self {
            AqiBand::Good => (0, 50),
            AqiBand::Moderate => (51, 100),
            AqiBand::UnhealthyForSensitiveGroups => (101, 200),
            AqiBand::Unhealthy => (201, 300),
            AqiBand::VeryUnhealthy => (301, 400),
            AqiBand::Hazardous => (401, 500),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiBand::Good => "Good",
            AqiBand::Moderate => "Moderate",
            AqiBand::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiBand::Unhealthy => "Unhealthy",
            AqiBand::VeryUnhealthy => "Very Unhealthy",
            AqiBand::Hazardous => "Hazardous",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AqiBand::Good => "Air quality is satisfactory, and air pollution poses little or no risk.",
            AqiBand::Moderate => {
                "Air quality is acceptable. However, there may be a risk for some people, \
                 particularly those who are unusually sensitive to air pollution."
            }
            AqiBand::UnhealthyForSensitiveGroups => {
                "Members of sensitive groups may experience health effects. \
                 The general public is less likely to be affected."
            }
            AqiBand::Unhealthy => {
                "Some members of the general public may experience health effects; \
                 members of sensitive groups may experience more serious health effects."
            }
            AqiBand::VeryUnhealthy => {
                "Health alert: the risk of health effects is increased for everyone."
            }
            AqiBand::Hazardous => {
                "Health warning of emergency conditions: everyone is more likely to be affected."
            }
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AqiBand::Good => "#00E400",
            AqiBand::Moderate => "#FFFF00",
            AqiBand::UnhealthyForSensitiveGroups => "#FF7E00",
            AqiBand::Unhealthy => "#FF0000",
            AqiBand::VeryUnhealthy => "#8F3F97",
            AqiBand::Hazardous => "#7E0023",
        }
    }

    pub fn for_index(index: u32) -> AqiBand {
        Self::ALL
            .into_iter()
            .find(|band| index <= band.range().1)
            .unwrap_or(AqiBand::Hazardous)
    }
}

/// One row of the AQI reference table, ready for templates.
#[derive(Debug, Serialize, Clone)]
pub struct BandRow {
    pub label: &'static str,
    pub range: String,
    pub description: &'static str,
    pub color: &'static str,
}

pub fn band_table() -> Vec<BandRow> {
    AqiBand::ALL
        .iter()
        .map(|band| {
            let (lo, hi) = band.range();
            BandRow {
                label: band.label(),
                range: format!("{}-{}", lo, hi),
                description: band.description(),
                color: band.color(),
            }
        })
        .collect()
}

/// (concentration low, concentration high) per band, aligned with `AqiBand::ALL`.
const PM25_BREAKPOINTS: [(f64, f64); 6] = [
    (0.0, 30.0),
    (31.0, 60.0),
    (61.0, 90.0),
    (91.0, 120.0),
    (121.0, 250.0),
    (251.0, 500.0),
];

const PM10_BREAKPOINTS: [(f64, f64); 6] = [
    (0.0, 50.0),
    (51.0, 100.0),
    (101.0, 250.0),
    (251.0, 350.0),
    (351.0, 430.0),
    (431.0, 800.0),
];

/// Sub-index for a concentration, capped at 500. `None` for negative or
/// non-finite input.
pub fn sub_index(pollutant: Pollutant, concentration: f64) -> Option<u32> {
    if !concentration.is_finite() || concentration < 0.0 {
        return None;
    }
    let breakpoints = match pollutant {
        Pollutant::Pm25 => &PM25_BREAKPOINTS,
        Pollutant::Pm10 => &PM10_BREAKPOINTS,
    };
    // Readings between breakpoints (e.g. 30.4) belong to the lower band.
    let position = breakpoints
        .iter()
        .position(|&(_, hi)| concentration < hi + 1.0)
        .unwrap_or(breakpoints.len() - 1);
    let (c_lo, c_hi) = breakpoints[position];
    let (i_lo, i_hi) = AqiBand::ALL[position].range();
    let c = concentration.clamp(c_lo, c_hi);
    let index = i_lo as f64 + (c - c_lo) * (i_hi - i_lo) as f64 / (c_hi - c_lo);
    Some(index.round().min(500.0) as u32)
}

pub fn band_for(pollutant: Pollutant, concentration: f64) -> Option<AqiBand> {
    sub_index(pollutant, concentration).map(AqiBand::for_index)
}
