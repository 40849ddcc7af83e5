//! Anomaly fixture loading - the ML inference records are a hardcoded JSON
//! fixture on disk, mirrored into a DataFrame for summaries.

use std::fs;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AqVizError;
use crate::models::TimeSeriesRecord;

/// Top-level shape of the fixture file.
#[derive(Debug, Deserialize)]
struct AnomalyFixture {
    records: Vec<TimeSeriesRecord>,
}

/// Fixture records plus their columnar form.
#[derive(Debug, Clone)]
pub struct AnomalyData {
    pub records: Vec<TimeSeriesRecord>,
    pub df: DataFrame,
}

impl AnomalyData {
    pub fn new(records: Vec<TimeSeriesRecord>) -> Result<Self, AqVizError> {
        let df = build_frame(&records)?;
        Ok(Self { records, df })
    }
}

/// Loads the anomaly fixture.
///
/// # Errors
///
/// Returns `AqVizError::Io` if the file cannot be read.
/// Returns `AqVizError::JsonParse` if the JSON is malformed.
pub fn load_anomaly_records(path: &Path) -> Result<Vec<TimeSeriesRecord>, AqVizError> {
    let content = fs::read_to_string(path)?;
    let fixture: AnomalyFixture = serde_json::from_str(&content)?;
    Ok(fixture.records)
}

pub fn build_frame(records: &[TimeSeriesRecord]) -> Result<DataFrame, AqVizError> {
    let sites: Vec<&str> = records.iter().map(|r| r.site.as_str()).collect();
    let pollutants: Vec<&str> = records.iter().map(|r| r.pollutant.as_str()).collect();
    let labels: Vec<&str> = records.iter().map(|r| r.anomaly.as_str()).collect();
    let values: Vec<f64> = records.iter().map(|r| r.value).collect();
    let confidence: Vec<Option<f64>> = records.iter().map(|r| r.confidence).collect();

    let df = df!(
        "site" => sites,
        "pollutant" => pollutants,
        "label" => labels,
        "value" => values,
        "confidence" => confidence
    )?;
    Ok(df)
}

/// Anomalous-record count for one site, pollutant and label.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AnomalyCount {
    pub site: String,
    pub pollutant: String,
    pub label: String,
    pub count: u64,
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>, AqVizError> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Counts non-normal records per site/pollutant/label, sorted by those keys.
pub fn anomaly_summary(df: &DataFrame) -> Result<Vec<AnomalyCount>, AqVizError> {
    let res = df
        .clone()
        .lazy()
        .filter(col("label").neq(lit("normal")))
        .group_by([col("site"), col("pollutant"), col("label")])
        .agg([len().alias("count")])
        .collect()?;

    let sites = string_column(&res, "site")?;
    let pollutants = string_column(&res, "pollutant")?;
    let labels = string_column(&res, "label")?;
    let counts: Vec<u64> = res
        .column("count")?
        .cast(&DataType::UInt64)?
        .u64()?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();

    let mut summary: Vec<AnomalyCount> = sites
        .into_iter()
        .zip(pollutants)
        .zip(labels)
        .zip(counts)
        .map(|(((site, pollutant), label), count)| AnomalyCount {
            site,
            pollutant,
            label,
            count,
        })
        .collect();
    summary.sort_by(|a, b| {
        (&a.site, &a.pollutant, &a.label).cmp(&(&b.site, &b.pollutant, &b.label))
    });
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyLabel, Pollutant};

    fn record(site: &str, pollutant: Pollutant, anomaly: AnomalyLabel) -> TimeSeriesRecord {
        TimeSeriesRecord {
            timestamp: "2025-11-02T10:00:00".into(),
            site: site.into(),
            pollutant,
            value: 75.0,
            anomaly,
            confidence: Some(0.9),
            forecast: vec![],
        }
    }

    #[test]
    fn test_summary_counts_only_anomalies() {
        let records = vec![
            record("Site A", Pollutant::Pm25, AnomalyLabel::Spike),
            record("Site A", Pollutant::Pm25, AnomalyLabel::Spike),
            record("Site A", Pollutant::Pm25, AnomalyLabel::Normal),
            record("Site B", Pollutant::Pm10, AnomalyLabel::SensorError),
        ];
        let data = AnomalyData::new(records).unwrap();
        let summary = anomaly_summary(&data.df).unwrap();
        assert_eq!(
            summary,
            vec![
                AnomalyCount {
                    site: "Site A".into(),
                    pollutant: "pm25".into(),
                    label: "spike".into(),
                    count: 2,
                },
                AnomalyCount {
                    site: "Site B".into(),
                    pollutant: "pm10".into(),
                    label: "sensorError".into(),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_frame_has_one_row_per_record() {
        let records = vec![
            record("Site A", Pollutant::Pm25, AnomalyLabel::Normal),
            record("Site A", Pollutant::Pm25, AnomalyLabel::Normal),
            record("Site A", Pollutant::Pm10, AnomalyLabel::Normal),
        ];
        let data = AnomalyData::new(records).unwrap();
        assert_eq!(data.df.height(), 3);
        assert!(anomaly_summary(&data.df).unwrap().is_empty());
    }

    #[test]
    fn test_bundled_fixture_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/anomaly_fixture.json");
        let records = load_anomaly_records(&path).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().any(|r| r.anomaly.is_anomaly()));
        assert!(records.iter().any(|r| r.pollutant == Pollutant::Pm10));
    }

    #[test]
    fn test_missing_fixture_is_io_error() {
        let err = load_anomaly_records(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, AqVizError::Io(_)));
    }
}
