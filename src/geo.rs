//! Geo aggregation over the city catalog: flattened site list, map bounds
//! and per-city centroids.

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use crate::models::{City, Site};

/// Smallest lat/lon rectangle covering a set of sites.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingRegion {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// Mean coordinate of the sites that have one. `count == 0` means "do not
/// render"; lat/lon are then 0.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Default)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
    pub count: usize,
}

impl Centroid {
    pub fn is_renderable(&self) -> bool {
        self.count > 0
    }
}

/// Map marker for one city.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CityCentroid {
    pub city: String,
    #[serde(flatten)]
    pub centroid: Centroid,
    /// Declared site count, used for marker radius.
    pub sites_count: usize,
}

/// Concatenates every city's sites in input order.
///
/// Each site keeps its parent city tag; a site whose tag disagrees with the
/// city it is listed under is re-tagged.
pub fn flatten_sites(cities: &[City]) -> Vec<Site> {
    cities
        .iter()
        .flat_map(|city| {
            city.sites.iter().map(move |site| Site {
                city: city.name.clone(),
                ..site.clone()
            })
        })
        .collect()
}

fn span(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    match values.minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
    }
}

/// Bounding region of all sites with both coordinates, or `None` when no
/// site has them. Sites missing a coordinate are skipped.
pub fn compute_bounds(sites: &[Site]) -> Option<BoundingRegion> {
    let positions: Vec<(f64, f64)> = sites.iter().filter_map(Site::position).collect();
    let (min_lat, max_lat) = span(positions.iter().map(|p| p.0))?;
    let (min_lon, max_lon) = span(positions.iter().map(|p| p.1))?;
    Some(BoundingRegion {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    })
}

pub fn compute_centroid(sites: &[Site]) -> Centroid {
    let (lat_sum, lon_sum, count) = sites
        .iter()
        .filter_map(Site::position)
        .fold((0.0, 0.0, 0usize), |(lat, lon, n), (la, lo)| {
            (lat + la, lon + lo, n + 1)
        });
    if count == 0 {
        return Centroid::default();
    }
    Centroid {
        lat: lat_sum / count as f64,
        lon: lon_sum / count as f64,
        count,
    }
}

/// One centroid per city, in catalog order, including unrenderable ones.
pub fn city_centroids(cities: &[City]) -> Vec<CityCentroid> {
    cities
        .iter()
        .map(|city| CityCentroid {
            city: city.name.clone(),
            centroid: compute_centroid(&city.sites),
            sites_count: city.sites_count,
        })
        .collect()
}
