#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site and proximity result types.
//!
//! These types describe cellular sites in a projected coordinate reference
//! system, the nearest-neighbour statistics derived for each site, and the
//! final tag assigned by the buffer-and-tag classifier. They carry no
//! behavior beyond small accessors so that both the proximity engine and
//! the IO collaborators can share them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// EPSG codes of geographic (latitude/longitude) reference systems.
///
/// Distances in these systems are angular, so the proximity pipeline
/// refuses to work in them.
const GEOGRAPHIC_EPSG_CODES: &[u32] = &[4326, 4269, 4258, 4267, 4230, 4229];

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crs {
    /// EPSG code (e.g. `32636` for WGS 84 / UTM zone 36N).
    pub epsg: u32,
}

impl Crs {
    /// WGS 84 / UTM zone 36N, which covers most of Egypt.
    pub const UTM_36N: Self = Self::new(32636);

    /// WGS 84 geographic coordinates.
    pub const WGS84: Self = Self::new(4326);

    #[must_use]
    pub const fn new(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Whether this system uses angular (lat/long) coordinates.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        GEOGRAPHIC_EPSG_CODES.contains(&self.epsg)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::UTM_36N
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// A located site in a projected, distance-preserving coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Unique site identifier.
    pub id: String,
    /// Easting in the projected system's linear unit.
    pub x: f64,
    /// Northing in the projected system's linear unit.
    pub y: f64,
}

impl Site {
    #[must_use]
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
        }
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub const fn has_finite_coords(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Divisor convention for the neighbour distance standard deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdConvention {
    /// `n - 1` divisor. Undefined for a single sample.
    #[default]
    Sample,
    /// `n` divisor. Zero for a single sample.
    Population,
}

/// Nearest-neighbour statistics for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighbourStats {
    /// Number of neighbours actually used (never more than requested).
    pub k: usize,
    /// Neighbour identifiers, nearest first. Always `k` long.
    pub names: Vec<String>,
    /// Mean distance to the selected neighbours.
    pub mean: f64,
    /// Standard deviation of the selected distances. `None` when undefined.
    pub sd: Option<f64>,
}

/// Outcome of classifying one site against the reference geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum Tag {
    /// The site's buffer intersects the reference geometry.
    Matched(String),
    /// The site's buffer does not intersect the reference geometry.
    Unmatched(String),
    /// The site could not be classified.
    Unknown(String),
}

impl Tag {
    /// The label written to result sinks.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Matched(label) | Self::Unmatched(label) | Self::Unknown(label) => label,
        }
    }

    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

/// Caller-supplied sentinels used for sites that do not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagLabels {
    /// Label for sites whose buffer misses the reference geometry.
    pub none: String,
    /// Label for sites that could not be classified.
    pub unknown: String,
}

impl Default for TagLabels {
    fn default() -> Self {
        Self {
            none: "None".to_string(),
            unknown: "Unknown".to_string(),
        }
    }
}

/// Pipeline configuration.
///
/// Deserializable from TOML; every field has a default so a partial file
/// (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProximityConfig {
    /// Requested neighbour count. Must be positive.
    pub k: i64,
    /// Reference system both the sites and the reference geometry are in.
    pub crs: Crs,
    /// Sentinel labels for non-matching sites.
    pub labels: TagLabels,
    /// Standard deviation divisor.
    pub sd_convention: SdConvention,
    /// Segments per quarter circle used to approximate buffer discs.
    pub quadrant_segments: u32,
    /// Whether per-site work runs on the rayon thread pool.
    pub parallel: bool,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            k: 3,
            crs: Crs::default(),
            labels: TagLabels::default(),
            sd_convention: SdConvention::default(),
            quadrant_segments: 16,
            parallel: true,
        }
    }
}

/// A site annotated with its neighbour statistics and tag, ready for a
/// result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSite {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Effective neighbour count.
    pub nearest_k: usize,
    /// Mean distance to the nearest neighbours; also the buffer radius.
    pub nearest_mean: f64,
    /// Standard deviation of the neighbour distances, `null` when undefined.
    pub nearest_sd: Option<f64>,
    /// Neighbour identifiers, nearest first.
    pub nearest_sites: Vec<String>,
    pub tag: Tag,
}

impl AnnotatedSite {
    #[must_use]
    pub fn new(site: &Site, stats: NeighbourStats, tag: Tag) -> Self {
        Self {
            id: site.id.clone(),
            x: site.x,
            y: site.y,
            nearest_k: stats.k,
            nearest_mean: stats.mean,
            nearest_sd: stats.sd,
            nearest_sites: stats.names,
            tag,
        }
    }
}
