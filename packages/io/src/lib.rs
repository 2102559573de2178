#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! File-based sources and sinks around the proximity pipeline.
//!
//! Sites come from a CSV snapshot whose coordinates are already projected;
//! the reference geometry comes from a `GeoJSON` file in the same system.
//! Results are written back out as CSV or as a `GeoJSON`
//! `FeatureCollection`.

pub mod reference;
pub mod sink;
pub mod sites;

use thiserror::Error;

/// Errors from reading inputs or writing results.
#[derive(Debug, Error)]
pub enum IoError {
    /// CSV reading or writing failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// File could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No feature in the file carries the requested label.
    #[error("No feature with {property} = {label:?} in {path}")]
    FeatureNotFound {
        /// Path to the `GeoJSON` file.
        path: String,
        /// Property that was searched.
        property: String,
        /// Label that was searched for.
        label: String,
    },

    /// The geometry is missing or is not a line or polygon.
    #[error("Unsupported geometry in {path}: {message}")]
    UnsupportedGeometry {
        /// Path to the `GeoJSON` file.
        path: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The file declares a coordinate reference system that cannot be read.
    #[error("Unsupported CRS in {path}: {name:?}")]
    UnsupportedCrs {
        /// Path to the `GeoJSON` file.
        path: String,
        /// The declared CRS name.
        name: String,
    },
}

impl From<geojson::Error> for IoError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}
