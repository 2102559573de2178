#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearest-neighbour proximity statistics and buffer-based tagging.
//!
//! The pipeline runs in three stages over sites that are already projected
//! into a planar, distance-preserving reference system:
//!
//! 1. [`matrix::DistanceMatrix::build`] computes every pairwise distance.
//! 2. [`neighbours::neighbour_stats`] derives the k nearest neighbours of
//!    one site from its matrix row, plus their mean and standard deviation.
//! 3. [`classify::Classifier`] buffers each site by its mean neighbour
//!    distance and tags it by intersection with a reference geometry.
//!
//! [`pipeline::run`] chains the three stages.
//!
//! # Usage
//!
//! ```rust
//! # fn example() -> Result<(), telecom_sites_proximity::ProximityError> {
//! use geo::{LineString, coord};
//! use telecom_sites_models::{ProximityConfig, Site};
//! use telecom_sites_proximity::classify::ReferenceGeometry;
//! use telecom_sites_proximity::pipeline;
//! use telecom_sites_proximity::progress::null_progress;
//!
//! let config = ProximityConfig { k: 2, ..ProximityConfig::default() };
//! let sites = vec![
//!     Site::new("A", 0.0, 0.0),
//!     Site::new("B", 10.0, 0.0),
//!     Site::new("C", 10.0, 10.0),
//! ];
//! let road = ReferenceGeometry::new(
//!     "Ring Road",
//!     config.crs,
//!     LineString::new(vec![coord! { x: 5.0, y: 0.0 }, coord! { x: 5.0, y: 10.0 }]),
//! );
//!
//! let output = pipeline::run(&sites, &road, &config, &null_progress())?;
//! assert_eq!(output.sites.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod classify;
pub mod matrix;
pub mod neighbours;
pub mod pipeline;
pub mod progress;

use thiserror::Error;

/// Errors raised by the proximity pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProximityError {
    /// The site set cannot be used (too few sites, duplicate identifiers,
    /// non-finite coordinates, or an unusable reference system).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what went wrong.
        message: String,
    },

    /// A geometry is malformed: either the shared reference geometry or
    /// one site's buffer.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of what went wrong.
        message: String,
    },
}

impl ProximityError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
        }
    }
}
