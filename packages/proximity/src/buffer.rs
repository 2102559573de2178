//! Disc buffers around sites.

use std::f64::consts::TAU;

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon};
use rstar::AABB;

use crate::ProximityError;

/// The region within `radius` of a site.
///
/// A positive radius gives a regular polygon inscribed in the circle. A
/// zero radius gives an empty buffer that intersects nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Disc {
        center: Point<f64>,
        radius: f64,
        polygon: Polygon<f64>,
    },
    Empty {
        center: Point<f64>,
    },
}

impl Buffer {
    /// Builds a buffer approximated with `4 * quadrant_segments` vertices.
    ///
    /// # Errors
    ///
    /// * [`ProximityError::InvalidArgument`] if `quadrant_segments` is zero.
    /// * [`ProximityError::Geometry`] if `radius` is negative or not finite,
    ///   or `center` is not finite.
    pub fn disc(
        center: Point<f64>,
        radius: f64,
        quadrant_segments: u32,
    ) -> Result<Self, ProximityError> {
        if quadrant_segments == 0 {
            return Err(ProximityError::invalid_argument(
                "buffer quadrant segments must be positive",
            ));
        }
        if !center.x().is_finite() || !center.y().is_finite() {
            return Err(ProximityError::geometry(format!(
                "buffer center ({}, {}) is not finite",
                center.x(),
                center.y()
            )));
        }
        if !radius.is_finite() || radius < 0.0 {
            return Err(ProximityError::geometry(format!(
                "buffer radius {radius} is not a non-negative finite distance"
            )));
        }

        if radius == 0.0 {
            return Ok(Self::Empty { center });
        }

        let vertices = quadrant_segments * 4;
        let ring: Vec<Coord<f64>> = (0..vertices)
            .map(|i| {
                let angle = TAU * f64::from(i) / f64::from(vertices);
                Coord {
                    x: radius.mul_add(angle.cos(), center.x()),
                    y: radius.mul_add(angle.sin(), center.y()),
                }
            })
            .collect();

        Ok(Self::Disc {
            center,
            radius,
            polygon: Polygon::new(LineString::new(ring), vec![]),
        })
    }

    #[must_use]
    pub const fn center(&self) -> Point<f64> {
        match self {
            Self::Disc { center, .. } | Self::Empty { center } => *center,
        }
    }

    #[must_use]
    pub const fn radius(&self) -> f64 {
        match self {
            Self::Disc { radius, .. } => *radius,
            Self::Empty { .. } => 0.0,
        }
    }

    /// The buffer polygon, or `None` for an empty buffer.
    #[must_use]
    pub const fn polygon(&self) -> Option<&Polygon<f64>> {
        match self {
            Self::Disc { polygon, .. } => Some(polygon),
            Self::Empty { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    /// Whether the buffer covers its own center. Empty buffers cover
    /// nothing.
    #[must_use]
    pub fn contains_center(&self) -> bool {
        self.polygon()
            .is_some_and(|polygon| polygon.contains(&self.center()))
    }

    /// Bounding box of the buffer polygon, or `None` for an empty buffer.
    #[must_use]
    pub fn envelope(&self) -> Option<AABB<[f64; 2]>> {
        let rect = self.polygon()?.bounding_rect()?;
        Some(AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        ))
    }
}
