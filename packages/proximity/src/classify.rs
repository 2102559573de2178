//! Buffer-and-tag classification against a reference geometry.
//!
//! The reference geometry (typically a named road) is validated once and
//! split into its component line strings and polygons, which are stored in
//! an R-tree keyed by bounding box. Each site's buffer is tested exactly
//! against only the parts whose envelope overlaps the buffer's envelope.

use geo::{Geometry, Intersects, Line, LineString, Polygon};
use rstar::{AABB, RTree, RTreeObject};
use telecom_sites_models::{Crs, Site, Tag, TagLabels};

use crate::ProximityError;
use crate::buffer::Buffer;

/// A labelled line or polygon that sites are tagged against.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGeometry {
    label: String,
    crs: Crs,
    geometry: Geometry<f64>,
}

impl ReferenceGeometry {
    #[must_use]
    pub fn new(label: impl Into<String>, crs: Crs, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            label: label.into(),
            crs,
            geometry: geometry.into(),
        }
    }

    /// Human-readable label assigned to matching sites.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }
}

/// One connected piece of the reference geometry.
#[derive(Debug, Clone)]
enum ReferencePart {
    Line(LineString<f64>),
    Area(Polygon<f64>),
}

/// A reference part stored in the R-tree with its bounding box.
struct PartEntry {
    part: ReferencePart,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for PartEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Tags sites by whether their buffer intersects a reference geometry.
///
/// Holds no per-site state, so a single classifier can be shared across
/// threads.
pub struct Classifier {
    label: String,
    labels: TagLabels,
    quadrant_segments: u32,
    parts: RTree<PartEntry>,
}

impl Classifier {
    /// Validates `reference` and indexes its parts.
    ///
    /// # Errors
    ///
    /// * [`ProximityError::InvalidInput`] if `crs` is geographic or differs
    ///   from the reference's declared system.
    /// * [`ProximityError::InvalidArgument`] if `quadrant_segments` is zero.
    /// * [`ProximityError::Geometry`] if the reference is empty, not a line
    ///   or polygon, has non-finite coordinates, or has a degenerate or
    ///   self-intersecting ring.
    pub fn new(
        reference: &ReferenceGeometry,
        crs: Crs,
        labels: TagLabels,
        quadrant_segments: u32,
    ) -> Result<Self, ProximityError> {
        if crs.is_geographic() {
            return Err(ProximityError::invalid_input(format!(
                "{crs} is a geographic reference system; project sites to a planar system first"
            )));
        }
        if reference.crs() != crs {
            return Err(ProximityError::invalid_input(format!(
                "reference geometry '{}' is in {} but sites are in {crs}",
                reference.label(),
                reference.crs()
            )));
        }
        if quadrant_segments == 0 {
            return Err(ProximityError::invalid_argument(
                "buffer quadrant segments must be positive",
            ));
        }

        let mut parts = Vec::new();
        collect_parts(reference.geometry(), &mut parts)?;
        if parts.is_empty() {
            return Err(ProximityError::geometry(format!(
                "reference geometry '{}' is empty",
                reference.label()
            )));
        }

        let entries: Vec<PartEntry> = parts
            .into_iter()
            .map(|part| -> Result<PartEntry, ProximityError> {
                validate_part(&part)?;
                let envelope = part_envelope(&part);
                Ok(PartEntry { part, envelope })
            })
            .collect::<Result<_, _>>()?;

        log::debug!(
            "Indexed {} part(s) of reference geometry '{}'",
            entries.len(),
            reference.label()
        );

        Ok(Self {
            label: reference.label().to_string(),
            labels,
            quadrant_segments,
            parts: RTree::bulk_load(entries),
        })
    }

    /// Builds the buffer of radius `nearest_mean` around `site`.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError::Geometry`] if the radius or the site's
    /// coordinates cannot form a buffer.
    pub fn buffer_for(&self, site: &Site, nearest_mean: f64) -> Result<Buffer, ProximityError> {
        Buffer::disc(
            geo::Point::new(site.x, site.y),
            nearest_mean,
            self.quadrant_segments,
        )
    }

    /// Whether `buffer` geometrically intersects the reference. Empty
    /// buffers intersect nothing.
    #[must_use]
    pub fn intersects(&self, buffer: &Buffer) -> bool {
        let (Some(polygon), Some(envelope)) = (buffer.polygon(), buffer.envelope()) else {
            return false;
        };

        self.parts
            .locate_in_envelope_intersecting(&envelope)
            .any(|entry| match &entry.part {
                ReferencePart::Line(line) => polygon.intersects(line),
                ReferencePart::Area(area) => polygon.intersects(area),
            })
    }

    /// Tags one site from its mean neighbour distance.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError::Geometry`] if the site's buffer cannot be
    /// built. The failure concerns this site only.
    pub fn classify(&self, site: &Site, nearest_mean: f64) -> Result<Tag, ProximityError> {
        let buffer = self.buffer_for(site, nearest_mean)?;
        Ok(self.tag(&buffer))
    }

    /// Tag for an already built buffer.
    #[must_use]
    pub fn tag(&self, buffer: &Buffer) -> Tag {
        if self.intersects(buffer) {
            Tag::Matched(self.label.clone())
        } else {
            Tag::Unmatched(self.labels.none.clone())
        }
    }

    /// The marker assigned to sites that could not be classified.
    #[must_use]
    pub fn unknown_tag(&self) -> Tag {
        Tag::Unknown(self.labels.unknown.clone())
    }

    /// Label assigned to matching sites.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn collect_parts(
    geometry: &Geometry<f64>,
    parts: &mut Vec<ReferencePart>,
) -> Result<(), ProximityError> {
    match geometry {
        Geometry::Line(line) => {
            parts.push(ReferencePart::Line(LineString::new(vec![
                line.start, line.end,
            ])));
        }
        Geometry::LineString(line) => parts.push(ReferencePart::Line(line.clone())),
        Geometry::MultiLineString(lines) => {
            parts.extend(lines.iter().cloned().map(ReferencePart::Line));
        }
        Geometry::Polygon(polygon) => parts.push(ReferencePart::Area(polygon.clone())),
        Geometry::MultiPolygon(polygons) => {
            parts.extend(polygons.iter().cloned().map(ReferencePart::Area));
        }
        Geometry::Rect(rect) => parts.push(ReferencePart::Area(rect.to_polygon())),
        Geometry::Triangle(triangle) => parts.push(ReferencePart::Area(triangle.to_polygon())),
        Geometry::GeometryCollection(collection) => {
            for child in collection {
                collect_parts(child, parts)?;
            }
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => {
            return Err(ProximityError::geometry(
                "reference geometry must be a line or polygon, not a point",
            ));
        }
    }
    Ok(())
}

fn validate_part(part: &ReferencePart) -> Result<(), ProximityError> {
    match part {
        ReferencePart::Line(line) => validate_line(line),
        ReferencePart::Area(polygon) => {
            validate_ring(polygon.exterior())?;
            polygon.interiors().iter().try_for_each(validate_ring)
        }
    }
}

fn validate_line(line: &LineString<f64>) -> Result<(), ProximityError> {
    if line.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(ProximityError::geometry(
            "reference line has non-finite coordinates",
        ));
    }
    let Some(first) = line.0.first() else {
        return Err(ProximityError::geometry("reference line is empty"));
    };
    if line.0.iter().all(|c| c == first) {
        return Err(ProximityError::geometry(
            "reference line needs at least two distinct points",
        ));
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>) -> Result<(), ProximityError> {
    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(ProximityError::geometry(
            "reference polygon has non-finite coordinates",
        ));
    }
    if !ring.is_closed() {
        return Err(ProximityError::geometry(
            "reference polygon ring is not closed",
        ));
    }

    // Repeated vertices are valid but leave zero-length segments behind.
    let mut coords = ring.0.clone();
    coords.dedup();
    if coords.len() < 4 {
        return Err(ProximityError::geometry(format!(
            "reference polygon ring needs at least 3 distinct vertices, got {}",
            coords.len().saturating_sub(1)
        )));
    }

    let segments: Vec<Line<f64>> = LineString::new(coords).lines().collect();
    let count = segments.len();
    for i in 0..count {
        for j in (i + 2)..count {
            // The first and last segments share the closing vertex.
            if i == 0 && j == count - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return Err(ProximityError::geometry(
                    "reference polygon ring is self-intersecting",
                ));
            }
        }
    }
    Ok(())
}

fn part_envelope(part: &ReferencePart) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    let rect = match part {
        ReferencePart::Line(line) => line.bounding_rect(),
        ReferencePart::Area(polygon) => polygon.bounding_rect(),
    };

    rect.map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
