//! Reference geometry reader.
//!
//! Accepts a bare `GeoJSON` geometry, a single feature, or a feature
//! collection (e.g. a road layer exported from OSM) whose coordinates are
//! already in a projected system. A `crs` member written by older GIS
//! exports (`EPSG:32636`, `urn:ogc:def:crs:EPSG::32636`, `CRS84`) is
//! honoured, so a file in the wrong system is caught by the classifier
//! instead of being silently reinterpreted.

use std::path::Path;

use geojson::{Feature, GeoJson, JsonObject};
use telecom_sites_models::Crs;
use telecom_sites_proximity::classify::ReferenceGeometry;

use crate::IoError;

/// Label used when neither a property nor the file name provides one.
const FALLBACK_LABEL: &str = "reference";

/// Reads a reference geometry from a `GeoJSON` file.
///
/// When `label` is given, the first feature whose `label_property` equals
/// it is used and `label` becomes the reference's label. Otherwise the
/// first feature with a geometry is used, labelled by its
/// `label_property` value or, failing that, the file stem.
///
/// The reference is stamped with the CRS the file declares, or with
/// `default_crs` when it declares none.
///
/// # Errors
///
/// * [`IoError::Io`] if the file cannot be read.
/// * [`IoError::GeoJson`] if the content is not valid `GeoJSON`.
/// * [`IoError::FeatureNotFound`] if no feature carries `label`.
/// * [`IoError::UnsupportedGeometry`] if the chosen geometry is missing or
///   is a point.
/// * [`IoError::UnsupportedCrs`] if the declared CRS is not an EPSG code.
pub fn read_reference_geojson(
    path: &Path,
    default_crs: Crs,
    label_property: &str,
    label: Option<&str>,
) -> Result<ReferenceGeometry, IoError> {
    let content = std::fs::read_to_string(path).map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(FALLBACK_LABEL);

    let reference = parse_reference(
        &content,
        &path.display().to_string(),
        default_crs,
        label_property,
        label,
        fallback,
    )?;

    log::info!(
        "Loaded reference geometry '{}' ({}) from {}",
        reference.label(),
        reference.crs(),
        path.display()
    );
    Ok(reference)
}

/// Parses a reference geometry from `GeoJSON` text. `name` is only used in
/// errors.
///
/// # Errors
///
/// See [`read_reference_geojson`].
pub fn parse_reference(
    content: &str,
    name: &str,
    default_crs: Crs,
    label_property: &str,
    label: Option<&str>,
    fallback_label: &str,
) -> Result<ReferenceGeometry, IoError> {
    let geojson: GeoJson = content.parse()?;

    let declared = match &geojson {
        GeoJson::Geometry(geometry) => declared_crs(geometry.foreign_members.as_ref(), name)?,
        GeoJson::Feature(feature) => declared_crs(feature.foreign_members.as_ref(), name)?,
        GeoJson::FeatureCollection(collection) => {
            declared_crs(collection.foreign_members.as_ref(), name)?
        }
    };
    let crs = declared.unwrap_or_else(|| {
        log::debug!("{name} declares no CRS; assuming {default_crs}");
        default_crs
    });

    let (geometry, resolved_label) = match geojson {
        GeoJson::Geometry(geometry) => {
            let resolved = label.unwrap_or(fallback_label).to_string();
            (geometry, resolved)
        }
        GeoJson::Feature(feature) => select_feature(
            std::iter::once(feature),
            name,
            label_property,
            label,
            fallback_label,
        )?,
        GeoJson::FeatureCollection(collection) => select_feature(
            collection.features.into_iter(),
            name,
            label_property,
            label,
            fallback_label,
        )?,
    };

    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    if matches!(geometry, geo::Geometry::Point(_) | geo::Geometry::MultiPoint(_)) {
        return Err(IoError::UnsupportedGeometry {
            path: name.to_string(),
            message: "expected a line or polygon, found a point".to_string(),
        });
    }

    Ok(ReferenceGeometry::new(resolved_label, crs, geometry))
}

/// Picks the feature to use and resolves its label.
fn select_feature(
    features: impl Iterator<Item = Feature>,
    name: &str,
    label_property: &str,
    label: Option<&str>,
    fallback_label: &str,
) -> Result<(geojson::Geometry, String), IoError> {
    let mut features = features.filter(|f| f.geometry.is_some());

    let feature = match label {
        Some(wanted) => features
            .find(|f| property_str(f, label_property) == Some(wanted))
            .ok_or_else(|| IoError::FeatureNotFound {
                path: name.to_string(),
                property: label_property.to_string(),
                label: wanted.to_string(),
            })?,
        None => features.next().ok_or_else(|| IoError::UnsupportedGeometry {
            path: name.to_string(),
            message: "no feature has a geometry".to_string(),
        })?,
    };

    let resolved = label
        .or_else(|| property_str(&feature, label_property))
        .unwrap_or(fallback_label)
        .to_string();

    let geometry = feature
        .geometry
        .ok_or_else(|| IoError::UnsupportedGeometry {
            path: name.to_string(),
            message: "feature has no geometry".to_string(),
        })?;

    Ok((geometry, resolved))
}

/// Reads the legacy `crs` member, either
/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32636"}}`
/// or `{"type": "EPSG", "properties": {"code": 32636}}`.
fn declared_crs(members: Option<&JsonObject>, name: &str) -> Result<Option<Crs>, IoError> {
    let Some(crs) = members.and_then(|m| m.get("crs")) else {
        return Ok(None);
    };
    if crs.is_null() {
        return Ok(None);
    }

    let properties = crs.get("properties");
    if let Some(code) = properties
        .and_then(|p| p.get("code"))
        .and_then(serde_json::Value::as_u64)
        .and_then(|code| u32::try_from(code).ok())
    {
        return Ok(Some(Crs::new(code)));
    }

    let crs_name = properties
        .and_then(|p| p.get("name"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    parse_crs_name(crs_name)
        .map(Some)
        .ok_or_else(|| IoError::UnsupportedCrs {
            path: name.to_string(),
            name: crs_name.to_string(),
        })
}

/// EPSG code from an OGC CRS name such as `EPSG:4326`,
/// `urn:ogc:def:crs:EPSG::4326` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
fn parse_crs_name(name: &str) -> Option<Crs> {
    let upper = name.trim().to_ascii_uppercase();
    if upper.ends_with("CRS84") {
        return Some(Crs::WGS84);
    }
    if upper.ends_with("CRS83") {
        return Some(Crs::new(4269));
    }
    if upper.ends_with("CRS27") {
        return Some(Crs::new(4267));
    }
    if !upper.contains("EPSG") {
        return None;
    }

    upper
        .rsplit([':', '/'])
        .find(|part| !part.is_empty())
        .and_then(|code| code.parse().ok())
        .map(Crs::new)
}

fn property_str<'a>(feature: &'a Feature, property: &str) -> Option<&'a str> {
    feature
        .property(property)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
