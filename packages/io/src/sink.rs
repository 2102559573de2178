//! Result sinks for annotated sites.

use std::path::Path;

use geojson::{Feature, FeatureCollection, JsonObject, feature::Id};
use serde::Serialize;
use telecom_sites_models::{AnnotatedSite, NeighbourStats};
use telecom_sites_proximity::buffer::Buffer;
use telecom_sites_proximity::matrix::DistanceMatrix;

use crate::IoError;

/// Separator for neighbour identifiers in a single CSV cell.
pub const NEIGHBOUR_SEPARATOR: &str = ";";

/// Geometry written for each site in `GeoJSON` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputGeometry {
    /// The site location.
    Points,
    /// The site's buffer polygon. Sites with an empty buffer are written as
    /// points.
    Buffers {
        /// Segments per quarter circle.
        quadrant_segments: u32,
    },
}

/// A flattened CSV row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotatedRow<'a> {
    id: &'a str,
    x: f64,
    y: f64,
    nearest_k: usize,
    nearest_mean: f64,
    nearest_sd: Option<f64>,
    nearest_sites: String,
    tag: &'a str,
}

impl<'a> From<&'a AnnotatedSite> for AnnotatedRow<'a> {
    fn from(site: &'a AnnotatedSite) -> Self {
        Self {
            id: &site.id,
            x: site.x,
            y: site.y,
            nearest_k: site.nearest_k,
            nearest_mean: site.nearest_mean,
            nearest_sd: site.nearest_sd,
            nearest_sites: site.nearest_sites.join(NEIGHBOUR_SEPARATOR),
            tag: site.tag.label(),
        }
    }
}

/// Writes one CSV row per site. An undefined standard deviation is an
/// empty cell.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the file cannot be created or written.
pub fn write_annotated_csv(path: &Path, sites: &[AnnotatedSite]) -> Result<(), IoError> {
    let csv_err = |e: csv::Error| IoError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for site in sites {
        writer.serialize(AnnotatedRow::from(site)).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!("Wrote {} annotated sites to {}", sites.len(), path.display());
    Ok(())
}

/// Writes the full distance matrix as a square CSV table. The header row
/// and first column hold the site identifiers.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the file cannot be created or written.
pub fn write_distance_matrix_csv(path: &Path, matrix: &DistanceMatrix) -> Result<(), IoError> {
    let csv_err = |e: csv::Error| IoError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;

    let mut header = vec![String::new()];
    header.extend(matrix.ids().iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    for row in matrix.rows() {
        let mut record = vec![row.id().to_string()];
        record.extend(row.entries().map(|(_, d)| d.to_string()));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!(
        "Wrote {n}x{n} distance matrix to {}",
        path.display(),
        n = matrix.len()
    );
    Ok(())
}

/// A flattened neighbour statistics row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NeighbourRow<'a> {
    id: &'a str,
    nearest_k: usize,
    nearest_mean: f64,
    nearest_sd: Option<f64>,
    nearest_sites: String,
}

/// Writes one row of neighbour statistics per site. `ids` and `stats` are
/// parallel.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the file cannot be created or written.
pub fn write_neighbour_stats_csv(
    path: &Path,
    ids: &[String],
    stats: &[NeighbourStats],
) -> Result<(), IoError> {
    let csv_err = |e: csv::Error| IoError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for (id, stats) in ids.iter().zip(stats) {
        writer
            .serialize(NeighbourRow {
                id,
                nearest_k: stats.k,
                nearest_mean: stats.mean,
                nearest_sd: stats.sd,
                nearest_sites: stats.names.join(NEIGHBOUR_SEPARATOR),
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!("Wrote neighbour statistics for {} sites to {}", ids.len(), path.display());
    Ok(())
}

/// Builds a `FeatureCollection` with one feature per site. Annotations
/// become properties; an undefined standard deviation is `null`.
///
/// # Errors
///
/// Returns [`IoError::Json`] if a site cannot be serialized.
pub fn annotated_feature_collection(
    sites: &[AnnotatedSite],
    geometry: OutputGeometry,
) -> Result<FeatureCollection, IoError> {
    let features = sites
        .iter()
        .map(|site| site_feature(site, geometry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes the annotated sites as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`IoError::Json`] on serialization failure and [`IoError::Io`]
/// if the file cannot be written.
pub fn write_annotated_geojson(
    path: &Path,
    sites: &[AnnotatedSite],
    geometry: OutputGeometry,
) -> Result<(), IoError> {
    let collection = annotated_feature_collection(sites, geometry)?;
    let json = serde_json::to_string_pretty(&collection)?;

    std::fs::write(path, json).map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    log::info!("Wrote {} features to {}", sites.len(), path.display());
    Ok(())
}

fn site_feature(site: &AnnotatedSite, geometry: OutputGeometry) -> Result<Feature, IoError> {
    let center = geo::Point::new(site.x, site.y);

    let value = match geometry {
        OutputGeometry::Points => geojson::Value::from(&center),
        OutputGeometry::Buffers { quadrant_segments } => {
            // Sites that failed classification may not have a usable
            // radius; fall back to the point.
            match Buffer::disc(center, site.nearest_mean, quadrant_segments) {
                Ok(Buffer::Disc { polygon, .. }) => geojson::Value::from(&polygon),
                Ok(Buffer::Empty { .. }) | Err(_) => geojson::Value::from(&center),
            }
        }
    };

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), site.id.clone().into());
    properties.insert("nearestK".to_string(), site.nearest_k.into());
    properties.insert(
        "nearestMean".to_string(),
        serde_json::to_value(site.nearest_mean)?,
    );
    properties.insert(
        "nearestSd".to_string(),
        serde_json::to_value(site.nearest_sd)?,
    );
    properties.insert(
        "nearestSites".to_string(),
        serde_json::to_value(&site.nearest_sites)?,
    );
    properties.insert("tag".to_string(), site.tag.label().into());

    Ok(Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: Some(Id::String(site.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use telecom_sites_models::Tag;

    use super::*;

    fn annotated() -> Vec<AnnotatedSite> {
        vec![
            AnnotatedSite {
                id: "A".to_string(),
                x: 0.0,
                y: 0.0,
                nearest_k: 2,
                nearest_mean: 12.5,
                nearest_sd: Some(2.5),
                nearest_sites: vec!["B".to_string(), "C".to_string()],
                tag: Tag::Matched("Ring Road".to_string()),
            },
            AnnotatedSite {
                id: "B".to_string(),
                x: 10.0,
                y: 0.0,
                nearest_k: 1,
                nearest_mean: 10.0,
                nearest_sd: None,
                nearest_sites: vec!["A".to_string()],
                tag: Tag::Unmatched("None".to_string()),
            },
        ]
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("telecom_sites_io_{}_{name}", std::process::id()))
    }

    #[test]
    fn csv_leaves_undefined_sd_empty() {
        let path = temp_path("annotated.csv");
        write_annotated_csv(&path, &annotated()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "id,x,y,nearestK,nearestMean,nearestSd,nearestSites,tag"
        );
        assert_eq!(lines[1], "A,0.0,0.0,2,12.5,2.5,B;C,Ring Road");
        assert_eq!(lines[2], "B,10.0,0.0,1,10.0,,A,None");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn matrix_csv_is_square_with_labels() {
        use telecom_sites_models::{Crs, Site};

        let sites = vec![Site::new("A", 0.0, 0.0), Site::new("B", 3.0, 4.0)];
        let matrix = DistanceMatrix::build(&sites, Crs::UTM_36N).unwrap();
        let path = temp_path("matrix.csv");
        write_distance_matrix_csv(&path, &matrix).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec![",A,B", "A,0,5", "B,5,0"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn neighbour_csv_lists_names_in_order() {
        let path = temp_path("neighbours.csv");
        let ids = vec!["A".to_string()];
        let stats = vec![NeighbourStats {
            k: 2,
            names: vec!["C".to_string(), "B".to_string()],
            mean: 1.5,
            sd: None,
        }];
        write_neighbour_stats_csv(&path, &ids, &stats).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "id,nearestK,nearestMean,nearestSd,nearestSites");
        assert_eq!(lines[1], "A,2,1.5,,C;B");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn geojson_points_carry_annotations() {
        let collection =
            annotated_feature_collection(&annotated(), OutputGeometry::Points).unwrap();
        assert_eq!(collection.features.len(), 2);

        let b = &collection.features[1];
        assert!(matches!(
            b.geometry.as_ref().unwrap().value,
            geojson::Value::Point(_)
        ));
        assert!(b.property("nearestSd").unwrap().is_null());
        assert_eq!(b.property("tag").unwrap(), "None");
        assert_eq!(b.property("nearestSites").unwrap()[0], "A");
    }

    #[test]
    fn geojson_buffers_are_polygons() {
        let mut sites = annotated();
        sites[1].nearest_mean = 0.0;

        let collection = annotated_feature_collection(
            &sites,
            OutputGeometry::Buffers {
                quadrant_segments: 8,
            },
        )
        .unwrap();

        let a = collection.features[0].geometry.as_ref().unwrap();
        match &a.value {
            geojson::Value::Polygon(rings) => assert_eq!(rings[0].len(), 33),
            other => panic!("expected polygon, got {other:?}"),
        }
        assert!(matches!(
            collection.features[1].geometry.as_ref().unwrap().value,
            geojson::Value::Point(_)
        ));
    }

    #[test]
    fn writes_geojson_file() {
        let path = temp_path("annotated.geojson");
        write_annotated_geojson(&path, &annotated(), OutputGeometry::Points).unwrap();

        let parsed: GeoJsonCheck =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.kind, "FeatureCollection");
        assert_eq!(parsed.features.len(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[derive(serde::Deserialize)]
    struct GeoJsonCheck {
        #[serde(rename = "type")]
        kind: String,
        features: Vec<serde_json::Value>,
    }
}
