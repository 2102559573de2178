//! Subcommand implementations.
//!
//! Each command loads its inputs through `telecom_sites_io`, runs the
//! relevant pipeline stages, and writes the result. Failures are logged
//! with the stage that raised them before being returned.

use std::path::Path;
use std::time::Instant;

use telecom_sites_cli_utils::{IndicatifProgress, MultiProgress};
use telecom_sites_io::sink::{self, OutputGeometry};
use telecom_sites_io::{reference, sites};
use telecom_sites_models::ProximityConfig;
use telecom_sites_proximity::matrix::DistanceMatrix;
use telecom_sites_proximity::pipeline;

/// Inputs for the `tag` subcommand.
pub struct TagArgs<'a> {
    pub sites: &'a Path,
    pub reference: &'a Path,
    pub label: Option<&'a str>,
    pub label_property: &'a str,
    pub output: &'a Path,
    pub buffers: bool,
}

/// Builds and writes the distance matrix.
///
/// # Errors
///
/// Returns an error if loading, building, or writing fails.
pub fn matrix(
    sites_path: &Path,
    output: &Path,
    config: &ProximityConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = sites::read_sites_csv(sites_path)
        .inspect_err(|e| log::error!("Loading sites failed: {e}"))?;

    let matrix = DistanceMatrix::build_with(&loaded.sites, config.crs, config.parallel)
        .inspect_err(|e| log::error!("Building distance matrix failed: {e}"))?;

    sink::write_distance_matrix_csv(output, &matrix)
        .inspect_err(|e| log::error!("Writing matrix failed: {e}"))?;
    Ok(())
}

/// Computes and writes neighbour statistics for every site.
///
/// # Errors
///
/// Returns an error if loading, any pipeline stage, or writing fails.
pub fn neighbours(
    sites_path: &Path,
    output: &Path,
    config: &ProximityConfig,
    k: usize,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = sites::read_sites_csv(sites_path)
        .inspect_err(|e| log::error!("Loading sites failed: {e}"))?;

    let matrix = DistanceMatrix::build_with(&loaded.sites, config.crs, config.parallel)
        .inspect_err(|e| log::error!("Building distance matrix failed: {e}"))?;

    let progress = IndicatifProgress::stage_bar(multi, "Neighbour statistics");
    let table = pipeline::neighbour_table(
        &matrix,
        k,
        config.sd_convention,
        config.parallel,
        &progress,
    )
    .inspect_err(|e| log::error!("Neighbour statistics failed: {e}"))?;

    sink::write_neighbour_stats_csv(output, matrix.ids(), &table)
        .inspect_err(|e| log::error!("Writing neighbour statistics failed: {e}"))?;
    Ok(())
}

/// Runs the full pipeline and writes annotated sites.
///
/// # Errors
///
/// Returns an error if loading, the pipeline, or writing fails. Sites that
/// could not be classified individually are logged and written with the
/// unknown tag instead.
pub fn tag(
    args: &TagArgs<'_>,
    config: &ProximityConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let loaded = sites::read_sites_csv(args.sites)
        .inspect_err(|e| log::error!("Loading sites failed: {e}"))?;
    let reference = reference::read_reference_geojson(
        args.reference,
        config.crs,
        args.label_property,
        args.label,
    )
    .inspect_err(|e| log::error!("Loading reference geometry failed: {e}"))?;

    let progress = IndicatifProgress::stage_bar(multi, "Proximity pipeline");
    let output = pipeline::run(&loaded.sites, &reference, config, &progress)
        .inspect_err(|e| log::error!("Proximity pipeline failed: {e}"))?;

    for failure in &output.failures {
        log::warn!("Site {} tagged as unknown: {}", failure.id, failure.error);
    }

    let is_geojson = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));

    if is_geojson {
        let geometry = if args.buffers {
            OutputGeometry::Buffers {
                quadrant_segments: config.quadrant_segments,
            }
        } else {
            OutputGeometry::Points
        };
        sink::write_annotated_geojson(args.output, &output.sites, geometry)
            .inspect_err(|e| log::error!("Writing results failed: {e}"))?;
    } else {
        if args.buffers {
            log::warn!("--buffers only applies to GeoJSON output; writing points to CSV");
        }
        sink::write_annotated_csv(args.output, &output.sites)
            .inspect_err(|e| log::error!("Writing results failed: {e}"))?;
    }

    log::info!(
        "Tagged {} of {} sites as '{}' in {:.2?}",
        output.matched(),
        output.sites.len(),
        reference.label(),
        start.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const SITES: &str = "id,x,y,discovery_date\n\
                         A,0,0,2023-01-05\n\
                         B,10,0,2023-01-05\n\
                         C,10,10,2023-02-11\n\
                         D,50,50,2023-03-20\n\
                         E,70,70,\n";

    const ROAD: &str = r#"{
        "type": "Feature",
        "properties": { "name": "Ring Road" },
        "geometry": { "type": "LineString", "coordinates": [[5.0, 0.0], [5.0, 10.0]] }
    }"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("telecom_sites_cli_{}_{name}", std::process::id()))
    }

    fn config() -> ProximityConfig {
        ProximityConfig {
            k: 2,
            parallel: false,
            ..ProximityConfig::default()
        }
    }

    fn run_tag(
        name: &str,
        reference: &str,
        extension: &str,
        buffers: bool,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let sites_path = temp_path(&format!("{name}_sites.csv"));
        let reference_path = temp_path(&format!("{name}_road.geojson"));
        let output_path = temp_path(&format!("{name}_out.{extension}"));
        std::fs::write(&sites_path, SITES)?;
        std::fs::write(&reference_path, reference)?;

        let result = tag(
            &TagArgs {
                sites: &sites_path,
                reference: &reference_path,
                label: None,
                label_property: "name",
                output: &output_path,
                buffers,
            },
            &config(),
            &MultiProgress::new(),
        )
        .and_then(|()| std::fs::read_to_string(&output_path).map_err(Into::into));

        for path in [&sites_path, &reference_path, &output_path] {
            std::fs::remove_file(path).ok();
        }
        result
    }

    #[test]
    fn tag_writes_csv_and_ignores_buffers_flag() {
        let written = run_tag("csv", ROAD, "csv", true).unwrap();
        let lines: Vec<&str> = written.lines().collect();

        assert_eq!(
            lines[0],
            "id,x,y,nearestK,nearestMean,nearestSd,nearestSites,tag"
        );
        // E has no discovery date and is dropped on load.
        assert_eq!(lines.len(), 5);
        assert!(lines[1..].iter().all(|line| line.ends_with(",Ring Road")));
        assert!(lines[1].starts_with("A,0.0,0.0,2,"));
    }

    #[test]
    fn tag_writes_buffer_polygons_to_geojson() {
        let written = run_tag("geojson", ROAD, "geojson", true).unwrap();
        assert!(written.contains("\"FeatureCollection\""));
        assert!(written.contains("\"Polygon\""));
        assert!(!written.contains("\"Point\""));
        assert!(written.contains("\"tag\": \"Ring Road\""));
    }

    #[test]
    fn tag_writes_points_to_geojson_without_buffers_flag() {
        let written = run_tag("points", ROAD, "json", false).unwrap();
        assert!(written.contains("\"Point\""));
        assert!(!written.contains("\"Polygon\""));
    }

    #[test]
    fn tag_rejects_reference_declared_in_other_crs() {
        let road = r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4326" } },
            "features": [{
                "type": "Feature",
                "properties": { "name": "Ring Road" },
                "geometry": { "type": "LineString", "coordinates": [[5.0, 0.0], [5.0, 10.0]] }
            }]
        }"#;
        assert!(run_tag("crs", road, "csv", false).is_err());
    }
}
