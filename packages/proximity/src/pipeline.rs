//! Builder → neighbour statistics → classifier, in one call.
//!
//! Matrix and statistics failures abort the run. Classification failures
//! that concern a single site are recorded in
//! [`PipelineOutput::failures`] and the site is tagged with the unknown
//! marker; failures of the shared reference geometry abort the run.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use telecom_sites_models::{AnnotatedSite, NeighbourStats, ProximityConfig, SdConvention, Site};

use crate::ProximityError;
use crate::classify::{Classifier, ReferenceGeometry};
use crate::matrix::DistanceMatrix;
use crate::neighbours::{neighbour_count, neighbour_stats};
use crate::progress::ProgressCallback;

/// A site that could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFailure {
    pub id: String,
    pub error: ProximityError,
}

/// Annotated sites in input order, plus any per-site failures.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub sites: Vec<AnnotatedSite>,
    pub failures: Vec<SiteFailure>,
}

impl PipelineOutput {
    /// Number of sites tagged with the reference's label.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.sites.iter().filter(|s| s.tag.is_match()).count()
    }
}

/// Checks the configuration values the pipeline depends on and returns the
/// neighbour count.
///
/// # Errors
///
/// Returns [`ProximityError::InvalidArgument`] if `k` is not positive or
/// `quadrant_segments` is zero, and [`ProximityError::InvalidInput`] if
/// the configured reference system is geographic.
pub fn validate_config(config: &ProximityConfig) -> Result<usize, ProximityError> {
    let k = neighbour_count(config.k)?;
    if config.quadrant_segments == 0 {
        return Err(ProximityError::invalid_argument(
            "buffer quadrant segments must be positive",
        ));
    }
    if config.crs.is_geographic() {
        return Err(ProximityError::invalid_input(format!(
            "{} is a geographic reference system; project sites to a planar system first",
            config.crs
        )));
    }
    Ok(k)
}

/// Neighbour statistics for every row of `matrix`, in matrix order.
///
/// # Errors
///
/// Returns the first error raised by [`neighbour_stats`].
pub fn neighbour_table(
    matrix: &DistanceMatrix,
    k: usize,
    convention: SdConvention,
    parallel: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<NeighbourStats>, ProximityError> {
    progress.set_total(matrix.len() as u64);
    progress.set_message("Neighbour statistics".to_string());

    let stats_for = |i: usize| {
        let row = matrix.row_at(i);
        let stats = neighbour_stats(row.id(), row.entries(), k, convention);
        progress.inc(1);
        stats
    };

    let table = if parallel {
        (0..matrix.len())
            .into_par_iter()
            .map(stats_for)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        (0..matrix.len())
            .map(stats_for)
            .collect::<Result<Vec<_>, _>>()?
    };

    progress.finish(format!("Neighbour statistics for {} sites", table.len()));
    Ok(table)
}

/// Runs the full pipeline over `sites`, which are declared to be in
/// `config.crs`.
///
/// # Errors
///
/// * [`ProximityError::InvalidArgument`] for a bad neighbour count or
///   segment count.
/// * [`ProximityError::InvalidInput`] for an unusable site set or a
///   reference system mismatch.
/// * [`ProximityError::Geometry`] if the reference geometry is invalid.
pub fn run(
    sites: &[Site],
    reference: &ReferenceGeometry,
    config: &ProximityConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PipelineOutput, ProximityError> {
    let start = Instant::now();
    let k = validate_config(config)?;

    let matrix = DistanceMatrix::build_with(sites, config.crs, config.parallel)?;
    log::info!(
        "Built distance matrix for {} sites in {:.2?}",
        matrix.len(),
        start.elapsed()
    );

    let classifier = Classifier::new(
        reference,
        matrix.crs(),
        config.labels.clone(),
        config.quadrant_segments,
    )?;

    let table = neighbour_table(&matrix, k, config.sd_convention, config.parallel, progress)?;

    progress.set_total(sites.len() as u64);
    progress.set_message(format!("Tagging against '{}'", classifier.label()));

    let classify_one = |(site, stats): (&Site, NeighbourStats)| {
        let outcome = match classifier.classify(site, stats.mean) {
            Ok(tag) => (AnnotatedSite::new(site, stats, tag), None),
            Err(error) => {
                log::warn!("Could not classify site {}: {error}", site.id);
                let failure = SiteFailure {
                    id: site.id.clone(),
                    error,
                };
                (
                    AnnotatedSite::new(site, stats, classifier.unknown_tag()),
                    Some(failure),
                )
            }
        };
        progress.inc(1);
        outcome
    };

    let outcomes: Vec<(AnnotatedSite, Option<SiteFailure>)> = if config.parallel {
        sites
            .par_iter()
            .zip(table.into_par_iter())
            .map(classify_one)
            .collect()
    } else {
        sites.iter().zip(table).map(classify_one).collect()
    };

    let mut annotated = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (site, failure) in outcomes {
        annotated.push(site);
        failures.extend(failure);
    }

    let output = PipelineOutput {
        sites: annotated,
        failures,
    };

    progress.finish(format!(
        "Tagged {} of {} sites as '{}'",
        output.matched(),
        output.sites.len(),
        classifier.label()
    ));
    log::info!(
        "Pipeline finished in {:.2?}: {} matched, {} unclassified",
        start.elapsed(),
        output.matched(),
        output.failures.len()
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use geo::{LineString, coord};
    use telecom_sites_models::{Crs, Tag};

    use super::*;
    use crate::progress::null_progress;

    fn corner_sites() -> Vec<Site> {
        vec![
            Site::new("A", 0.0, 0.0),
            Site::new("B", 10.0, 0.0),
            Site::new("C", 10.0, 10.0),
            Site::new("D", 50.0, 50.0),
        ]
    }

    fn road() -> ReferenceGeometry {
        ReferenceGeometry::new(
            "Ring Road",
            Crs::UTM_36N,
            LineString::new(vec![coord! { x: 5.0, y: 0.0 }, coord! { x: 5.0, y: 10.0 }]),
        )
    }

    fn config(k: i64, parallel: bool) -> ProximityConfig {
        ProximityConfig {
            k,
            parallel,
            ..ProximityConfig::default()
        }
    }

    #[test]
    fn four_corner_scenario() {
        let output = run(&corner_sites(), &road(), &config(2, false), &null_progress()).unwrap();
        assert!(output.failures.is_empty());

        let a = &output.sites[0];
        assert_eq!(a.id, "A");
        assert_eq!(a.nearest_k, 2);
        assert_eq!(a.nearest_sites, vec!["B", "C"]);
        assert!((a.nearest_mean - 12.071_067_811_865_476).abs() < 1e-9);
        assert!((a.nearest_sd.unwrap() - 2.928_932_188_134_524).abs() < 1e-9);

        // B's neighbours A and C tie at 10; A comes first in input order.
        let b = &output.sites[1];
        assert_eq!(b.nearest_sites, vec!["A", "C"]);
        assert!((b.nearest_mean - 10.0).abs() < 1e-12);
        assert!(b.nearest_sd.unwrap().abs() < 1e-12);

        let d = &output.sites[3];
        assert_eq!(d.nearest_sites, vec!["C", "B"]);

        // Every disc reaches x = 5 within y in [0, 10]. D only just does:
        // its radius is ~60.30 and the road's end is ~60.21 away.
        for site in &output.sites {
            assert_eq!(site.tag, Tag::Matched("Ring Road".to_string()), "{}", site.id);
        }
    }

    #[test]
    fn only_discs_crossing_the_road_are_tagged() {
        let road = ReferenceGeometry::new(
            "Ring Road",
            Crs::UTM_36N,
            LineString::new(vec![coord! { x: 5.0, y: 0.0 }, coord! { x: 5.0, y: 10.0 }]),
        );
        // k = 1: A and B have radius 10, C ~20.62 (to A), D ~56.57 (to C).
        let sites = vec![
            Site::new("A", -20.0, 0.0),
            Site::new("B", -30.0, 0.0),
            Site::new("C", 0.0, 5.0),
            Site::new("D", 40.0, 45.0),
        ];
        let output = run(&sites, &road, &config(1, false), &null_progress()).unwrap();

        let tags: Vec<bool> = output.sites.iter().map(|s| s.tag.is_match()).collect();
        // A: radius 10, 25 from the road. B: radius 10, 35 away.
        // C: radius ~20.62, 5 away. D: radius ~56.57, ~49.50 away.
        assert_eq!(tags, vec![false, false, true, true]);
        assert_eq!(output.matched(), 2);
        assert_eq!(output.sites[0].tag.label(), "None");
    }

    #[test]
    fn two_site_run_reports_undefined_sd() {
        let sites = vec![Site::new("P1", 0.0, 0.0), Site::new("P2", 3.0, 4.0)];
        let output = run(&sites, &road(), &config(3, false), &null_progress()).unwrap();

        for site in &output.sites {
            assert_eq!(site.nearest_k, 1);
            assert!((site.nearest_mean - 5.0).abs() < 1e-12);
            assert_eq!(site.nearest_sd, None);
        }
    }

    #[test]
    fn reruns_are_identical() {
        let sites: Vec<Site> = (0..60)
            .map(|i| {
                let f = f64::from(i);
                Site::new(format!("S{i}"), (f * 7.3) % 40.0, (f * 3.1) % 25.0)
            })
            .collect();

        let first = run(&sites, &road(), &config(3, true), &null_progress()).unwrap();
        let second = run(&sites, &road(), &config(3, true), &null_progress()).unwrap();
        let sequential = run(&sites, &road(), &config(3, false), &null_progress()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, sequential);
    }

    #[test]
    fn names_never_contain_self_and_are_sorted() {
        let sites: Vec<Site> = (0..30)
            .map(|i| {
                let f = f64::from(i);
                Site::new(format!("S{i}"), (f * 11.0) % 17.0, (f * 5.0) % 13.0)
            })
            .collect();
        let matrix = DistanceMatrix::build(&sites, Crs::UTM_36N).unwrap();
        let table =
            neighbour_table(&matrix, 4, SdConvention::Sample, false, &null_progress()).unwrap();

        for (site, stats) in sites.iter().zip(&table) {
            assert_eq!(stats.k, 4);
            assert!(!stats.names.contains(&site.id));
            let distances: Vec<f64> = stats
                .names
                .iter()
                .map(|n| matrix.get(&site.id, n).unwrap())
                .collect();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn coincident_neighbour_gives_empty_buffer() {
        let sites = vec![
            Site::new("A", 5.0, 5.0),
            Site::new("B", 5.0, 5.0),
            Site::new("C", 80.0, 80.0),
        ];
        let output = run(&sites, &road(), &config(1, false), &null_progress()).unwrap();

        // A and B sit on the road but have zero radius.
        assert_eq!(output.sites[0].tag, Tag::Unmatched("None".to_string()));
        assert_eq!(output.sites[1].tag, Tag::Unmatched("None".to_string()));
        assert!(output.failures.is_empty());
    }

    #[test]
    fn rejects_non_positive_k_before_building() {
        let err = run(&corner_sites(), &road(), &config(0, false), &null_progress()).unwrap_err();
        assert!(matches!(err, ProximityError::InvalidArgument { .. }));

        let err = run(&corner_sites(), &road(), &config(-1, false), &null_progress()).unwrap_err();
        assert!(matches!(err, ProximityError::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_reference_in_another_crs() {
        let reference = ReferenceGeometry::new(
            "Ring Road",
            Crs::new(22992),
            LineString::new(vec![coord! { x: 5.0, y: 0.0 }, coord! { x: 5.0, y: 10.0 }]),
        );
        let err =
            run(&corner_sites(), &reference, &config(2, false), &null_progress()).unwrap_err();
        assert!(matches!(err, ProximityError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_duplicate_sites() {
        let sites = vec![Site::new("A", 0.0, 0.0), Site::new("A", 1.0, 1.0)];
        let err = run(&sites, &road(), &config(2, false), &null_progress()).unwrap_err();
        assert!(matches!(err, ProximityError::InvalidInput { .. }));
    }
}
