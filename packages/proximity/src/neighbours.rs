//! k-nearest-neighbour statistics over one distance row.

use telecom_sites_models::{NeighbourStats, SdConvention};

use crate::ProximityError;

/// Converts a configured neighbour count into a usable one.
///
/// # Errors
///
/// Returns [`ProximityError::InvalidArgument`] if `k` is zero or negative.
pub fn neighbour_count(k: i64) -> Result<usize, ProximityError> {
    if k <= 0 {
        return Err(ProximityError::invalid_argument(format!(
            "neighbour count must be positive, got {k}"
        )));
    }
    usize::try_from(k)
        .map_err(|_| ProximityError::invalid_argument(format!("neighbour count {k} is too large")))
}

/// Computes the `k_requested` nearest neighbours of `self_id` from its
/// distance row.
///
/// `row` maps every site identifier to its distance from `self_id`, and may
/// include `self_id` itself. The entry for `self_id` is skipped by
/// identifier, so a different site at distance zero still counts as a
/// neighbour. Equal distances keep their order in `row`.
///
/// Fewer than `k_requested` neighbours are returned when the row does not
/// have that many other sites.
///
/// # Errors
///
/// * [`ProximityError::InvalidArgument`] if `k_requested` is zero.
/// * [`ProximityError::InvalidInput`] if the row has no other site or holds
///   a negative or non-finite distance.
pub fn neighbour_stats<'a>(
    self_id: &str,
    row: impl IntoIterator<Item = (&'a str, f64)>,
    k_requested: usize,
    convention: SdConvention,
) -> Result<NeighbourStats, ProximityError> {
    if k_requested == 0 {
        return Err(ProximityError::invalid_argument(
            "neighbour count must be positive, got 0",
        ));
    }

    let mut others: Vec<(&str, f64)> = Vec::new();
    for (id, distance) in row {
        if id == self_id {
            continue;
        }
        if !distance.is_finite() || distance < 0.0 {
            return Err(ProximityError::invalid_input(format!(
                "distance from {self_id} to {id} is {distance}"
            )));
        }
        others.push((id, distance));
    }

    if others.is_empty() {
        return Err(ProximityError::invalid_input(format!(
            "site {self_id} has no other sites to compare against"
        )));
    }

    // Stable, so ties stay in row order.
    others.sort_by(|a, b| a.1.total_cmp(&b.1));

    let k = k_requested.min(others.len());
    let nearest = &others[..k];
    let distances: Vec<f64> = nearest.iter().map(|(_, d)| *d).collect();
    let (mean, sd) = summarize(&distances, convention);

    Ok(NeighbourStats {
        k,
        names: nearest.iter().map(|(id, _)| (*id).to_string()).collect(),
        mean,
        sd,
    })
}

/// Mean and standard deviation of a non-empty sample.
///
/// The standard deviation is `None` when the convention leaves it
/// undefined: a single value under [`SdConvention::Sample`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(values: &[f64], convention: SdConvention) -> (f64, Option<f64>) {
    let n = values.len();
    if n == 0 {
        return (f64::NAN, None);
    }

    let mean = values.iter().sum::<f64>() / n as f64;

    let divisor = match convention {
        SdConvention::Sample => n - 1,
        SdConvention::Population => n,
    };
    if divisor == 0 {
        return (mean, None);
    }

    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, Some((squares / divisor as f64).sqrt()))
}
