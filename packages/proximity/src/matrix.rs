//! Dense pairwise distance matrix over projected sites.
//!
//! Distances are planar Euclidean in the linear unit of the declared
//! reference system. The matrix is O(N²) in time and memory, which is fine
//! for the few thousand sites this pipeline targets; anything larger needs
//! a spatial index instead.

use std::collections::BTreeMap;

use geo::{Distance, Euclidean, Point};
use rayon::prelude::*;
use telecom_sites_models::{Crs, Site};

use crate::ProximityError;

/// Square, symmetric, zero-diagonal matrix of site-to-site distances,
/// indexed by site identifier on both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    ids: Vec<String>,
    index: BTreeMap<String, usize>,
    /// Row-major, `ids.len()` squared.
    distances: Vec<f64>,
    crs: Crs,
}

impl DistanceMatrix {
    /// Builds the matrix sequentially.
    ///
    /// # Errors
    ///
    /// See [`Self::build_with`].
    pub fn build(sites: &[Site], crs: Crs) -> Result<Self, ProximityError> {
        Self::build_with(sites, crs, false)
    }

    /// Builds the matrix, optionally computing rows on the rayon pool.
    ///
    /// Only the upper triangle is computed; the lower triangle is a mirror
    /// of it, so `get(a, b) == get(b, a)` holds bit-for-bit.
    ///
    /// # Errors
    ///
    /// Returns [`ProximityError::InvalidInput`] if fewer than two sites are
    /// given, an identifier repeats, a coordinate is not finite, or `crs`
    /// is a geographic (lat/long) system.
    pub fn build_with(sites: &[Site], crs: Crs, parallel: bool) -> Result<Self, ProximityError> {
        let index = validate_sites(sites, crs)?;

        let n = sites.len();
        let points: Vec<Point<f64>> = sites.iter().map(|s| Point::new(s.x, s.y)).collect();

        let upper_row = |i: usize| -> Vec<f64> {
            ((i + 1)..n)
                .map(|j| Euclidean.distance(points[i], points[j]))
                .collect()
        };

        let upper: Vec<Vec<f64>> = if parallel {
            (0..n).into_par_iter().map(upper_row).collect()
        } else {
            (0..n).map(upper_row).collect()
        };

        let mut distances = vec![0.0; n * n];
        for (i, row) in upper.iter().enumerate() {
            for (offset, &d) in row.iter().enumerate() {
                let j = i + 1 + offset;
                distances[i * n + j] = d;
                distances[j * n + i] = d;
            }
        }

        log::debug!("Built {n}x{n} distance matrix in {crs}");

        Ok(Self {
            ids: sites.iter().map(|s| s.id.clone()).collect(),
            index,
            distances,
            crs,
        })
    }

    /// Number of sites (rows and columns).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always `false`: a matrix has at least two sites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Site identifiers in input order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Reference system the distances are measured in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Distance between two sites, or `None` if either is unknown.
    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.distances[i * self.len() + j])
    }

    /// The row for `id`, or `None` if the identifier is unknown.
    #[must_use]
    pub fn row(&self, id: &str) -> Option<DistanceRow<'_>> {
        self.index_of(id).map(|i| self.row_at(i))
    }

    /// The row at position `i` in input order.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    #[must_use]
    pub fn row_at(&self, i: usize) -> DistanceRow<'_> {
        let n = self.len();
        DistanceRow {
            id: &self.ids[i],
            ids: &self.ids,
            distances: &self.distances[i * n..(i + 1) * n],
        }
    }

    /// Iterates every row in input order.
    pub fn rows(&self) -> impl Iterator<Item = DistanceRow<'_>> {
        (0..self.len()).map(|i| self.row_at(i))
    }
}

/// One row of a [`DistanceMatrix`]: the distances from one site to every
/// site, itself included.
#[derive(Debug, Clone, Copy)]
pub struct DistanceRow<'a> {
    id: &'a str,
    ids: &'a [String],
    distances: &'a [f64],
}

impl<'a> DistanceRow<'a> {
    /// Identifier of the site this row belongs to.
    #[must_use]
    pub const fn id(&self) -> &'a str {
        self.id
    }

    /// `(identifier, distance)` pairs in input order, including self.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.distances.iter().copied())
    }
}

/// Checks the site set and returns the identifier index.
fn validate_sites(sites: &[Site], crs: Crs) -> Result<BTreeMap<String, usize>, ProximityError> {
    if crs.is_geographic() {
        return Err(ProximityError::invalid_input(format!(
            "{crs} is a geographic reference system; project sites to a planar system first"
        )));
    }

    if sites.len() < 2 {
        return Err(ProximityError::invalid_input(format!(
            "at least 2 sites are required, got {}",
            sites.len()
        )));
    }

    let mut index = BTreeMap::new();
    for (i, site) in sites.iter().enumerate() {
        if !site.has_finite_coords() {
            return Err(ProximityError::invalid_input(format!(
                "site {} has non-finite coordinates ({}, {})",
                site.id, site.x, site.y
            )));
        }
        if index.insert(site.id.clone(), i).is_some() {
            return Err(ProximityError::invalid_input(format!(
                "duplicate site identifier: {}",
                site.id
            )));
        }
    }

    Ok(index)
}
