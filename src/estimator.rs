//! Cardinality estimation over the sketch.
//!
//! Every estimate is a linear-counting (occupancy) estimate: with `m`
//! slots of which `k` are occupied,
//!
//! ```text
//! estimate = -m * ln((m - k) / m)
//! ```
//!
//! - **dc** (destination cardinality): `m = p[i]`, `k` = distinct columns in the row
//! - **dpc** (destination-port cardinality): `m = u[i]`, `k` = distinct port
//!   slots across the row
//! - **sc** (source cardinality): `m = p[i]`, `k` = distinct rows touching the column
//!
//! A saturated table (`k = m`) is clamped to `m - k = 1` so the estimate
//! stays finite. Per-resolution estimates are rounded to hundredths; the
//! aggregate for an address is the floor of the minimum across resolutions.

use crate::sketch::{MultiResolutionSketch, ResolutionTable};

/// Linear-counting estimate for `occupied` of `modulus` slots.
///
/// Returns 0 for an empty set.
pub fn linear_count(modulus: u32, occupied: usize) -> f64 {
    if occupied == 0 {
        return 0.0;
    }
    let m = modulus as f64;
    let vacant = (modulus as usize).saturating_sub(occupied).max(1) as f64;
    round_hundredths(-m * (vacant / m).ln())
}

#[inline]
fn round_hundredths(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// =============================================================================
// Per-resolution estimates
// =============================================================================

impl ResolutionTable {
    /// `dc_i` of a row.
    pub fn destination_cardinality(&self, row: u32) -> f64 {
        self.distinct_columns(row)
            .map_or(0.0, |k| linear_count(self.address_modulus(), k))
    }

    /// `dpc_i` of a row.
    pub fn destination_port_cardinality(&self, row: u32) -> f64 {
        self.distinct_ports(row)
            .map_or(0.0, |k| linear_count(self.port_modulus(), k))
    }

    /// `sc_i` of a column.
    pub fn source_cardinality(&self, column: u32) -> f64 {
        linear_count(self.address_modulus(), self.column_frequency(column) as usize)
    }
}

// =============================================================================
// Aggregated estimates
// =============================================================================

/// Per-address cardinality queries across all resolutions.
#[derive(Clone, Copy, Debug)]
pub struct CardinalityEstimator<'a> {
    sketch: &'a MultiResolutionSketch,
}

impl<'a> CardinalityEstimator<'a> {
    pub fn new(sketch: &'a MultiResolutionSketch) -> Self {
        Self { sketch }
    }

    /// `dc_i(source)` for every resolution.
    pub fn destination_cardinalities(&self, source: u32) -> Vec<f64> {
        self.sketch
            .resolutions()
            .iter()
            .map(|t| t.destination_cardinality(t.row_of(source)))
            .collect()
    }

    /// `dpc_i(source)` for every resolution.
    pub fn destination_port_cardinalities(&self, source: u32) -> Vec<f64> {
        self.sketch
            .resolutions()
            .iter()
            .map(|t| t.destination_port_cardinality(t.row_of(source)))
            .collect()
    }

    /// `sc_i(destination)` for every resolution.
    pub fn source_cardinalities(&self, destination: u32) -> Vec<f64> {
        self.sketch
            .resolutions()
            .iter()
            .map(|t| t.source_cardinality(t.column_of(destination)))
            .collect()
    }

    /// Number of distinct destinations contacted by `source`.
    pub fn destination_cardinality(&self, source: u32) -> u64 {
        floor_min(&self.destination_cardinalities(source))
    }

    /// Number of distinct destination ports used by `source`.
    pub fn destination_port_cardinality(&self, source: u32) -> u64 {
        floor_min(&self.destination_port_cardinalities(source))
    }

    /// Number of distinct sources contacting `destination`.
    pub fn source_cardinality(&self, destination: u32) -> u64 {
        floor_min(&self.source_cardinalities(destination))
    }
}

/// Least-collided resolution wins.
fn floor_min(estimates: &[f64]) -> u64 {
    estimates
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
        .max(0.0)
        .floor() as u64
}
