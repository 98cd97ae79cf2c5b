//! Threshold-based identification of abnormal rows and columns.
//!
//! All tests are relative: a row or column is abnormal when its estimate is
//! at least a fixed fraction of the total over its resolution.
//!
//! - **Spreader rows**: `dc_i ≥ dt·F1` or `dpc_i ≥ dt·F2`
//! - **Changer rows**: change in `dc_i` or `dpc_i` since the previous epoch
//!   `≥ ct·C1` or `≥ ct·C2` (only once a previous epoch exists)
//! - **Receiver columns**: `sc_i ≥ dt·F3`
//!
//! The detector owns the cross-epoch state: the previous epoch's per-row
//! `(dc_i, dpc_i)` snapshot and the per-row changes computed from it. The
//! sketch itself is reset every epoch; this state is not.

use crate::sketch::{MultiResolutionSketch, ResolutionTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Abnormal indices at one resolution, ordered for deterministic walks.
pub type AbnormalSet = BTreeSet<u32>;

/// Per-resolution, per-row statistics.
pub type RowSnapshot = Vec<BTreeMap<u32, RowStats>>;

/// `(dc_i, dpc_i)` for one row, or the change in them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowStats {
    pub dc: f64,
    pub dpc: f64,
}

/// Result of the row-level tests, one set per resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbnormalRows {
    pub spreaders: Vec<AbnormalSet>,
    /// Empty sets on the first epoch.
    pub changers: Vec<AbnormalSet>,
}

impl AbnormalRows {
    pub fn has_changers(&self) -> bool {
        self.changers.iter().any(|set| !set.is_empty())
    }
}

/// Stateful anomaly detector.
#[derive(Clone, Debug)]
pub struct AnomalyDetector {
    spreader_threshold: f64,
    changer_threshold: f64,
    previous: Option<RowSnapshot>,
    changes: Option<RowSnapshot>,
}

impl AnomalyDetector {
    /// Create a detector with thresholds `dt` and `ct`.
    pub fn new(spreader_threshold: f64, changer_threshold: f64) -> Self {
        Self {
            spreader_threshold,
            changer_threshold,
            previous: None,
            changes: None,
        }
    }

    pub fn spreader_threshold(&self) -> f64 {
        self.spreader_threshold
    }

    pub fn changer_threshold(&self) -> f64 {
        self.changer_threshold
    }

    /// Row statistics retained from the last call to
    /// [`identify_abnormal_rows`](Self::identify_abnormal_rows).
    pub fn previous(&self) -> Option<&RowSnapshot> {
        self.previous.as_ref()
    }

    /// Per-row changes computed by the last detection, if it had history.
    pub fn changes(&self) -> Option<&RowSnapshot> {
        self.changes.as_ref()
    }

    /// Forget all cross-epoch state.
    pub fn reset_history(&mut self) {
        self.previous = None;
        self.changes = None;
    }

    /// Run the spreader and changer tests, then roll the snapshot forward.
    pub fn identify_abnormal_rows(&mut self, sketch: &MultiResolutionSketch) -> AbnormalRows {
        let n = sketch.len();
        let mut spreaders = Vec::with_capacity(n);
        let mut changers = Vec::with_capacity(n);
        let mut current: RowSnapshot = Vec::with_capacity(n);
        let mut changes: RowSnapshot = Vec::with_capacity(n);

        for (i, table) in sketch.resolutions().iter().enumerate() {
            let stats = row_stats(table);
            let spread = threshold_rows(&stats, self.spreader_threshold);

            let changed = match self.previous.as_ref().and_then(|prev| prev.get(i)) {
                Some(prev) => {
                    let delta = row_changes(&stats, prev);
                    let rows = threshold_rows(&delta, self.changer_threshold);
                    changes.push(delta);
                    rows
                }
                None => AbnormalSet::new(),
            };

            debug!(
                resolution = i,
                rows = stats.len(),
                spreaders = spread.len(),
                changers = changed.len(),
                "row detection"
            );

            spreaders.push(spread);
            changers.push(changed);
            current.push(stats);
        }

        self.changes = if self.previous.is_some() {
            Some(changes)
        } else {
            None
        };
        self.previous = Some(current);

        AbnormalRows {
            spreaders,
            changers,
        }
    }

    /// Run the receiver test on every observed column.
    pub fn identify_abnormal_columns(&self, sketch: &MultiResolutionSketch) -> Vec<AbnormalSet> {
        sketch
            .resolutions()
            .iter()
            .enumerate()
            .map(|(i, table)| {
                let estimates: BTreeMap<u32, f64> = table
                    .columns()
                    .map(|col| (col, table.source_cardinality(col)))
                    .collect();
                let total: f64 = estimates.values().sum();
                let cutoff = self.spreader_threshold * total;
                let receivers: AbnormalSet = estimates
                    .into_iter()
                    .filter(|&(_, sc)| sc >= cutoff)
                    .map(|(col, _)| col)
                    .collect();

                debug!(resolution = i, receivers = receivers.len(), "column detection");
                receivers
            })
            .collect()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_SPREADER_THRESHOLD,
            crate::config::DEFAULT_CHANGER_THRESHOLD,
        )
    }
}

fn row_stats(table: &ResolutionTable) -> BTreeMap<u32, RowStats> {
    table
        .rows()
        .map(|row| {
            (
                row,
                RowStats {
                    dc: table.destination_cardinality(row),
                    dpc: table.destination_port_cardinality(row),
                },
            )
        })
        .collect()
}

/// Rows new since the previous epoch count in full; others by their growth.
fn row_changes(
    current: &BTreeMap<u32, RowStats>,
    previous: &BTreeMap<u32, RowStats>,
) -> BTreeMap<u32, RowStats> {
    current
        .iter()
        .map(|(&row, &now)| {
            let delta = match previous.get(&row) {
                Some(before) => RowStats {
                    dc: (now.dc - before.dc).max(0.0),
                    dpc: (now.dpc - before.dpc).max(0.0),
                },
                None => now,
            };
            (row, delta)
        })
        .collect()
}

/// Rows whose `dc` or `dpc` reaches `fraction` of the resolution total.
///
/// Totals are summed in row order. A zero total puts the cutoff at zero,
/// which every row meets.
fn threshold_rows(stats: &BTreeMap<u32, RowStats>, fraction: f64) -> AbnormalSet {
    let (total_dc, total_dpc) = stats
        .values()
        .fold((0.0, 0.0), |(a, b), s| (a + s.dc, b + s.dpc));
    let dc_cutoff = fraction * total_dc;
    let dpc_cutoff = fraction * total_dpc;

    stats
        .iter()
        .filter(|(_, s)| s.dc >= dc_cutoff || s.dpc >= dpc_cutoff)
        .map(|(&row, _)| row)
        .collect()
}
