//! Behavioral labels for reconstructed addresses.
//!
//! Sources are split by the balance between destinations and ports they
//! touch: many hosts on few ports is a horizontal scan, many ports on few
//! hosts a vertical scan. When the detector has a previous epoch to compare
//! against, the growth in those two quantities can decide the label too.
//!
//! Destinations contacted by many more sources than they contact themselves
//! are victims; the rest are labelled service providers.
//!
//! The two source branches use different boundaries on purpose: `≥` for the
//! ratio test without history, `>` with history.

use crate::address;
use crate::detector::RowSnapshot;
use crate::estimator::CardinalityEstimator;
use crate::sketch::MultiResolutionSketch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// dc/dpc (or dpc/dc) ratio marking a scan.
pub const SCAN_RATIO: f64 = 5.0;
/// Ratio of epoch-over-epoch growth marking a scan.
pub const CHANGE_RATIO: f64 = 10.0;
/// sc/dc ratio marking a victim.
pub const VICTIM_RATIO: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAnomaly {
    HorizontalScan,
    VerticalScan,
    Undetermined,
}

impl fmt::Display for SourceAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceAnomaly::HorizontalScan => "horizontal scan",
            SourceAnomaly::VerticalScan => "vertical scan",
            SourceAnomaly::Undetermined => "undetermined abnormal",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationAnomaly {
    Victim,
    ServiceProvider,
}

impl fmt::Display for DestinationAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DestinationAnomaly::Victim => "victim",
            DestinationAnomaly::ServiceProvider => "service provider",
        };
        f.write_str(label)
    }
}

/// Label and supporting estimates for one source address.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceAttribution {
    pub address: String,
    pub dc: u64,
    pub dpc: u64,
    /// Summed per-resolution `(dc, dpc)` growth; `None` without history.
    pub change: Option<(f64, f64)>,
    pub kind: SourceAnomaly,
}

/// Label and supporting estimates for one destination address.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DestinationAttribution {
    pub address: String,
    pub dc: u64,
    pub sc: u64,
    pub kind: DestinationAnomaly,
}

/// Classify a source from its aggregate estimates and optional growth.
///
/// Ratios use float division: a zero denominator gives infinity (or NaN
/// when both sides are zero, which matches nothing).
pub fn classify_source(dc: u64, dpc: u64, change: Option<(f64, f64)>) -> SourceAnomaly {
    let (dc, dpc) = (dc as f64, dpc as f64);
    match change {
        None => {
            if dc / dpc >= SCAN_RATIO {
                SourceAnomaly::HorizontalScan
            } else if dpc / dc >= SCAN_RATIO {
                SourceAnomaly::VerticalScan
            } else {
                SourceAnomaly::Undetermined
            }
        }
        Some((dc_change, dpc_change)) => {
            let both_changed = dc_change * dpc_change != 0.0;
            if dc / dpc > SCAN_RATIO || (both_changed && dc_change / dpc_change > CHANGE_RATIO) {
                SourceAnomaly::HorizontalScan
            } else if dpc / dc > SCAN_RATIO
                || (both_changed && dpc_change / dc_change > CHANGE_RATIO)
            {
                SourceAnomaly::VerticalScan
            } else {
                SourceAnomaly::Undetermined
            }
        }
    }
}

/// Classify a destination from its own fan-out and its fan-in.
pub fn classify_destination(dc: u64, sc: u64) -> DestinationAnomaly {
    if dc != 0 && sc as f64 / dc as f64 > VICTIM_RATIO {
        DestinationAnomaly::Victim
    } else {
        DestinationAnomaly::ServiceProvider
    }
}

/// Attributes addresses against a frozen sketch.
#[derive(Clone, Copy, Debug)]
pub struct AnomalyAttributor<'a> {
    sketch: &'a MultiResolutionSketch,
    changes: Option<&'a RowSnapshot>,
}

impl<'a> AnomalyAttributor<'a> {
    /// `changes` is the detector's per-row growth from the latest detection.
    pub fn new(sketch: &'a MultiResolutionSketch, changes: Option<&'a RowSnapshot>) -> Self {
        Self { sketch, changes }
    }

    /// Summed `(dc, dpc)` growth of `source`'s rows across resolutions.
    pub fn change_of(&self, source: u32) -> Option<(f64, f64)> {
        let changes = self.changes?;
        let sums = self
            .sketch
            .resolutions()
            .iter()
            .zip(changes.iter())
            .filter_map(|(table, per_row)| per_row.get(&table.row_of(source)))
            .fold((0.0, 0.0), |(dc, dpc), stats| (dc + stats.dc, dpc + stats.dpc));
        Some(sums)
    }

    pub fn attribute_source(&self, source: u32) -> SourceAttribution {
        let estimator = CardinalityEstimator::new(self.sketch);
        let dc = estimator.destination_cardinality(source);
        let dpc = estimator.destination_port_cardinality(source);
        let change = self.change_of(source);
        SourceAttribution {
            address: address::to_text(source),
            dc,
            dpc,
            change,
            kind: classify_source(dc, dpc, change),
        }
    }

    pub fn attribute_destination(&self, destination: u32) -> DestinationAttribution {
        let estimator = CardinalityEstimator::new(self.sketch);
        let dc = estimator.destination_cardinality(destination);
        let sc = estimator.source_cardinality(destination);
        DestinationAttribution {
            address: address::to_text(destination),
            dc,
            sc,
            kind: classify_destination(dc, sc),
        }
    }

    pub fn attribute_sources(&self, sources: &[u32]) -> Vec<SourceAttribution> {
        sources.iter().map(|&s| self.attribute_source(s)).collect()
    }

    pub fn attribute_destinations(&self, destinations: &[u32]) -> Vec<DestinationAttribution> {
        destinations
            .iter()
            .map(|&d| self.attribute_destination(d))
            .collect()
    }
}
