//! Offline accuracy evaluation against exact ground truth.
//!
//! Used to measure the sketch on labelled traces, not on the detection
//! path. Ground truth is exact per-epoch bookkeeping; the metrics are
//!
//! - **ARE / AAE**: average relative / absolute error of dc, dpc and sc
//!   over every source (destination) present in the epoch
//! - **FPR**: benign addresses reported, over the benign population
//! - **FNR**: known anomalies missed, over the known anomalies
//!
//! Any ratio with an empty denominator is 0.

use crate::estimator::CardinalityEstimator;
use crate::flow::FlowRecord;
use crate::report::EpochReport;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

// =============================================================================
// Ground truth
// =============================================================================

/// Exact cardinalities for one epoch.
#[derive(Clone, Debug, Default)]
pub struct GroundTruth {
    destinations_per_source: HashMap<u32, HashSet<u32>>,
    ports_per_source: HashMap<u32, HashSet<u16>>,
    sources_per_destination: HashMap<u32, HashSet<u32>>,
}

impl GroundTruth {
    pub fn from_records(records: &[FlowRecord]) -> Self {
        let mut truth = Self::default();
        for r in records {
            truth
                .destinations_per_source
                .entry(r.source)
                .or_default()
                .insert(r.destination);
            truth.ports_per_source.entry(r.source).or_default().insert(r.port);
            truth
                .sources_per_destination
                .entry(r.destination)
                .or_default()
                .insert(r.source);
        }
        truth
    }

    pub fn sources(&self) -> impl Iterator<Item = u32> + '_ {
        self.destinations_per_source.keys().copied()
    }

    pub fn destinations(&self) -> impl Iterator<Item = u32> + '_ {
        self.sources_per_destination.keys().copied()
    }

    pub fn destination_cardinality(&self, source: u32) -> usize {
        self.destinations_per_source.get(&source).map_or(0, HashSet::len)
    }

    pub fn destination_port_cardinality(&self, source: u32) -> usize {
        self.ports_per_source.get(&source).map_or(0, HashSet::len)
    }

    pub fn source_cardinality(&self, destination: u32) -> usize {
        self.sources_per_destination.get(&destination).map_or(0, HashSet::len)
    }
}

// =============================================================================
// Cardinality errors
// =============================================================================

/// Estimation error of one epoch (or an average over epochs).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CardinalityErrors {
    pub are_dc: f64,
    pub are_dpc: f64,
    pub are_sc: f64,
    pub aae_dc: f64,
    pub aae_dpc: f64,
    pub aae_sc: f64,
}

impl CardinalityErrors {
    /// Compare sketch estimates with exact counts for every address seen.
    pub fn measure(estimator: &CardinalityEstimator<'_>, truth: &GroundTruth) -> Self {
        let (are_dc, aae_dc) = mean_errors(truth.sources().map(|s| {
            (
                estimator.destination_cardinality(s),
                truth.destination_cardinality(s),
            )
        }));
        let (are_dpc, aae_dpc) = mean_errors(truth.sources().map(|s| {
            (
                estimator.destination_port_cardinality(s),
                truth.destination_port_cardinality(s),
            )
        }));
        let (are_sc, aae_sc) = mean_errors(
            truth
                .destinations()
                .map(|d| (estimator.source_cardinality(d), truth.source_cardinality(d))),
        );

        Self {
            are_dc,
            are_dpc,
            are_sc,
            aae_dc,
            aae_dpc,
            aae_sc,
        }
    }

    fn add(&mut self, other: &Self) {
        self.are_dc += other.are_dc;
        self.are_dpc += other.are_dpc;
        self.are_sc += other.are_sc;
        self.aae_dc += other.aae_dc;
        self.aae_dpc += other.aae_dpc;
        self.aae_sc += other.aae_sc;
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            are_dc: self.are_dc * factor,
            are_dpc: self.are_dpc * factor,
            are_sc: self.are_sc * factor,
            aae_dc: self.aae_dc * factor,
            aae_dpc: self.aae_dpc * factor,
            aae_sc: self.aae_sc * factor,
        }
    }
}

/// Mean relative and absolute error over `(estimate, real)` pairs.
fn mean_errors(pairs: impl Iterator<Item = (u64, usize)>) -> (f64, f64) {
    let mut count = 0usize;
    let mut relative = 0.0;
    let mut absolute = 0.0;
    for (estimate, real) in pairs {
        let diff = (estimate as f64 - real as f64).abs();
        if real > 0 {
            relative += diff / real as f64;
        }
        absolute += diff;
        count += 1;
    }
    if count == 0 {
        (0.0, 0.0)
    } else {
        (relative / count as f64, absolute / count as f64)
    }
}

// =============================================================================
// Detection rates
// =============================================================================

/// False positive and false negative rates for one anomaly class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DetectionRates {
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
}

impl DetectionRates {
    /// `benign_population` is the number of addresses that are not real
    /// anomalies of any source class (or of the receiver class).
    pub fn compute(detected: &BTreeSet<u32>, real: &BTreeSet<u32>, benign_population: usize) -> Self {
        let mistaken = detected.difference(real).count();
        let missed = real.difference(detected).count();
        Self {
            false_positive_rate: ratio(mistaken, benign_population),
            false_negative_rate: ratio(missed, real.len()),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Labelled anomalies of a trace.
#[derive(Clone, Debug, Default)]
pub struct KnownAnomalies {
    pub spreaders: BTreeSet<u32>,
    pub changers: BTreeSet<u32>,
    pub receivers: BTreeSet<u32>,
}

/// Rates for every class over a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TraceRates {
    pub spreader: DetectionRates,
    pub changer: DetectionRates,
    pub receiver: DetectionRates,
}

// =============================================================================
// Trace evaluation
// =============================================================================

/// Accumulates per-epoch results over a whole trace.
#[derive(Clone, Debug, Default)]
pub struct TraceEvaluation {
    epochs: usize,
    error_sums: CardinalityErrors,
    sources: HashSet<u32>,
    destinations: HashSet<u32>,
    spreaders: BTreeSet<u32>,
    changers: BTreeSet<u32>,
    receivers: BTreeSet<u32>,
}

impl TraceEvaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Fold one analysed epoch into the trace totals.
    pub fn record_epoch(&mut self, truth: &GroundTruth, errors: &CardinalityErrors, report: &EpochReport) {
        self.epochs += 1;
        self.error_sums.add(errors);
        self.sources.extend(truth.sources());
        self.destinations.extend(truth.destinations());
        self.spreaders.extend(report.spreaders.iter().copied());
        self.changers.extend(report.changers.iter().copied());
        self.receivers.extend(report.receivers.iter().copied());
    }

    /// Per-epoch average of the cardinality errors.
    pub fn average_errors(&self) -> CardinalityErrors {
        if self.epochs == 0 {
            return CardinalityErrors::default();
        }
        self.error_sums.scaled(1.0 / self.epochs as f64)
    }

    pub fn detected_spreaders(&self) -> &BTreeSet<u32> {
        &self.spreaders
    }

    pub fn detected_changers(&self) -> &BTreeSet<u32> {
        &self.changers
    }

    pub fn detected_receivers(&self) -> &BTreeSet<u32> {
        &self.receivers
    }

    /// FPR/FNR for each class against labelled anomalies.
    pub fn rates(&self, known: &KnownAnomalies) -> TraceRates {
        let abnormal_sources = known.spreaders.union(&known.changers).count();
        let benign_sources = self.sources.len().saturating_sub(abnormal_sources);
        let benign_destinations = self.destinations.len().saturating_sub(known.receivers.len());

        TraceRates {
            spreader: DetectionRates::compute(&self.spreaders, &known.spreaders, benign_sources),
            changer: DetectionRates::compute(&self.changers, &known.changers, benign_sources),
            receiver: DetectionRates::compute(
                &self.receivers,
                &known.receivers,
                benign_destinations,
            ),
        }
    }
}
