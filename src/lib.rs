//! # Supersketch: Reversible Super Host Detection
//!
//! Supersketch finds hosts with anomalous fan-out or fan-in in network flow
//! traffic using a compact multi-resolution sketch instead of exact per-flow
//! bookkeeping:
//!
//! - **Super spreaders**: one source contacting many destinations (or ports)
//! - **Super receivers**: one destination contacted by many sources
//! - **Super changers**: sources whose behavior grows sharply between epochs
//!
//! Offending addresses are recovered from sketch coordinates alone: each
//! resolution indexes addresses by their residue under a different modulus,
//! flag links tie residues of the same address across resolutions, and the
//! Chinese Remainder Theorem turns a complete residue chain back into an
//! address.
//!
//! ## Quick Start
//!
//! ```rust
//! use supersketch::{FlowRecord, SketchConfig, SuperSketch};
//!
//! let mut engine = SuperSketch::new(SketchConfig::default())?;
//!
//! // One epoch: a scanner touching 400 hosts on port 22, plus background
//! let scanner = supersketch::address::to_integer("203.0.113.7")?;
//! let mut records: Vec<FlowRecord> = (0..400)
//!     .map(|i| FlowRecord::new(scanner, 0x0A00_0000 + i, 22))
//!     .collect();
//! records.extend((0..50).map(|i| FlowRecord::new(0xC0A8_0000 + i, 0x0A00_0001, 443)));
//!
//! engine.process_epoch(&records);
//! let report = engine.analyze_epoch();
//! assert!(report.spreaders.contains(&scanner));
//! # Ok::<(), supersketch::SketchError>(())
//! ```
//!
//! ## Epoch Model
//!
//! Updates are applied by a single writer. At the end of an epoch the frozen
//! sketch is analysed (detection → reconstruction → attribution). The sketch
//! is then reset, but the per-row statistics kept by the
//! [`AnomalyDetector`] survive so the next epoch can be compared against it.

pub mod address;
pub mod attribution;
pub mod config;
pub mod detector;
pub mod error;
pub mod estimator;
pub mod evaluation;
pub mod flow;
pub mod modmath;
pub mod reconstruct;
pub mod report;
pub mod sketch;

// Re-exports for convenience
pub use attribution::{
    AnomalyAttributor, DestinationAnomaly, DestinationAttribution, SourceAnomaly,
    SourceAttribution,
};
pub use config::SketchConfig;
pub use detector::{AbnormalRows, AbnormalSet, AnomalyDetector, RowSnapshot, RowStats};
pub use error::{Result, SketchError};
pub use estimator::CardinalityEstimator;
pub use flow::FlowRecord;
pub use modmath::CrtBasis;
pub use reconstruct::{AddressReconstructor, LinkAxis, ReconstructedAddress};
pub use report::EpochReport;
pub use sketch::{MultiResolutionSketch, ResolutionTable};

use tracing::{debug, info, warn};

/// The detection engine - primary interface for all operations.
///
/// Owns the configuration, the sketch, and the cross-epoch detector state,
/// and exposes:
/// - Epoch lifecycle and updates
/// - Per-address cardinality queries
/// - Abnormal row/column identification
/// - Address reconstruction and attribution
///
/// # Example
///
/// ```rust
/// use supersketch::{SketchConfig, SuperSketch};
///
/// let mut engine = SuperSketch::new(SketchConfig::default())?;
/// engine.initialize();
/// engine.update("10.0.0.1", "10.0.0.2", 80)?;
/// engine.update("10.0.0.1", "10.0.0.3", 80)?;
///
/// assert_eq!(engine.estimate_destination_cardinality("10.0.0.1")?, 2);
/// assert_eq!(engine.estimate_source_cardinality("10.0.0.2")?, 1);
/// # Ok::<(), supersketch::SketchError>(())
/// ```
#[derive(Clone, Debug)]
pub struct SuperSketch {
    config: SketchConfig,
    basis: CrtBasis,
    sketch: MultiResolutionSketch,
    detector: AnomalyDetector,
    /// Number of epochs started.
    epoch: u64,
}

impl SuperSketch {
    /// Create an engine, validating the configuration.
    pub fn new(config: SketchConfig) -> Result<Self> {
        let basis = config.validate()?;
        if !config.covers_address_space() {
            warn!(
                moduli = ?config.address_moduli,
                "address moduli do not cover the IPv4 space; reconstruction is modulo their product"
            );
        }

        let sketch = MultiResolutionSketch::new(&config.address_moduli, &config.port_moduli)?;
        let detector = AnomalyDetector::new(config.spreader_threshold, config.changer_threshold);

        Ok(Self {
            config,
            basis,
            sketch,
            detector,
            epoch: 0,
        })
    }

    /// Create an engine from modulus sequences with default thresholds.
    pub fn with_moduli(address_moduli: &[u32], port_moduli: &[u32]) -> Result<Self> {
        Self::new(SketchConfig::new(
            address_moduli.to_vec(),
            port_moduli.to_vec(),
        ))
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    pub fn sketch(&self) -> &MultiResolutionSketch {
        &self.sketch
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Number of epochs started so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // =========================================================================
    // Epoch lifecycle
    // =========================================================================

    /// Start a new epoch: clear cells and flag links, keep row history.
    pub fn initialize(&mut self) {
        self.sketch.initialize();
        self.epoch += 1;
        debug!(epoch = self.epoch, "sketch initialized");
    }

    /// Apply one textual flow record.
    ///
    /// Both addresses are parsed before anything is written, so a malformed
    /// record leaves the sketch untouched.
    pub fn update(&mut self, source: &str, destination: &str, port: u16) -> Result<()> {
        let src = address::to_integer(source)?;
        let dst = address::to_integer(destination)?;
        self.sketch.update(src, dst, port);
        Ok(())
    }

    /// Apply one parsed flow record.
    pub fn update_flow(&mut self, record: &FlowRecord) {
        self.sketch
            .update(record.source, record.destination, record.port);
    }

    /// Start a new epoch and apply all its records in order.
    pub fn process_epoch(&mut self, records: &[FlowRecord]) {
        self.initialize();
        for record in records {
            self.update_flow(record);
        }
        debug!(epoch = self.epoch, records = records.len(), "epoch ingested");
    }

    // =========================================================================
    // Cardinality queries
    // =========================================================================

    pub fn estimator(&self) -> CardinalityEstimator<'_> {
        CardinalityEstimator::new(&self.sketch)
    }

    /// Distinct destinations contacted by `source`.
    pub fn estimate_destination_cardinality(&self, source: &str) -> Result<u64> {
        Ok(self
            .estimator()
            .destination_cardinality(address::to_integer(source)?))
    }

    /// Distinct destination ports used by `source`.
    pub fn estimate_destination_port_cardinality(&self, source: &str) -> Result<u64> {
        Ok(self
            .estimator()
            .destination_port_cardinality(address::to_integer(source)?))
    }

    /// Distinct sources contacting `destination`.
    pub fn estimate_source_cardinality(&self, destination: &str) -> Result<u64> {
        Ok(self
            .estimator()
            .source_cardinality(address::to_integer(destination)?))
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// Spreader and changer rows per resolution.
    ///
    /// Rolls the detector's row history forward, so call it once per epoch.
    pub fn identify_abnormal_rows(&mut self) -> AbnormalRows {
        self.detector.identify_abnormal_rows(&self.sketch)
    }

    /// Receiver columns per resolution.
    pub fn identify_abnormal_columns(&self) -> Vec<AbnormalSet> {
        self.detector.identify_abnormal_columns(&self.sketch)
    }

    // =========================================================================
    // Reconstruction
    // =========================================================================

    fn reconstructor(&self) -> AddressReconstructor<'_> {
        AddressReconstructor::with_basis(&self.sketch, self.basis.clone())
    }

    /// Source addresses whose rows are abnormal at every resolution.
    pub fn reconstruct_source_addresses(
        &self,
        abnormal_rows: &[AbnormalSet],
    ) -> Vec<ReconstructedAddress> {
        self.reconstructor().reconstruct_sources(abnormal_rows)
    }

    /// Destination addresses whose columns are abnormal at every resolution.
    pub fn reconstruct_destination_addresses(
        &self,
        abnormal_columns: &[AbnormalSet],
    ) -> Vec<ReconstructedAddress> {
        self.reconstructor()
            .reconstruct_destinations(abnormal_columns)
    }

    // =========================================================================
    // Attribution
    // =========================================================================

    fn attributor(&self) -> AnomalyAttributor<'_> {
        AnomalyAttributor::new(&self.sketch, self.detector.changes())
    }

    pub fn attribute_source_anomalies(&self, sources: &[u32]) -> Vec<SourceAttribution> {
        self.attributor().attribute_sources(sources)
    }

    pub fn attribute_destination_anomalies(
        &self,
        destinations: &[u32],
    ) -> Vec<DestinationAttribution> {
        self.attributor().attribute_destinations(destinations)
    }

    /// Run the full analysis of the current epoch.
    pub fn analyze_epoch(&mut self) -> EpochReport {
        let rows = self.identify_abnormal_rows();
        let columns = self.identify_abnormal_columns();

        let spreaders =
            reconstruct::unique_addresses(&self.reconstruct_source_addresses(&rows.spreaders));
        let changers = if rows.has_changers() {
            reconstruct::unique_addresses(&self.reconstruct_source_addresses(&rows.changers))
        } else {
            Default::default()
        };
        let receivers =
            reconstruct::unique_addresses(&self.reconstruct_destination_addresses(&columns));

        let abnormal_sources: Vec<u32> = spreaders.union(&changers).copied().collect();
        let abnormal_destinations: Vec<u32> = receivers.iter().copied().collect();
        let source_attributions = self.attribute_source_anomalies(&abnormal_sources);
        let destination_attributions = self.attribute_destination_anomalies(&abnormal_destinations);

        info!(
            epoch = self.epoch,
            spreaders = spreaders.len(),
            changers = changers.len(),
            receivers = receivers.len(),
            "epoch analyzed"
        );

        EpochReport {
            epoch: self.epoch,
            spreaders,
            changers,
            receivers,
            source_attributions,
            destination_attributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = SuperSketch::new(SketchConfig::default()).unwrap();
        assert_eq!(engine.sketch().len(), 5);
        assert_eq!(engine.epoch(), 0);
        assert!(engine.detector().previous().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            SuperSketch::with_moduli(&[6, 9], &[5, 7]),
            Err(SketchError::NotCoprime { .. })
        ));
    }

    #[test]
    fn test_malformed_update_leaves_sketch_untouched() {
        let mut engine = SuperSketch::new(SketchConfig::default()).unwrap();
        engine.initialize();
        assert!(engine.update("10.0.0.1", "not-an-ip", 80).is_err());
        assert!(engine.sketch().is_empty());
        assert!(engine.estimate_destination_cardinality("10.0.0.1.7").is_err());
    }

    #[test]
    fn test_process_epoch_resets_cells() {
        let mut engine = SuperSketch::new(SketchConfig::default()).unwrap();
        engine.process_epoch(&[FlowRecord::new(1, 2, 3)]);
        engine.process_epoch(&[FlowRecord::new(4, 5, 6)]);
        assert_eq!(engine.epoch(), 2);
        assert_eq!(engine.estimator().destination_cardinality(1), 0);
        assert_eq!(engine.estimator().destination_cardinality(4), 1);
    }

    #[test]
    fn test_history_survives_initialize() {
        let mut engine = SuperSketch::new(SketchConfig::default()).unwrap();
        engine.process_epoch(&[FlowRecord::new(1, 2, 3)]);
        engine.analyze_epoch();
        engine.initialize();
        assert!(engine.detector().previous().is_some());
    }
}
