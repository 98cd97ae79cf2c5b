//! Per-epoch detection report.

use crate::address;
use crate::attribution::{DestinationAttribution, SourceAttribution};
use crate::error::Result;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

/// Everything one epoch's analysis produced.
///
/// Address sets are deduplicated and serialize as dotted-quad text.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: u64,
    #[serde(serialize_with = "as_text")]
    pub spreaders: BTreeSet<u32>,
    #[serde(serialize_with = "as_text")]
    pub changers: BTreeSet<u32>,
    #[serde(serialize_with = "as_text")]
    pub receivers: BTreeSet<u32>,
    pub source_attributions: Vec<SourceAttribution>,
    pub destination_attributions: Vec<DestinationAttribution>,
}

impl EpochReport {
    /// Sources flagged as spreader or changer.
    pub fn abnormal_sources(&self) -> BTreeSet<u32> {
        self.spreaders.union(&self.changers).copied().collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn as_text<S: Serializer>(addresses: &BTreeSet<u32>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(addresses.iter().map(|&a| address::to_text(a)))
}
