//! Flow records and epoch ingestion.
//!
//! The sketch consumes `(source, destination, destination port)` triples.
//! Traces arrive as CSV files with at least the columns `Src IP`, `Dst IP`
//! and `Dst Port` (any other columns are ignored). One file is one epoch;
//! duplicate records within an epoch are collapsed, keeping first-seen
//! order.
//!
//! ```rust
//! use supersketch::flow::read_epoch;
//!
//! let csv = "Src IP,Dst IP,Dst Port,Protocol\n\
//!            10.0.0.1,10.0.0.2,80,6\n\
//!            10.0.0.1,10.0.0.2,80,6\n\
//!            10.0.0.3,10.0.0.2,443,6\n";
//! let records = read_epoch(csv.as_bytes()).unwrap();
//! assert_eq!(records.len(), 2);
//! ```

use crate::address;
use crate::error::{Result, SketchError};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// One sketch update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowRecord {
    pub source: u32,
    pub destination: u32,
    pub port: u16,
}

impl FlowRecord {
    pub fn new(source: u32, destination: u32, port: u16) -> Self {
        Self {
            source,
            destination,
            port,
        }
    }

    /// Parse textual fields, failing on the first malformed one.
    pub fn parse(source: &str, destination: &str, port: i64) -> Result<Self> {
        let port = u16::try_from(port).map_err(|_| SketchError::InvalidPort(port))?;
        Ok(Self {
            source: address::to_integer(source)?,
            destination: address::to_integer(destination)?,
            port,
        })
    }
}

/// CSV row shape; only the three sketch columns are read.
#[derive(Debug, Deserialize)]
struct CsvFlow {
    #[serde(rename = "Src IP")]
    source: String,
    #[serde(rename = "Dst IP")]
    destination: String,
    #[serde(rename = "Dst Port")]
    port: i64,
}

/// Outcome of a lenient read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpochBatch {
    pub records: Vec<FlowRecord>,
    /// Malformed rows that were skipped.
    pub skipped: usize,
}

/// Read one epoch, failing on the first malformed row.
pub fn read_epoch<R: Read>(reader: R) -> Result<Vec<FlowRecord>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut dedup = Deduplicator::default();
    for row in csv.deserialize::<CsvFlow>() {
        let row = row?;
        dedup.push(FlowRecord::parse(&row.source, &row.destination, row.port)?);
    }
    Ok(dedup.records)
}

/// Read one epoch, skipping malformed rows.
pub fn read_epoch_lenient<R: Read>(reader: R) -> Result<EpochBatch> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut dedup = Deduplicator::default();
    let mut skipped = 0;

    for (line, row) in csv.deserialize::<CsvFlow>().enumerate() {
        let parsed = row
            .map_err(SketchError::from)
            .and_then(|r| FlowRecord::parse(&r.source, &r.destination, r.port));
        match parsed {
            Ok(record) => dedup.push(record),
            Err(err) => {
                warn!(row = line + 1, error = %err, "skipping malformed flow record");
                skipped += 1;
            }
        }
    }

    Ok(EpochBatch {
        records: dedup.records,
        skipped,
    })
}

/// Read one epoch from a CSV file, failing on the first malformed row.
pub fn read_epoch_file(path: impl AsRef<Path>) -> Result<Vec<FlowRecord>> {
    let file = std::fs::File::open(path)?;
    read_epoch(std::io::BufReader::new(file))
}

#[derive(Default)]
struct Deduplicator {
    seen: HashSet<FlowRecord>,
    records: Vec<FlowRecord>,
}

impl Deduplicator {
    fn push(&mut self, record: FlowRecord) {
        if self.seen.insert(record) {
            self.records.push(record);
        }
    }
}
