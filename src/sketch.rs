//! Multi-resolution sketch: the occupancy tables and flag links.
//!
//! Each resolution `i` indexes traffic by residues under its address
//! modulus `p[i]` and port modulus `u[i]`:
//!
//! - `row = source mod p[i]`
//! - `column = destination mod p[i]`
//! - `port_slot = port mod u[i]`
//!
//! A cell `(row, column)` holds the set of port slots seen for that pair
//! during the current epoch. Port sets live in a flat arena per resolution
//! so an epoch reset is a `clear()` of a few containers rather than a
//! rebuild of nested maps.
//!
//! Flag links record, for every row (column) at resolution `i < n-1`, the
//! residues the same source (destination) takes at resolution `i+1`. Those
//! links are what make the sketch reversible: following them through the
//! abnormal sets yields one residue per resolution, which CRT turns back
//! into an address.
//!
//! ```rust
//! use supersketch::MultiResolutionSketch;
//!
//! let mut sketch = MultiResolutionSketch::new(&[5, 7], &[3, 4])?;
//! sketch.update(13, 22, 80);
//!
//! let res0 = sketch.resolution(0).unwrap();
//! assert_eq!(res0.distinct_columns(13 % 5), Some(1));
//! assert!(res0.row_links(13 % 5).unwrap().contains(&(13 % 7)));
//! # Ok::<(), supersketch::SketchError>(())
//! ```

use crate::config::SketchConfig;
use crate::error::{Result, SketchError};
use std::collections::{BTreeSet, HashMap, HashSet};

// =============================================================================
// ResolutionTable
// =============================================================================

/// Occupancy state for one resolution.
#[derive(Clone, Debug)]
pub struct ResolutionTable {
    address_modulus: u32,
    port_modulus: u32,
    /// Address modulus of resolution `i+1`; `None` on the last resolution.
    next_modulus: Option<u32>,

    /// row → (column → slot in `port_sets`)
    rows: HashMap<u32, HashMap<u32, usize>>,
    port_sets: Vec<HashSet<u32>>,
    /// column → number of distinct rows whose cell touches it
    column_frequency: HashMap<u32, u32>,

    row_links: HashMap<u32, BTreeSet<u32>>,
    column_links: HashMap<u32, BTreeSet<u32>>,
}

impl ResolutionTable {
    pub fn new(address_modulus: u32, port_modulus: u32, next_modulus: Option<u32>) -> Self {
        Self {
            address_modulus,
            port_modulus,
            next_modulus,
            rows: HashMap::new(),
            port_sets: Vec::new(),
            column_frequency: HashMap::new(),
            row_links: HashMap::new(),
            column_links: HashMap::new(),
        }
    }

    // --- Accessors ---

    pub fn address_modulus(&self) -> u32 {
        self.address_modulus
    }

    pub fn port_modulus(&self) -> u32 {
        self.port_modulus
    }

    /// Row index of a source address.
    #[inline]
    pub fn row_of(&self, source: u32) -> u32 {
        source % self.address_modulus
    }

    /// Column index of a destination address.
    #[inline]
    pub fn column_of(&self, destination: u32) -> u32 {
        destination % self.address_modulus
    }

    /// Number of occupied `(row, column)` cells.
    pub fn cell_count(&self) -> usize {
        self.port_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Occupied rows, in no particular order.
    pub fn rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.keys().copied()
    }

    /// Every column touched by any row, in no particular order.
    pub fn columns(&self) -> impl Iterator<Item = u32> + '_ {
        self.column_frequency.keys().copied()
    }

    /// Number of distinct column residues in `row`, `None` if the row is absent.
    pub fn distinct_columns(&self, row: u32) -> Option<usize> {
        self.rows.get(&row).map(|cells| cells.len())
    }

    /// Number of distinct port slots across all cells of `row`.
    pub fn distinct_ports(&self, row: u32) -> Option<usize> {
        self.rows.get(&row).map(|cells| {
            let mut ports: HashSet<u32> = HashSet::new();
            for &slot in cells.values() {
                ports.extend(self.port_sets[slot].iter().copied());
            }
            ports.len()
        })
    }

    /// Port slots recorded for a single cell.
    pub fn ports(&self, row: u32, column: u32) -> Option<&HashSet<u32>> {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(&column))
            .map(|&slot| &self.port_sets[slot])
    }

    /// Number of distinct rows whose cell touches `column` (0 if unseen).
    pub fn column_frequency(&self, column: u32) -> u32 {
        self.column_frequency.get(&column).copied().unwrap_or(0)
    }

    /// Rows at resolution `i+1` linked from `row`.
    pub fn row_links(&self, row: u32) -> Option<&BTreeSet<u32>> {
        self.row_links.get(&row)
    }

    /// Columns at resolution `i+1` linked from `column`.
    pub fn column_links(&self, column: u32) -> Option<&BTreeSet<u32>> {
        self.column_links.get(&column)
    }

    // --- Mutation ---

    /// Drop all cells and links, keeping allocations.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.port_sets.clear();
        self.column_frequency.clear();
        self.row_links.clear();
        self.column_links.clear();
    }

    /// Record one flow at this resolution.
    pub fn insert(&mut self, source: u32, destination: u32, port: u16) {
        let row = self.row_of(source);
        let column = self.column_of(destination);
        let port_slot = port as u32 % self.port_modulus;

        let cells = self.rows.entry(row).or_default();
        let slot = match cells.get(&column) {
            Some(&slot) => slot,
            None => {
                let slot = self.port_sets.len();
                self.port_sets.push(HashSet::new());
                cells.insert(column, slot);
                *self.column_frequency.entry(column).or_insert(0) += 1;
                slot
            }
        };
        self.port_sets[slot].insert(port_slot);

        if let Some(next) = self.next_modulus {
            self.row_links.entry(row).or_default().insert(source % next);
            self.column_links
                .entry(column)
                .or_default()
                .insert(destination % next);
        }
    }
}

// =============================================================================
// MultiResolutionSketch
// =============================================================================

/// `n` resolution tables updated in lockstep.
///
/// Single writer: updates are applied sequentially within an epoch.
/// Readers (estimation, detection, reconstruction) take `&self`.
#[derive(Clone, Debug)]
pub struct MultiResolutionSketch {
    address_moduli: Vec<u32>,
    tables: Vec<ResolutionTable>,
}

impl MultiResolutionSketch {
    /// Build a sketch from raw modulus sequences.
    ///
    /// Only the shape is checked here (equal lengths, every modulus ≥ 2).
    /// Coprimality matters for reconstruction alone; use
    /// [`from_config`](Self::from_config) for the full validation.
    pub fn new(address_moduli: &[u32], port_moduli: &[u32]) -> Result<Self> {
        if address_moduli.is_empty() {
            return Err(SketchError::NoResolutions);
        }
        if address_moduli.len() != port_moduli.len() {
            return Err(SketchError::ModulusCountMismatch {
                address: address_moduli.len(),
                port: port_moduli.len(),
            });
        }
        for (index, (&p, &u)) in address_moduli.iter().zip(port_moduli).enumerate() {
            if p < 2 || u < 2 {
                return Err(SketchError::ModulusTooSmall {
                    index,
                    modulus: p.min(u),
                });
            }
        }

        let tables = address_moduli
            .iter()
            .zip(port_moduli)
            .enumerate()
            .map(|(i, (&p, &u))| ResolutionTable::new(p, u, address_moduli.get(i + 1).copied()))
            .collect();

        Ok(Self {
            address_moduli: address_moduli.to_vec(),
            tables,
        })
    }

    /// Validate `config` and build an empty sketch for it.
    pub fn from_config(config: &SketchConfig) -> Result<Self> {
        config.validate()?;
        Self::new(&config.address_moduli, &config.port_moduli)
    }

    /// Number of resolutions `n`.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(ResolutionTable::is_empty)
    }

    pub fn address_moduli(&self) -> &[u32] {
        &self.address_moduli
    }

    /// Table of resolution `i`, `None` past the last one.
    pub fn resolution(&self, i: usize) -> Option<&ResolutionTable> {
        self.tables.get(i)
    }

    pub fn resolutions(&self) -> &[ResolutionTable] {
        &self.tables
    }

    /// Clear all cells and flag links for a new epoch.
    pub fn initialize(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }

    /// Apply one flow record to every resolution.
    pub fn update(&mut self, source: u32, destination: u32, port: u16) {
        for table in &mut self.tables {
            table.insert(source, destination, port);
        }
    }
}
