//! Reversible reconstruction of abnormal addresses.
//!
//! Starting from every abnormal index at resolution 0, the walk follows flag
//! links into resolution 1, keeping only targets that are themselves
//! abnormal there, and so on up to resolution `n-1`. Every walk that picks
//! one residue per resolution is a candidate chain; CRT over the address
//! moduli turns it into an address.
//!
//! The walk is an explicit stack bounded by `n` in depth. Each call builds
//! and returns its own result, so one sketch can be walked for several
//! behavior classes independently.
//!
//! Walks that stop short of resolution `n-1` are dropped. So are chains
//! whose CRT solution lies outside the IPv4 range. Distinct chains can
//! solve to the same address; use [`unique_addresses`] to deduplicate.

use crate::address;
use crate::detector::AbnormalSet;
use crate::error::Result;
use crate::modmath::CrtBasis;
use crate::sketch::MultiResolutionSketch;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Which flag links to follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkAxis {
    /// Source residues (spreaders, changers).
    Row,
    /// Destination residues (receivers).
    Column,
}

/// An address recovered from a complete residue chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReconstructedAddress {
    pub address: u32,
    /// Residue chosen at each resolution, `residues[i] = address mod p[i]`.
    pub residues: Vec<u32>,
}

impl ReconstructedAddress {
    pub fn to_text(&self) -> String {
        address::to_text(self.address)
    }
}

impl fmt::Display for ReconstructedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Walks flag links of a frozen sketch.
#[derive(Clone, Debug)]
pub struct AddressReconstructor<'a> {
    sketch: &'a MultiResolutionSketch,
    basis: CrtBasis,
}

impl<'a> AddressReconstructor<'a> {
    /// Build a reconstructor, deriving the CRT basis from the sketch moduli.
    pub fn new(sketch: &'a MultiResolutionSketch) -> Result<Self> {
        let basis = CrtBasis::new(sketch.address_moduli())?;
        Ok(Self { sketch, basis })
    }

    /// Build a reconstructor around an already validated basis.
    pub fn with_basis(sketch: &'a MultiResolutionSketch, basis: CrtBasis) -> Self {
        Self { sketch, basis }
    }

    /// Reconstruct source addresses from abnormal rows.
    pub fn reconstruct_sources(&self, abnormal_rows: &[AbnormalSet]) -> Vec<ReconstructedAddress> {
        self.reconstruct(LinkAxis::Row, abnormal_rows)
    }

    /// Reconstruct destination addresses from abnormal columns.
    pub fn reconstruct_destinations(
        &self,
        abnormal_columns: &[AbnormalSet],
    ) -> Vec<ReconstructedAddress> {
        self.reconstruct(LinkAxis::Column, abnormal_columns)
    }

    /// Depth-first walk over `axis` links restricted to the abnormal sets.
    ///
    /// A missing set for some resolution behaves like an empty one.
    pub fn reconstruct(&self, axis: LinkAxis, abnormal: &[AbnormalSet]) -> Vec<ReconstructedAddress> {
        let n = self.sketch.len();
        let mut found = Vec::new();
        let Some(starts) = abnormal.first() else {
            return found;
        };
        if n == 0 {
            return found;
        }

        // Reverse pushes so chains pop in ascending residue order
        let mut stack: Vec<Vec<u32>> = starts.iter().rev().map(|&r| vec![r]).collect();

        while let Some(chain) = stack.pop() {
            let depth = chain.len() - 1;
            if depth + 1 == n {
                if let Some(address) = self.solve(&chain) {
                    found.push(ReconstructedAddress {
                        address,
                        residues: chain,
                    });
                }
                continue;
            }

            let Some(next_abnormal) = abnormal.get(depth + 1) else {
                continue;
            };
            let Some(table) = self.sketch.resolution(depth) else {
                continue;
            };
            let links = match axis {
                LinkAxis::Row => table.row_links(chain[depth]),
                LinkAxis::Column => table.column_links(chain[depth]),
            };
            let Some(links) = links else {
                continue;
            };

            for &next in links.iter().rev() {
                if next_abnormal.contains(&next) {
                    let mut extended = Vec::with_capacity(n);
                    extended.extend_from_slice(&chain);
                    extended.push(next);
                    stack.push(extended);
                }
            }
        }

        found
    }

    fn solve(&self, chain: &[u32]) -> Option<u32> {
        let value = self.basis.solve(chain).ok()?;
        u32::try_from(value).ok()
    }
}

/// Distinct addresses among reconstruction results.
pub fn unique_addresses(found: &[ReconstructedAddress]) -> BTreeSet<u32> {
    found.iter().map(|r| r.address).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residues(addr: u32, moduli: &[u32]) -> Vec<u32> {
        moduli.iter().map(|&m| addr % m).collect()
    }

    fn abnormal_for(addrs: &[u32], moduli: &[u32]) -> Vec<AbnormalSet> {
        moduli
            .iter()
            .map(|&m| addrs.iter().map(|a| a % m).collect())
            .collect()
    }

    #[test]
    fn test_single_resolution_chain() {
        let mut sketch = MultiResolutionSketch::new(&[101], &[11]).unwrap();
        sketch.update(77, 5, 80);
        let recon = AddressReconstructor::new(&sketch).unwrap();

        let abnormal = vec![AbnormalSet::from([77])];
        let found = recon.reconstruct_sources(&abnormal);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, 77);
        assert_eq!(found[0].to_text(), "0.0.0.77");
    }

    #[test]
    fn test_full_space_source_recovered() {
        let p = [40009, 40013, 40031, 40037, 40039];
        let u = [401, 409, 419, 421, 431];
        let mut sketch = MultiResolutionSketch::new(&p, &u).unwrap();
        let spreader = address::to_integer("192.168.10.20").unwrap();
        let benign = address::to_integer("10.1.2.3").unwrap();
        sketch.update(spreader, 1000, 80);
        sketch.update(benign, 2000, 443);

        let recon = AddressReconstructor::new(&sketch).unwrap();
        let found = recon.reconstruct_sources(&abnormal_for(&[spreader], &p));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, spreader);
        assert_eq!(found[0].residues, residues(spreader, &p));
        assert_eq!(found[0].to_string(), "192.168.10.20");
    }

    #[test]
    fn test_destination_axis() {
        let p = [40009, 40013, 40031, 40037, 40039];
        let u = [401, 409, 419, 421, 431];
        let mut sketch = MultiResolutionSketch::new(&p, &u).unwrap();
        let victim = address::to_integer("172.16.0.9").unwrap();
        sketch.update(1, victim, 80);

        let recon = AddressReconstructor::new(&sketch).unwrap();
        let abnormal = abnormal_for(&[victim], &p);
        assert_eq!(
            unique_addresses(&recon.reconstruct_destinations(&abnormal)),
            BTreeSet::from([victim])
        );
        // Row links know nothing about the destination
        assert!(recon.reconstruct_sources(&abnormal).is_empty());
    }

    #[test]
    fn test_missing_resolution_blocks_chain() {
        let p = [40009, 40013, 40031];
        let u = [401, 409, 419];
        let mut sketch = MultiResolutionSketch::new(&p, &u).unwrap();
        let addr = address::to_integer("8.8.8.8").unwrap();
        sketch.update(addr, 1, 53);

        let recon = AddressReconstructor::new(&sketch).unwrap();
        let mut abnormal = abnormal_for(&[addr], &p);
        abnormal[1].clear();
        assert!(recon.reconstruct_sources(&abnormal).is_empty());

        // Fewer sets than resolutions behaves the same
        let short = abnormal_for(&[addr], &p[..2]);
        assert!(recon.reconstruct_sources(&short).is_empty());
    }

    #[test]
    fn test_abnormal_without_links_dropped() {
        let p = [40009, 40013];
        let sketch = MultiResolutionSketch::new(&p, &[401, 409]).unwrap();
        let recon = AddressReconstructor::new(&sketch).unwrap();
        let abnormal = vec![AbnormalSet::from([5]), AbnormalSet::from([5])];
        assert!(recon.reconstruct_sources(&abnormal).is_empty());
    }

    #[test]
    fn test_multiple_addresses_sorted_by_chain() {
        let p = [40009, 40013, 40031, 40037, 40039];
        let u = [401, 409, 419, 421, 431];
        let mut sketch = MultiResolutionSketch::new(&p, &u).unwrap();
        let addrs = [
            address::to_integer("1.2.3.4").unwrap(),
            address::to_integer("200.100.50.25").unwrap(),
            address::to_integer("10.0.0.1").unwrap(),
        ];
        for &a in &addrs {
            sketch.update(a, 99, 22);
        }

        let recon = AddressReconstructor::new(&sketch).unwrap();
        let found = recon.reconstruct_sources(&abnormal_for(&addrs, &p));
        assert_eq!(unique_addresses(&found), addrs.iter().copied().collect());

        let firsts: Vec<u32> = found.iter().map(|r| r.residues[0]).collect();
        let mut sorted = firsts.clone();
        sorted.sort_unstable();
        assert_eq!(firsts, sorted);
    }
}
