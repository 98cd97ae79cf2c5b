//! Sketch configuration.
//!
//! A configuration fixes the resolution count `n`, the address moduli
//! `p[0..n)`, the port moduli `u[0..n)` and the two detection thresholds.
//! It is validated once at construction; nothing in the update path can
//! fail because of a bad configuration.
//!
//! ```rust
//! use supersketch::SketchConfig;
//!
//! let config = SketchConfig::from_json_str(
//!     r#"{"address_moduli": [40009, 40013, 40031], "port_moduli": [401, 409, 419]}"#,
//! ).unwrap();
//! assert_eq!(config.resolutions(), 3);
//! assert_eq!(config.spreader_threshold, 0.003);
//! ```

use crate::error::{Result, SketchError};
use crate::modmath::CrtBasis;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default spreader/receiver threshold (fraction of the per-resolution total).
pub const DEFAULT_SPREADER_THRESHOLD: f64 = 0.003;
/// Default changer threshold (fraction of the per-resolution total change).
pub const DEFAULT_CHANGER_THRESHOLD: f64 = 0.002;

const FULL_ADDRESS_SPACE: u128 = 1 << 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// `p[i]`: address modulus per resolution. Pairwise coprime.
    pub address_moduli: Vec<u32>,
    /// `u[i]`: port modulus per resolution.
    pub port_moduli: Vec<u32>,
    /// `dt`: spreader and receiver threshold.
    pub spreader_threshold: f64,
    /// `ct`: changer threshold.
    pub changer_threshold: f64,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            address_moduli: vec![40009, 40013, 40031, 40037, 40039],
            port_moduli: vec![401, 409, 419, 421, 431],
            spreader_threshold: DEFAULT_SPREADER_THRESHOLD,
            changer_threshold: DEFAULT_CHANGER_THRESHOLD,
        }
    }
}

impl SketchConfig {
    /// Build a configuration with default thresholds.
    pub fn new(address_moduli: Vec<u32>, port_moduli: Vec<u32>) -> Self {
        Self {
            address_moduli,
            port_moduli,
            ..Self::default()
        }
    }

    pub fn with_spreader_threshold(mut self, dt: f64) -> Self {
        self.spreader_threshold = dt;
        self
    }

    pub fn with_changer_threshold(mut self, ct: f64) -> Self {
        self.changer_threshold = ct;
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Number of resolutions `n`.
    pub fn resolutions(&self) -> usize {
        self.address_moduli.len()
    }

    /// Check every structural requirement and return the CRT basis.
    pub fn validate(&self) -> Result<CrtBasis> {
        if self.address_moduli.is_empty() {
            return Err(SketchError::NoResolutions);
        }
        if self.address_moduli.len() != self.port_moduli.len() {
            return Err(SketchError::ModulusCountMismatch {
                address: self.address_moduli.len(),
                port: self.port_moduli.len(),
            });
        }
        for (index, &modulus) in self.port_moduli.iter().enumerate() {
            if modulus < 2 {
                return Err(SketchError::ModulusTooSmall { index, modulus });
            }
        }
        check_threshold("spreader", self.spreader_threshold)?;
        check_threshold("changer", self.changer_threshold)?;

        CrtBasis::new(&self.address_moduli)
    }

    /// Whether `Π p[i] ≥ 2^32`, i.e. every IPv4 address has a unique chain.
    pub fn covers_address_space(&self) -> bool {
        self.address_moduli
            .iter()
            .try_fold(1u128, |acc, &m| acc.checked_mul(m as u128))
            .map_or(true, |product| product >= FULL_ADDRESS_SPACE)
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SketchError::InvalidThreshold { name, value })
    }
}
