//! Error types for supersketch.

use thiserror::Error;

/// Supersketch error types.
#[derive(Error, Debug)]
pub enum SketchError {
    /// Address text is not a dotted-quad IPv4 address
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// Destination port does not fit in 16 bits
    #[error("Invalid port: {0}")]
    InvalidPort(i64),

    /// A sketch needs at least one resolution
    #[error("No resolutions configured")]
    NoResolutions,

    /// Address and port modulus sequences differ in length
    #[error("Modulus count mismatch: {address} address moduli, {port} port moduli")]
    ModulusCountMismatch { address: usize, port: usize },

    /// A modulus below 2 cannot index anything
    #[error("Modulus too small at resolution {index}: {modulus}")]
    ModulusTooSmall { index: usize, modulus: u32 },

    /// Address moduli must be pairwise coprime for CRT reconstruction
    #[error("Address moduli not coprime: p[{first}]={a}, p[{second}]={b}")]
    NotCoprime {
        first: usize,
        second: usize,
        a: u32,
        b: u32,
    },

    /// Product of address moduli exceeds the CRT arithmetic
    #[error("Address modulus product overflows 128-bit CRT arithmetic")]
    ModulusProductOverflow,

    /// Detection threshold outside (0, 1]
    #[error("Invalid {name} threshold: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    /// Residue vector length differs from modulus count
    #[error("Residue count mismatch: expected {expected}, got {got}")]
    ResidueCountMismatch { expected: usize, got: usize },

    /// JSON configuration error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// CSV ingestion error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for supersketch operations.
pub type Result<T> = std::result::Result<T, SketchError>;
