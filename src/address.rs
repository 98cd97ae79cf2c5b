//! Address codec: dotted-quad text ↔ 32-bit integer.
//!
//! Sketch coordinates are residues of the integer form, so every address
//! entering the engine passes through [`to_integer`] and every reconstructed
//! address leaves through [`to_text`].
//!
//! ```rust
//! use supersketch::address;
//!
//! let dec = address::to_integer("10.0.0.1").unwrap();
//! assert_eq!(dec, 167772161);
//! assert_eq!(address::to_text(dec), "10.0.0.1");
//! ```

use crate::error::{Result, SketchError};
use std::net::Ipv4Addr;

/// Parse a dotted-quad address into its big-endian integer value.
pub fn to_integer(text: &str) -> Result<u32> {
    text.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| SketchError::InvalidAddress(text.to_string()))
}

/// Render an integer address as dotted-quad text.
pub fn to_text(address: u32) -> String {
    Ipv4Addr::from(address).to_string()
}
