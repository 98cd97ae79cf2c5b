//! Modular arithmetic: extended GCD, modular inverse, and CRT.
//!
//! Reconstruction turns one residue per resolution back into an address.
//! With pairwise-coprime moduli `p[0..n)` the Chinese Remainder Theorem
//! guarantees a unique solution in `[0, Π p)`.
//!
//! The per-modulus coefficients only depend on the moduli, so they are
//! computed once into a [`CrtBasis`] and reused for every chain.
//!
//! ```rust
//! use supersketch::modmath::chinese_remainder;
//!
//! // 13 mod 5 = 3, 13 mod 7 = 6
//! assert_eq!(chinese_remainder(&[5, 7], &[3, 6]).unwrap(), 13);
//! ```

use crate::error::{Result, SketchError};

/// Extended Euclid: returns `(x, y, g)` with `a*x + b*y = g = gcd(a, b)`.
pub fn egcd(a: i128, b: i128) -> (i128, i128, i128) {
    let (mut old_r, mut r) = (a, b);
    let (mut old_x, mut x) = (1i128, 0i128);
    let (mut old_y, mut y) = (0i128, 1i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_x, x) = (x, old_x - q * x);
        (old_y, y) = (y, old_y - q * y);
    }

    (old_x, old_y, old_r)
}

/// Greatest common divisor.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Inverse of `a` modulo `m`, or `None` when `gcd(a, m) != 1`.
pub fn mod_inverse(a: u64, m: u64) -> Option<u64> {
    if m < 2 {
        return None;
    }
    let (x, _, g) = egcd((a % m) as i128, m as i128);
    if g != 1 {
        return None;
    }
    Some(x.rem_euclid(m as i128) as u64)
}

/// Precomputed CRT coefficients for a fixed modulus sequence.
#[derive(Clone, Debug)]
pub struct CrtBasis {
    moduli: Vec<u32>,
    product: u128,
    /// `M_i = product / p_i`
    partials: Vec<u128>,
    /// `M_i^{-1} mod p_i`
    inverses: Vec<u64>,
}

impl CrtBasis {
    /// Build a basis, checking the moduli are usable and pairwise coprime.
    pub fn new(moduli: &[u32]) -> Result<Self> {
        if moduli.is_empty() {
            return Err(SketchError::NoResolutions);
        }
        for (index, &modulus) in moduli.iter().enumerate() {
            if modulus < 2 {
                return Err(SketchError::ModulusTooSmall { index, modulus });
            }
        }
        for i in 0..moduli.len() {
            for j in (i + 1)..moduli.len() {
                if gcd(moduli[i] as u64, moduli[j] as u64) != 1 {
                    return Err(SketchError::NotCoprime {
                        first: i,
                        second: j,
                        a: moduli[i],
                        b: moduli[j],
                    });
                }
            }
        }

        let product = moduli
            .iter()
            .try_fold(1u128, |acc, &m| acc.checked_mul(m as u128))
            .ok_or(SketchError::ModulusProductOverflow)?;

        let partials: Vec<u128> = moduli.iter().map(|&m| product / m as u128).collect();
        let inverses = moduli
            .iter()
            .zip(partials.iter())
            .enumerate()
            .map(|(index, (&m, &partial))| {
                let reduced = (partial % m as u128) as u64;
                mod_inverse(reduced, m as u64).ok_or(SketchError::NotCoprime {
                    first: index,
                    second: index,
                    a: m,
                    b: m,
                })
            })
            .collect::<Result<Vec<u64>>>()?;

        Ok(Self {
            moduli: moduli.to_vec(),
            product,
            partials,
            inverses,
        })
    }

    pub fn moduli(&self) -> &[u32] {
        &self.moduli
    }

    /// Product of all moduli; solutions are unique below this bound.
    pub fn product(&self) -> u128 {
        self.product
    }

    /// Solve `x ≡ residues[i] (mod p[i])` for the unique `x < product`.
    pub fn solve(&self, residues: &[u32]) -> Result<u128> {
        if residues.len() != self.moduli.len() {
            return Err(SketchError::ResidueCountMismatch {
                expected: self.moduli.len(),
                got: residues.len(),
            });
        }

        let mut x: u128 = 0;
        for i in 0..self.moduli.len() {
            let m = self.moduli[i] as u64;
            let r = residues[i] as u64 % m;
            // (r * inv) mod p_i < p_i, so the term stays below the product
            let scaled = (r * self.inverses[i]) % m;
            let term = self.partials[i] * scaled as u128;
            x = add_mod(x, term, self.product);
        }
        Ok(x)
    }
}

/// `(a + b) mod m` for `a, b < m` without overflowing.
#[inline]
fn add_mod(a: u128, b: u128, m: u128) -> u128 {
    let gap = m - b;
    if a >= gap {
        a - gap
    } else {
        a + b
    }
}

/// One-shot CRT over `moduli`/`residues`.
pub fn chinese_remainder(moduli: &[u32], residues: &[u32]) -> Result<u128> {
    CrtBasis::new(moduli)?.solve(residues)
}
