//! Mode-specific merging of weighted public inputs.

use crate::circuits::{poseidon, CircuitError};
use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the combined public-input vector.
pub const COMBINED_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    /// Weighted element-wise sum.
    #[default]
    Aggregate,
    /// Random linear combination with a challenge bound to the integrity root.
    Batch,
    /// Sequential Poseidon fold, one proof at a time.
    Recursive,
}

impl CombinationMode {
    pub fn name(self) -> &'static str {
        match self {
            CombinationMode::Aggregate => "aggregate",
            CombinationMode::Batch => "batch",
            CombinationMode::Recursive => "recursive",
        }
    }

    fn tag(self) -> Fr {
        Fr::from(match self {
            CombinationMode::Aggregate => 1u64,
            CombinationMode::Batch => 2,
            CombinationMode::Recursive => 3,
        })
    }
}

impl fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public inputs zero-padded to `COMBINED_WIDTH`.
pub(crate) fn pad(inputs: &[Fr]) -> [Fr; COMBINED_WIDTH] {
    let mut padded = [Fr::zero(); COMBINED_WIDTH];
    for (slot, value) in padded.iter_mut().zip(inputs) {
        *slot = *value;
    }
    padded
}

/// Merge `(weight, padded inputs)` pairs; zero-weight entries are skipped.
pub(crate) fn combine(
    mode: CombinationMode,
    entries: &[(u64, [Fr; COMBINED_WIDTH])],
    integrity_root: Fr,
) -> Result<[Fr; COMBINED_WIDTH], CircuitError> {
    let included = entries.iter().filter(|(w, _)| *w > 0);
    let mut combined = [Fr::zero(); COMBINED_WIDTH];
    match mode {
        CombinationMode::Aggregate => {
            for (weight, inputs) in included {
                let w = Fr::from(*weight);
                for (acc, x) in combined.iter_mut().zip(inputs) {
                    *acc += w * x;
                }
            }
        }
        CombinationMode::Batch => {
            let challenge = poseidon::hash(&[integrity_root, mode.tag()])?;
            let mut power = challenge;
            for (weight, inputs) in included {
                let w = Fr::from(*weight) * power;
                for (acc, x) in combined.iter_mut().zip(inputs) {
                    *acc += w * x;
                }
                power *= challenge;
            }
        }
        CombinationMode::Recursive => {
            for (weight, inputs) in included {
                let w = Fr::from(*weight);
                for (acc, x) in combined.iter_mut().zip(inputs) {
                    *acc = poseidon::hash(&[*acc, w * x])?;
                }
            }
        }
    }
    Ok(combined)
}

/// Digest binding the combined inputs to the mode and integrity root.
pub(crate) fn combined_digest(
    mode: CombinationMode,
    combined: &[Fr; COMBINED_WIDTH],
    integrity_root: Fr,
) -> Result<Fr, CircuitError> {
    let body = poseidon::chain(combined)?;
    poseidon::hash(&[integrity_root, mode.tag(), body])
}

/// `challenge^n`, exposed for checking batch combinations by hand.
#[cfg(test)]
pub(crate) fn batch_power(integrity_root: Fr, n: u64) -> Fr {
    poseidon::hash(&[integrity_root, CombinationMode::Batch.tag()])
        .map(|c| ark_ff::Field::pow(&c, [n]))
        .unwrap_or_default()
}
