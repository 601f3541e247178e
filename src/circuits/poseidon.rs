//! Poseidon over BN254, natively and as a gadget.
//!
//! Rate 2, alpha 17, 8 full and 31 partial rounds, with round constants and
//! MDS matrix derived by the standard Grain LFSR search. Generated once.

use super::types::CircuitError;
use ark_bn254::Fr;
use ark_crypto_primitives::crh::poseidon::constraints::{CRHGadget, CRHParametersVar};
use ark_crypto_primitives::crh::poseidon::CRH;
use ark_crypto_primitives::crh::{CRHScheme, CRHSchemeGadget};
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonDefaultConfigEntry};
use ark_ff::{PrimeField, Zero};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::fields::FieldVar;
use ark_relations::r1cs::SynthesisError;
use std::sync::OnceLock;

const RATE: usize = 2;

pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();
    CONFIG.get_or_init(|| {
        let entry = PoseidonDefaultConfigEntry::new(RATE, 17, 8, 31, 0);
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            Fr::MODULUS_BIT_SIZE as u64,
            entry.rate,
            entry.full_rounds as u64,
            entry.partial_rounds as u64,
            entry.skip_matrices as u64,
        );
        PoseidonConfig {
            full_rounds: entry.full_rounds,
            partial_rounds: entry.partial_rounds,
            alpha: entry.alpha as u64,
            ark,
            mds,
            rate: entry.rate,
            capacity: 1,
        }
    })
}

pub fn hash(inputs: &[Fr]) -> Result<Fr, CircuitError> {
    CRH::<Fr>::evaluate(poseidon_config(), inputs).map_err(|e| CircuitError::Hash(e.to_string()))
}

pub fn hash_var(inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    let params = CRHParametersVar {
        parameters: poseidon_config().clone(),
    };
    CRHGadget::<Fr>::evaluate(&params, inputs)
}

/// `Poseidon(value, blinding)`.
pub fn commit(value: u64, blinding: Fr) -> Result<Fr, CircuitError> {
    hash(&[Fr::from(value), blinding])
}

/// Left fold `acc = H(acc, item)` from zero.
pub fn chain(items: &[Fr]) -> Result<Fr, CircuitError> {
    items.iter().try_fold(Fr::zero(), |acc, item| hash(&[acc, *item]))
}

pub fn chain_var(items: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    items
        .iter()
        .try_fold(FpVar::zero(), |acc, item| hash_var(&[acc, item.clone()]))
}
