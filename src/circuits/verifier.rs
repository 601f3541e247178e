//! Groth16 verification of a self-describing `CircuitProof`

use super::types::{CircuitError, CircuitProof};
use ark_bn254::Bn254;
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_snark::SNARK;

/// Decode and verify against the verifying key carried by the proof.
///
/// Callers that trust only specific keys should compare
/// `proof.verifying_key` with their own copy first.
pub fn verify_proof(proof: &CircuitProof) -> Result<bool, CircuitError> {
    let vk: VerifyingKey<Bn254> = proof.proof_system.deserialize(&proof.verifying_key)?;
    let groth: Proof<Bn254> = proof.proof_system.deserialize(&proof.proof)?;
    let inputs = proof.public_inputs_fr()?;
    if inputs.len() + 1 != vk.gamma_abc_g1.len() {
        return Ok(false);
    }
    Ok(Groth16::<Bn254>::verify(&vk, &inputs, &groth)?)
}
