//! Groth16 proving with memoised per-circuit keys
//!
//! Setup is circuit specific, so the keyring runs it once per circuit id and
//! caches the key pair. Every witness is checked against the constraint
//! system before proving: Groth16 would otherwise happily emit a proof that
//! simply fails verification later.

use super::aggregator::AggregatorCircuit;
use super::temporal::{TemporalAggregatorCircuit, TemporalParameters};
use super::types::{CircuitError, CircuitProof, MetricKind, ProofKind, ProofSystem};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_snark::SNARK;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info};

/// Proving and verifying key for one circuit.
pub struct CircuitKeys {
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
}

/// Key cache and prover.
pub struct CircuitKeyring {
    rng: Mutex<StdRng>,
    keys: RwLock<HashMap<String, Arc<CircuitKeys>>>,
    proof_system: ProofSystem,
}

impl std::fmt::Debug for CircuitKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let circuits = self.keys.read().map(|k| k.len()).unwrap_or(0);
        f.debug_struct("CircuitKeyring")
            .field("circuits", &circuits)
            .field("proof_system", &self.proof_system)
            .finish()
    }
}

impl Default for CircuitKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitKeyring {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic keys and proofs, for tests and reproducible fixtures.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            keys: RwLock::new(HashMap::new()),
            proof_system: ProofSystem::Groth16Bn254Compressed,
        }
    }

    pub fn with_proof_system(mut self, proof_system: ProofSystem) -> Self {
        self.proof_system = proof_system;
        self
    }

    /// Keys for `circuit_id`, running setup on `blank` the first time.
    pub fn keys_for<C, B>(&self, circuit_id: &str, blank: B) -> Result<Arc<CircuitKeys>, CircuitError>
    where
        C: ConstraintSynthesizer<Fr>,
        B: FnOnce() -> C,
    {
        if let Some(keys) = self.keys.read().map_err(|_| CircuitError::LockPoisoned)?.get(circuit_id) {
            return Ok(keys.clone());
        }

        let started = Instant::now();
        let (proving_key, verifying_key) = {
            let mut rng = self.rng.lock().map_err(|_| CircuitError::LockPoisoned)?;
            Groth16::<Bn254>::circuit_specific_setup(blank(), &mut *rng)?
        };
        info!(
            circuit = %circuit_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "circuit setup complete"
        );

        let mut keys = self.keys.write().map_err(|_| CircuitError::LockPoisoned)?;
        // Another caller may have raced us; keep whichever landed first.
        let entry = keys.entry(circuit_id.to_string()).or_insert_with(|| {
            Arc::new(CircuitKeys {
                proving_key,
                verifying_key,
            })
        });
        Ok(entry.clone())
    }

    /// Encoded verifying key for a circuit, running setup if needed.
    pub fn verifying_key_for_aggregate<const N: usize>(&self, kind: MetricKind) -> Result<Vec<u8>, CircuitError> {
        let keys = self.keys_for(&AggregatorCircuit::<N>::circuit_id(kind), || {
            AggregatorCircuit::<N>::blank(kind)
        })?;
        self.proof_system.serialize(&keys.verifying_key)
    }

    pub fn verifying_key_for_temporal<const N: usize>(
        &self,
        params: TemporalParameters,
    ) -> Result<Vec<u8>, CircuitError> {
        let keys = self.keys_for(&TemporalAggregatorCircuit::<N>::circuit_id(&params), || {
            TemporalAggregatorCircuit::<N>::blank(params)
        })?;
        self.proof_system.serialize(&keys.verifying_key)
    }

    pub fn prove_aggregate<const N: usize>(
        &self,
        circuit: AggregatorCircuit<N>,
        timestamp_ms: u64,
    ) -> Result<CircuitProof, CircuitError> {
        let kind = circuit.kind;
        let circuit_id = AggregatorCircuit::<N>::circuit_id(kind);
        let public_inputs = circuit.encoded_public_inputs()?;
        self.prove(
            &circuit_id,
            ProofKind::Aggregate(kind),
            circuit,
            || AggregatorCircuit::<N>::blank(kind),
            public_inputs,
            timestamp_ms,
        )
    }

    pub fn prove_temporal<const N: usize>(
        &self,
        circuit: TemporalAggregatorCircuit<N>,
        timestamp_ms: u64,
    ) -> Result<CircuitProof, CircuitError> {
        let params = circuit.params;
        let circuit_id = TemporalAggregatorCircuit::<N>::circuit_id(&params);
        let public_inputs = circuit.encoded_public_inputs();
        self.prove(
            &circuit_id,
            ProofKind::Temporal,
            circuit,
            || TemporalAggregatorCircuit::<N>::blank(params),
            public_inputs,
            timestamp_ms,
        )
    }

    fn prove<C, B>(
        &self,
        circuit_id: &str,
        kind: ProofKind,
        circuit: C,
        blank: B,
        public_inputs: Vec<[u8; 32]>,
        timestamp_ms: u64,
    ) -> Result<CircuitProof, CircuitError>
    where
        C: ConstraintSynthesizer<Fr> + Clone,
        B: FnOnce() -> C,
    {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.clone().generate_constraints(cs.clone())?;
        if !cs.is_satisfied()? {
            let failing = cs.which_is_unsatisfied()?.unwrap_or_default();
            debug!(circuit = %circuit_id, constraint = %failing, "witness rejected");
            return Err(CircuitError::Unsatisfied(failing));
        }

        let keys = self.keys_for(circuit_id, blank)?;
        let started = Instant::now();
        let proof = {
            let mut rng = self.rng.lock().map_err(|_| CircuitError::LockPoisoned)?;
            Groth16::<Bn254>::prove(&keys.proving_key, circuit, &mut *rng)?
        };
        debug!(
            circuit = %circuit_id,
            constraints = cs.num_constraints(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "proof generated"
        );

        Ok(CircuitProof {
            circuit_id: circuit_id.to_string(),
            kind,
            proof_system: self.proof_system,
            proof: self.proof_system.serialize(&proof)?,
            public_inputs,
            verifying_key: self.proof_system.serialize(&keys.verifying_key)?,
            timestamp_ms,
            include: true,
        })
    }
}
