//! Verification Registry
//!
//! Accepts proof bundles for claim statements and issues credentials.
//!
//! ## Submission
//!
//! 1. Refuse while paused
//! 2. Structural bounds on the statement
//! 3. Every included proof must carry a trusted verifying key and bind to the statement
//! 4. The bundle is recombined and must be valid with the same integrity hash
//! 5. Proof hashes are consumed and the credential stored in one store operation
//!    (replay protection); a refused credential consumes nothing
//!
//! Queries and revocation keep working while paused.

pub mod credential;
pub mod statement;
pub mod store;

pub use credential::{credential_id, Credential, CredentialState};
pub use statement::{Bounds, ClaimStatement, RejectionReason};
pub use store::{FileProofStore, Issuance, MemoryProofStore, ProofStore, StoreError};

use crate::activity::SubjectId;
use crate::clock::{TimeSource, DAY_MS};
use crate::combiner::{CombinerError, ProofBundle, ProofCombiner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Submission rejected: {0}")]
    Rejected(RejectionReason),

    #[error("Proof {proof_hash} already consumed by an earlier submission")]
    Replay { proof_hash: String },

    #[error("Registry is paused")]
    Paused,

    #[error("Registry backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Caller {0} is not the registry owner")]
    NotOwner(SubjectId),

    #[error("Caller {0} did not submit this credential")]
    NotSubmitter(SubjectId),

    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    #[error("Credential {0} is already revoked")]
    AlreadyRevoked(String),

    #[error("Combiner error: {0}")]
    Combiner(#[from] CombinerError),
}

impl From<StoreError> for VerificationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(credential_id) => {
                VerificationError::Rejected(RejectionReason::DuplicateCredential { credential_id })
            }
            StoreError::NotFound(id) => VerificationError::UnknownCredential(id),
            other => VerificationError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<RejectionReason> for VerificationError {
    fn from(reason: RejectionReason) -> Self {
        VerificationError::Rejected(reason)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub credential_ttl_days: u64,
    /// How far ahead of the registry clock a statement timestamp may be.
    pub future_tolerance_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            credential_ttl_days: 365,
            future_tolerance_ms: 5 * 60 * 1000,
        }
    }
}

pub struct VerificationRegistry {
    owner: SubjectId,
    config: RegistryConfig,
    store: Arc<dyn ProofStore>,
    combiner: ProofCombiner,
    clock: Arc<dyn TimeSource>,
    /// circuit id -> serialized verifying key
    trusted_keys: RwLock<HashMap<String, Vec<u8>>>,
    paused: AtomicBool,
    /// Serializes read-check-write on credentials.
    revocations: Mutex<()>,
}

impl VerificationRegistry {
    pub fn new(owner: SubjectId, config: RegistryConfig, store: Arc<dyn ProofStore>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            owner,
            config,
            store,
            combiner: ProofCombiner::new(clock.clone()),
            clock,
            trusted_keys: RwLock::new(HashMap::new()),
            paused: AtomicBool::new(false),
            revocations: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> &SubjectId {
        &self.owner
    }

    fn require_owner(&self, caller: &SubjectId) -> Result<(), VerificationError> {
        if caller != &self.owner {
            return Err(VerificationError::NotOwner(caller.clone()));
        }
        Ok(())
    }

    /// Trust `verifying_key` for proofs claiming `circuit_id`. Replaces any previous key.
    pub fn register_verifying_key(
        &self,
        caller: &SubjectId,
        circuit_id: impl Into<String>,
        verifying_key: Vec<u8>,
    ) -> Result<(), VerificationError> {
        self.require_owner(caller)?;
        let circuit_id = circuit_id.into();
        let mut keys = self
            .trusted_keys
            .write()
            .map_err(|_| VerificationError::BackendUnavailable("trusted key lock poisoned".into()))?;
        info!(circuit_id = %circuit_id, "Registered verifying key");
        keys.insert(circuit_id, verifying_key);
        Ok(())
    }

    pub fn pause(&self, caller: &SubjectId) -> Result<(), VerificationError> {
        self.require_owner(caller)?;
        self.paused.store(true, Ordering::SeqCst);
        warn!("Registry paused");
        Ok(())
    }

    pub fn unpause(&self, caller: &SubjectId) -> Result<(), VerificationError> {
        self.require_owner(caller)?;
        self.paused.store(false, Ordering::SeqCst);
        info!("Registry unpaused");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn check_trusted(&self, bundle: &ProofBundle) -> Result<(), VerificationError> {
        let keys = self
            .trusted_keys
            .read()
            .map_err(|_| VerificationError::BackendUnavailable("trusted key lock poisoned".into()))?;
        for proof in bundle.included() {
            if keys.get(&proof.circuit_id) != Some(&proof.verifying_key) {
                return Err(RejectionReason::UntrustedKey {
                    circuit_id: proof.circuit_id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Verify `bundle` against `statement` and issue a credential for `subject`.
    pub async fn submit(
        &self,
        submitter: &SubjectId,
        subject: &SubjectId,
        statement: ClaimStatement,
        bundle: &ProofBundle,
    ) -> Result<Credential, VerificationError> {
        if self.is_paused() {
            return Err(VerificationError::Paused);
        }
        let now = self.clock.now_ms();

        if statement.claim_type() != bundle.claim {
            return Err(RejectionReason::ClaimTypeMismatch {
                statement: statement.claim_type(),
                bundle: bundle.claim,
            }
            .into());
        }
        statement.check_bounds(now, self.config.future_tolerance_ms)?;
        self.check_trusted(bundle)?;
        statement.check_binding(bundle.included())?;

        let recombined = self.combiner.combine(bundle.claim, bundle.proofs.clone(), bundle.mode)?;
        if let Some(rejection) = recombined.rejection {
            return Err(RejectionReason::InvalidBundle { rejection }.into());
        }
        if recombined.integrity_hash != bundle.integrity_hash {
            return Err(RejectionReason::IntegrityMismatch.into());
        }

        let id = credential_id(subject, &statement, bundle.included().flat_map(|p| p.public_inputs.iter()));
        let credential = Credential {
            id,
            subject: subject.clone(),
            submitter: submitter.clone(),
            statement,
            proof_hashes: bundle.proof_hashes(),
            integrity_hash: hex::encode(bundle.integrity_hash),
            issued_at_ms: now,
            expires_at_ms: now.saturating_add(self.config.credential_ttl_days.saturating_mul(DAY_MS)),
            revoked_at_ms: None,
        };
        match self.store.issue_credential(credential.clone()).await? {
            Issuance::Issued => {}
            Issuance::Replayed(proof_hash) => {
                warn!(subject = %subject, claim = %bundle.claim, proof_hash = %proof_hash, "Replayed proof rejected");
                return Err(VerificationError::Replay { proof_hash });
            }
            Issuance::Duplicate(credential_id) => {
                warn!(subject = %subject, credential_id = %credential_id, "Duplicate credential rejected");
                return Err(RejectionReason::DuplicateCredential { credential_id }.into());
            }
        }
        info!(
            credential_id = %credential.id,
            subject = %subject,
            claim = %credential.claim_type(),
            "Credential issued"
        );
        Ok(credential)
    }

    /// Revoke a credential. Only its submitter may do so, and only once.
    pub async fn revoke(&self, caller: &SubjectId, credential_id: &str) -> Result<Credential, VerificationError> {
        let _guard = self.revocations.lock().await;
        let mut credential = self
            .store
            .get_credential(credential_id)
            .await?
            .ok_or_else(|| VerificationError::UnknownCredential(credential_id.to_string()))?;
        if &credential.submitter != caller {
            return Err(VerificationError::NotSubmitter(caller.clone()));
        }
        if credential.revoked_at_ms.is_some() {
            return Err(VerificationError::AlreadyRevoked(credential_id.to_string()));
        }
        credential.revoked_at_ms = Some(self.clock.now_ms());
        self.store.update_credential(credential.clone()).await?;
        info!(credential_id = %credential_id, "Credential revoked");
        Ok(credential)
    }

    pub async fn status(&self, credential_id: &str) -> Result<CredentialState, VerificationError> {
        let now = self.clock.now_ms();
        Ok(self
            .store
            .get_credential(credential_id)
            .await?
            .map_or(CredentialState::Unissued, |c| c.state(now)))
    }

    pub async fn credential(&self, credential_id: &str) -> Result<Option<Credential>, VerificationError> {
        Ok(self.store.get_credential(credential_id).await?)
    }

    /// Every credential issued for `subject`, in id order.
    pub async fn credentials_for(&self, subject: &SubjectId) -> Result<Vec<Credential>, VerificationError> {
        Ok(self.store.credentials_for(subject).await?)
    }

    pub async fn is_consumed(&self, proof_hash: &str) -> Result<bool, VerificationError> {
        Ok(self.store.is_consumed(proof_hash).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::ClaimType;
    use crate::circuits::{verify_proof, AggregatorCircuit, CircuitKeyring, CircuitProof, ClaimRange, MetricKind};
    use ark_bn254::Bn254;
    use ark_groth16::{Groth16, Proof, VerifyingKey};
    use crate::clock::ManualTimeSource;
    use crate::combiner::CombinationMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;

    const NOW: u64 = 1_700_000_000_000;

    fn owner() -> SubjectId {
        SubjectId::new("0x00000000000000000000000000000000000000aa")
    }

    fn dev() -> SubjectId {
        SubjectId::new("0x00000000000000000000000000000000000000bb")
    }

    /// Two collaborator proofs for [2, 20] with different witnesses.
    fn proofs() -> &'static (CircuitProof, CircuitProof) {
        static PROOFS: OnceLock<(CircuitProof, CircuitProof)> = OnceLock::new();
        PROOFS.get_or_init(|| {
            let keyring = CircuitKeyring::from_seed(31);
            let mut rng = StdRng::seed_from_u64(31);
            let mut prove = |values: &[u64]| {
                let circuit =
                    AggregatorCircuit::<4>::new(MetricKind::Collaborators, values, ClaimRange::new(2, 20), 1, &mut rng)
                        .unwrap();
                keyring.prove_aggregate(circuit, NOW).unwrap()
            };
            (prove(&[3, 4]), prove(&[5, 6, 1]))
        })
    }

    fn statement() -> ClaimStatement {
        ClaimStatement::Collaboration {
            collaborators: Bounds::new(2, 20),
            timestamp_ms: NOW,
        }
    }

    struct Fixture {
        clock: Arc<ManualTimeSource>,
        registry: VerificationRegistry,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualTimeSource::new(NOW));
        let registry = VerificationRegistry::new(
            owner(),
            RegistryConfig::default(),
            Arc::new(MemoryProofStore::new()),
            clock.clone(),
        );
        let proof = &proofs().0;
        registry
            .register_verifying_key(&owner(), proof.circuit_id.clone(), proof.verifying_key.clone())
            .unwrap();
        Fixture { clock, registry }
    }

    fn bundle(fx: &Fixture, proof: &CircuitProof) -> ProofBundle {
        ProofCombiner::new(fx.clock.clone())
            .combine(ClaimType::Collaboration, vec![proof.clone()], CombinationMode::Aggregate)
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_issues_credential() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        let credential = fx.registry.submit(&dev(), &dev(), statement(), &b).await.unwrap();
        assert_eq!(credential.expires_at_ms, NOW + 365 * DAY_MS);
        assert_eq!(fx.registry.status(&credential.id).await.unwrap(), CredentialState::Verified);
        assert!(fx.registry.is_consumed(&proofs().0.proof_hash_hex()).await.unwrap());
        assert_eq!(fx.registry.credentials_for(&dev()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        fx.registry.submit(&dev(), &dev(), statement(), &b).await.unwrap();
        let again = fx.registry.submit(&dev(), &dev(), statement(), &b).await;
        match again {
            Err(VerificationError::Replay { proof_hash }) => assert_eq!(proof_hash, proofs().0.proof_hash_hex()),
            other => panic!("expected replay, got {:?}", other.map(|c| c.id)),
        }

        // A bundle that reuses one consumed proof alongside a fresh one is refused whole.
        let mixed = ProofCombiner::new(fx.clock.clone())
            .combine(
                ClaimType::Collaboration,
                vec![proofs().1.clone(), proofs().0.clone()],
                CombinationMode::Aggregate,
            )
            .unwrap();
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), statement(), &mixed).await,
            Err(VerificationError::Replay { .. })
        ));
        assert!(!fx.registry.is_consumed(&proofs().1.proof_hash_hex()).await.unwrap());
    }

    #[tokio::test]
    async fn test_rerandomized_proof_is_a_replay() {
        let fx = fixture();
        let original = &proofs().0;
        let first = fx
            .registry
            .submit(&dev(), &dev(), statement(), &bundle(&fx, original))
            .await
            .unwrap();

        let vk: VerifyingKey<Bn254> = original.proof_system.deserialize(&original.verifying_key).unwrap();
        let groth: Proof<Bn254> = original.proof_system.deserialize(&original.proof).unwrap();
        let mut rng = StdRng::seed_from_u64(77);
        let mut mauled = original.clone();
        mauled.proof = original
            .proof_system
            .serialize(&Groth16::<Bn254>::rerandomize_proof(&vk, &groth, &mut rng))
            .unwrap();
        assert_ne!(mauled.proof, original.proof);
        assert!(verify_proof(&mauled).unwrap());

        // A later statement timestamp would otherwise yield a fresh credential id.
        fx.clock.advance(1_000);
        let later = ClaimStatement::Collaboration {
            collaborators: Bounds::new(2, 20),
            timestamp_ms: NOW + 1_000,
        };
        match fx.registry.submit(&dev(), &dev(), later, &bundle(&fx, &mauled)).await {
            Err(VerificationError::Replay { proof_hash }) => assert_eq!(proof_hash, first.proof_hashes[0]),
            other => panic!("expected replay, got {:?}", other.map(|c| c.id)),
        }
        assert_eq!(fx.registry.credentials_for(&dev()).await.unwrap().len(), 1);
    }

    #[test]
    fn test_store_errors_keep_their_family() {
        assert!(matches!(
            VerificationError::from(StoreError::Duplicate("c1".into())),
            VerificationError::Rejected(RejectionReason::DuplicateCredential { .. })
        ));
        assert!(matches!(
            VerificationError::from(StoreError::NotFound("c1".into())),
            VerificationError::UnknownCredential(_)
        ));
        assert!(matches!(
            VerificationError::from(StoreError::LockPoisoned),
            VerificationError::BackendUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_untrusted_key_rejected() {
        let fx = fixture();
        let mut proof = proofs().0.clone();
        proof.verifying_key = CircuitKeyring::from_seed(99)
            .verifying_key_for_aggregate::<4>(MetricKind::Collaborators)
            .unwrap();
        let b = bundle(&fx, &proof);
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), statement(), &b).await,
            Err(VerificationError::Rejected(RejectionReason::UntrustedKey { .. }))
        ));
    }

    #[tokio::test]
    async fn test_statement_must_match_proven_range() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        let wider = ClaimStatement::Collaboration {
            collaborators: Bounds::new(1, 20),
            timestamp_ms: NOW,
        };
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), wider, &b).await,
            Err(VerificationError::Rejected(RejectionReason::UnboundProof { .. }))
        ));
        let wrong_type = ClaimStatement::Language {
            language_count: 2,
            timestamp_ms: NOW,
        };
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), wrong_type, &b).await,
            Err(VerificationError::Rejected(RejectionReason::ClaimTypeMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_tampered_integrity_hash_rejected() {
        let fx = fixture();
        let mut b = bundle(&fx, &proofs().0);
        b.integrity_hash[0] ^= 1;
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), statement(), &b).await,
            Err(VerificationError::Rejected(RejectionReason::IntegrityMismatch))
        ));
        assert!(!fx.registry.is_consumed(&proofs().0.proof_hash_hex()).await.unwrap());
    }

    #[tokio::test]
    async fn test_pause_blocks_submission_only() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        let credential = fx.registry.submit(&dev(), &dev(), statement(), &b).await.unwrap();

        assert!(matches!(fx.registry.pause(&dev()), Err(VerificationError::NotOwner(_))));
        fx.registry.pause(&owner()).unwrap();
        let b2 = bundle(&fx, &proofs().1);
        assert!(matches!(
            fx.registry.submit(&dev(), &dev(), statement(), &b2).await,
            Err(VerificationError::Paused)
        ));
        assert_eq!(fx.registry.status(&credential.id).await.unwrap(), CredentialState::Verified);
        fx.registry.revoke(&dev(), &credential.id).await.unwrap();

        fx.registry.unpause(&owner()).unwrap();
        assert!(fx.registry.submit(&dev(), &dev(), statement(), &b2).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_is_one_way_and_submitter_only() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        let credential = fx.registry.submit(&owner(), &dev(), statement(), &b).await.unwrap();

        assert!(matches!(
            fx.registry.revoke(&dev(), &credential.id).await,
            Err(VerificationError::NotSubmitter(_))
        ));
        fx.registry.revoke(&owner(), &credential.id).await.unwrap();
        assert!(matches!(
            fx.registry.revoke(&owner(), &credential.id).await,
            Err(VerificationError::AlreadyRevoked(_))
        ));
        assert_eq!(fx.registry.status(&credential.id).await.unwrap(), CredentialState::Revoked);
        assert!(matches!(
            fx.registry.revoke(&owner(), "missing").await,
            Err(VerificationError::UnknownCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_credential_expires() {
        let fx = fixture();
        let b = bundle(&fx, &proofs().0);
        let credential = fx.registry.submit(&dev(), &dev(), statement(), &b).await.unwrap();
        fx.clock.advance(365 * DAY_MS);
        assert_eq!(fx.registry.status(&credential.id).await.unwrap(), CredentialState::Expired);
        assert_eq!(fx.registry.status("missing").await.unwrap(), CredentialState::Unissued);
    }
}
