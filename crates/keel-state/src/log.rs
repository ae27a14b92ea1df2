//! The single-writer shell around the pure engine.
//!
//! [`ClusterLog`] owns the DAG store behind a read-write lock: one writer
//! admits and appends a mutation atomically, any number of readers
//! resolve snapshots concurrently. The `append_*` helpers sign with the
//! local source's [`Signer`]; mutations produced elsewhere arrive through
//! [`ClusterLog::receive`].

use std::sync::RwLock;

use keel_types::{Hash, ParticipationProof, PublicKey, Validator};
use tracing::{debug, warn};

use crate::admission;
use crate::error::{AdmissionError, ResolutionError, StructuralError};
use crate::mutation::{
    AddValidators, ChangeOperators, CreateCluster, GenerateValidators, Mutation, OperatorEnr,
    Payload, ReshareValidators, SignedMutation,
};
use crate::resolve::{resolve, select_head, ResolvedHead};
use crate::signer::{Signer, Verifier};
use crate::store::DagStore;

/// An append-only log of signed cluster mutations with deterministic
/// materialisation.
pub struct ClusterLog {
    store: RwLock<DagStore>,
    signer: Box<dyn Signer>,
    verifier: Box<dyn Verifier>,
}

impl ClusterLog {
    /// Create a log over an empty DAG.
    pub fn new(signer: Box<dyn Signer>, verifier: Box<dyn Verifier>) -> Self {
        Self::open(DagStore::new(), signer, verifier)
    }

    /// Create a log over an existing DAG (e.g. decoded from persistence).
    pub fn open(store: DagStore, signer: Box<dyn Signer>, verifier: Box<dyn Verifier>) -> Self {
        Self {
            store: RwLock::new(store),
            signer,
            verifier,
        }
    }

    /// Decode a log persisted with [`ClusterLog::to_bytes`].
    pub fn from_bytes(
        bytes: &[u8],
        signer: Box<dyn Signer>,
        verifier: Box<dyn Verifier>,
    ) -> Result<Self, StructuralError> {
        Ok(Self::open(DagStore::from_bytes(bytes)?, signer, verifier))
    }

    /// The local source identity mutations are signed as.
    pub fn source(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// Number of admitted mutations.
    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    /// Whether the DAG is still empty.
    pub fn is_empty(&self) -> bool {
        self.store.read().unwrap().is_empty()
    }

    // ----- Writing -----

    /// Sign, admit, and append a locally produced mutation.
    pub fn offer(
        &self,
        parents: Vec<Hash>,
        payload: Payload,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let mutation = Mutation::new(parents, payload, timestamp);
        let signed = SignedMutation::new_signed(mutation, self.signer.as_ref())?;
        self.admit(signed.clone())?;
        Ok(signed)
    }

    /// Admit and append a mutation produced by another source.
    ///
    /// Returns `false` if the mutation is already in the DAG.
    pub fn receive(&self, signed: SignedMutation) -> Result<bool, AdmissionError> {
        let mut store = self.store.write().unwrap();
        if store.contains(&signed.hash) {
            return Ok(false);
        }
        if let Err(e) = admission::validate(&store, &signed, self.verifier.as_ref()) {
            warn!(hash = %signed.hash, error = %e, "rejected received mutation");
            return Err(e);
        }

        debug!(
            hash = %signed.hash,
            mutation_type = %signed.mutation_type(),
            "received mutation"
        );
        store.append(signed);
        Ok(true)
    }

    fn admit(&self, signed: SignedMutation) -> Result<(), AdmissionError> {
        let mut store = self.store.write().unwrap();
        admission::validate(&store, &signed, self.verifier.as_ref())?;

        debug!(
            hash = %signed.hash,
            mutation_type = %signed.mutation_type(),
            "appended mutation"
        );
        store.append(signed);
        Ok(())
    }

    // ----- Typed append helpers -----

    /// Found the cluster. The root mutation of the DAG.
    pub fn append_create_cluster(
        &self,
        name: &str,
        operators: Vec<PublicKey>,
        num_validators: u64,
        withdrawal_address: &str,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::CreateCluster(CreateCluster {
            name: name.to_string(),
            operators,
            num_validators,
            withdrawal_address: withdrawal_address.to_string(),
        });
        self.offer(Vec::new(), payload, timestamp)
    }

    /// Publish this operator's ENR.
    pub fn append_operator_enr(
        &self,
        enr: &str,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::OperatorEnr(OperatorEnr {
            enr: enr.to_string(),
        });
        self.offer(parents, payload, timestamp)
    }

    /// Propose the DKG output: a batch of validators with shares.
    pub fn append_generate_validators(
        &self,
        validators: Vec<Validator>,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::GenerateValidators(GenerateValidators { validators });
        self.offer(parents, payload, timestamp)
    }

    /// Propose raising the validator target.
    pub fn append_add_validators(
        &self,
        num_validators: u64,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::AddValidators(AddValidators { num_validators });
        self.offer(parents, payload, timestamp)
    }

    /// Acknowledge a preceding state-changing mutation.
    pub fn append_operator_ack(
        &self,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        self.offer(parents, Payload::OperatorAck, timestamp)
    }

    /// Propose replacing the operator set.
    pub fn append_change_operators(
        &self,
        new_operators: Vec<PublicKey>,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::ChangeOperators(ChangeOperators { new_operators });
        self.offer(parents, payload, timestamp)
    }

    /// Propose replacing every validator's shares.
    pub fn append_reshare_validators(
        &self,
        new_validators: Vec<Validator>,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        let payload = Payload::ReshareValidators(ReshareValidators { new_validators });
        self.offer(parents, payload, timestamp)
    }

    /// Record operator participation over an epoch range.
    pub fn append_participation_proof(
        &self,
        proof: ParticipationProof,
        parents: Vec<Hash>,
        timestamp: u64,
    ) -> Result<SignedMutation, AdmissionError> {
        self.offer(parents, Payload::ParticipationProof(proof), timestamp)
    }

    // ----- Reading -----

    /// Materialise the cluster state at every DAG leaf.
    pub fn resolve(&self) -> Result<Vec<ResolvedHead>, ResolutionError> {
        resolve(&self.store.read().unwrap())
    }

    /// Materialise and pick the leader head.
    pub fn leader(&self) -> Result<ResolvedHead, ResolutionError> {
        let heads = self.resolve()?;
        select_head(&heads)
            .cloned()
            .ok_or(ResolutionError::EmptyDag)
    }

    /// Persistence layout: concatenated canonical encodings in admission
    /// order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.store.read().unwrap().to_bytes()
    }

    /// Run a closure against a read snapshot of the store.
    pub fn with_store<T>(&self, f: impl FnOnce(&DagStore) -> T) -> T {
        f(&self.store.read().unwrap())
    }
}
