//! Error types for the state engine.
//!
//! Every fallible engine operation returns one of these; nothing panics.
//! The split follows the error kinds of the engine's contract: structural
//! defects in an offered mutation, cluster-invariant violations raised by
//! transforms, approval-gating failures, resolution failures over the DAG
//! as a whole, and signature/integrity failures from the crypto seam.

use keel_types::{DutyType, Hash, PublicKey};

use crate::mutation::MutationType;

/// A mutation is malformed or does not fit the DAG it was offered to.
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    /// The wire type tag is not in the registry.
    #[error("unknown mutation type: {0}")]
    UnknownType(String),

    /// The wire envelope bytes do not decode.
    #[error("malformed mutation envelope: {0}")]
    Envelope(String),

    /// The payload bytes do not decode as the type's payload schema.
    #[error("payload does not match schema for {mutation_type}: {reason}")]
    PayloadDecode {
        /// The type whose schema was expected.
        mutation_type: MutationType,
        /// Decoder error text.
        reason: String,
    },

    /// The first mutation of a DAG must create the cluster.
    #[error("first mutation must be create_cluster")]
    FirstMutationMustCreate,

    /// Every mutation after the root must extend the existing DAG.
    #[error("mutation declares no parents but the DAG is not empty")]
    MissingParents,

    /// A mutation whose type needs no approval may extend a single parent.
    #[error("unapproved mutation may only depend on a single parent")]
    MultipleParentsForUnapproved,

    /// A declared parent hash is not in the DAG.
    #[error("parent mutation not found: {0}")]
    MissingParent(Hash),

    /// The same parent hash was declared twice.
    #[error("duplicate parent hash: {0}")]
    DuplicateParent(Hash),

    /// A parent shares (type, source) with the offered mutation.
    #[error("duplicate parent mutation: {mutation_type} from {shared_source}")]
    DuplicateParentPair {
        /// The shared mutation type.
        mutation_type: MutationType,
        /// The shared source key.
        shared_source: PublicKey,
    },

    /// A parent's type is not allowed for the offered mutation's type.
    #[error("parent type {parent} is not allowed for {child}")]
    ParentTypeNotAllowed {
        /// The parent mutation's type.
        parent: MutationType,
        /// The offered mutation's type.
        child: MutationType,
    },
}

/// A cluster invariant would be violated by applying a mutation.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    /// CreateCluster with an empty name.
    #[error("cluster name must not be empty")]
    EmptyName,

    /// CreateCluster with no operators.
    #[error("cluster must have at least one operator")]
    NoOperators,

    /// CreateCluster applied to a non-empty cluster.
    #[error("cluster already exists")]
    ClusterNotEmpty,

    /// The mutation's source is not a cluster operator.
    #[error("operator not found: {0}")]
    OperatorNotFound(PublicKey),

    /// The operator already published an ENR.
    #[error("operator {0} already has an enr")]
    EnrAlreadySet(PublicKey),

    /// The operator has not published an ENR yet.
    #[error("operator {0} has no enr")]
    MissingEnr(PublicKey),

    /// GenerateValidators when the validator set is already complete.
    #[error("cluster already has all validators")]
    NoValidatorsMissing,

    /// GenerateValidators batch larger than the remaining target.
    #[error("too many validators: offered {offered}, missing {missing}")]
    TooManyValidators {
        /// Validators in the offered batch.
        offered: u64,
        /// Validators still missing from the target.
        missing: u64,
    },

    /// A validator's share count does not match the operator count.
    #[error("validator {validator} has {actual} shares, expected {expected}")]
    WrongShareCount {
        /// The offending validator key.
        validator: PublicKey,
        /// Expected share count (one per operator).
        expected: u64,
        /// Actual share count.
        actual: u64,
    },

    /// ChangeOperators with a list of the wrong length.
    #[error("wrong operator count: got {actual}, expected {expected}")]
    WrongOperatorCount {
        /// Current operator count.
        expected: u64,
        /// Offered operator count.
        actual: u64,
    },

    /// ReshareValidators with a list of the wrong length.
    #[error("wrong validator count: got {actual}, expected {expected}")]
    WrongValidatorCount {
        /// Current validator count.
        expected: u64,
        /// Offered validator count.
        actual: u64,
    },

    /// ReshareValidators entry whose key differs from the existing one.
    #[error("validator public key mismatch at index {index}")]
    ValidatorKeyMismatch {
        /// Position in the validator list.
        index: usize,
    },

    /// ParticipationProof whose epoch range intersects an accepted one.
    #[error(
        "participation proof [{start_epoch}, {end_epoch}] overlaps accepted \
         proof [{prev_start_epoch}, {prev_end_epoch}]"
    )]
    OverlappingEpochs {
        /// Offered range start.
        start_epoch: u64,
        /// Offered range end.
        end_epoch: u64,
        /// Accepted range start.
        prev_start_epoch: u64,
        /// Accepted range end.
        prev_end_epoch: u64,
    },

    /// ParticipationProof naming a validator the cluster does not have.
    #[error("unknown validator in participation proof: {0}")]
    UnknownValidator(PublicKey),

    /// ParticipationProof missing a count for an operator.
    #[error("missing count for operator {operator} (validator {validator}, duty {duty:?})")]
    MissingOperatorCount {
        /// The validator whose duty map is incomplete.
        validator: PublicKey,
        /// The duty with the incomplete operator map.
        duty: DutyType,
        /// The operator with no count entry.
        operator: PublicKey,
    },
}

/// A structurally valid mutation fails the approval gate.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// An approval-requiring mutation extends a hash outside the leader's
    /// approved chain.
    #[error("parent mutation not in longest approved chain: {0}")]
    ParentNotInApprovedChain(Hash),

    /// Two parents of an approval-requiring mutation share a source.
    #[error("duplicate parent source: {0}")]
    DuplicateParentSource(PublicKey),
}

/// The DAG as a whole cannot be materialised.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// Nothing to resolve.
    #[error("empty dag")]
    EmptyDag,

    /// No parentless root mutation exists.
    #[error("dag has no root")]
    MissingRoot,

    /// Some mutations are unreachable from the root.
    #[error("dag is disconnected")]
    Disconnected,

    /// A referenced mutation is not in the store.
    #[error("mutation not found: {0}")]
    MissingMutation(Hash),

    /// A leaf's sequence does not begin with CreateCluster.
    #[error("first mutation of sequence must be create_cluster, got {0}")]
    RootNotCreateCluster(Hash),

    /// A transform rejected a mutation mid-fold.
    #[error("transform failed for {hash}: {source}")]
    Transform {
        /// The mutation that failed to apply.
        hash: Hash,
        /// The violated invariant.
        #[source]
        source: InvariantError,
    },
}

/// Hash-integrity or signature failure from the crypto seam.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The stored hash does not match the mutation's content.
    #[error("mutation hash does not match content: {0}")]
    HashMismatch(Hash),

    /// The source key cannot be interpreted by the verifier.
    #[error("malformed public key")]
    MalformedKey,

    /// The signature bytes cannot be interpreted by the verifier.
    #[error("malformed signature")]
    MalformedSignature,

    /// The signature does not verify against the source key.
    #[error("signature verification failed")]
    SignatureVerification,
}

/// Any reason a mutation may be refused admission to the DAG.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The mutation is malformed or does not fit the DAG.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// Applying the mutation would violate a cluster invariant.
    #[error(transparent)]
    Invariant(#[from] InvariantError),

    /// The mutation fails the approval gate.
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// The DAG itself could not be resolved to check the mutation.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Hash or signature verification failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
