//! Mutation model: DAG vertices, typed payloads, and the signed envelope.
//!
//! A [`Mutation`] is a vertex of the cluster DAG: an ordered set of parent
//! hashes, a typed payload, and a timestamp. A [`SignedMutation`] adds the
//! content address and the source's signature over it.
//!
//! On the wire a mutation travels as an envelope carrying the full
//! versioned type tag (e.g. `keel/create_cluster/1.0.0`) and the payload
//! as opaque bytes; decoding looks the tag up in the registry and rejects
//! unknown tags. The canonical byte form is postcard with struct fields in
//! declaration order and every map a `BTreeMap`, so the hash is
//! reproducible on any platform.

use std::fmt;

use keel_types::{Hash, ParticipationProof, PublicKey, Validator};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, StructuralError};
use crate::signer::{Signer, Verifier};

// ---------------------------------------------------------------------------
// Mutation types
// ---------------------------------------------------------------------------

/// The closed set of mutation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MutationType {
    /// Found a cluster: the root of every DAG.
    CreateCluster,
    /// An operator publishes its node's ENR.
    OperatorEnr,
    /// The DKG output: a batch of validators with per-operator shares.
    GenerateValidators,
    /// Raise the validator target.
    AddValidators,
    /// An operator acknowledges a preceding state-changing mutation.
    OperatorAck,
    /// Replace the operator set.
    ChangeOperators,
    /// Replace every validator's shares after a reshare ceremony.
    ReshareValidators,
    /// Record operator participation over an epoch range.
    ParticipationProof,
}

impl MutationType {
    /// All mutation types, in declaration order.
    pub const ALL: [MutationType; 8] = [
        MutationType::CreateCluster,
        MutationType::OperatorEnr,
        MutationType::GenerateValidators,
        MutationType::AddValidators,
        MutationType::OperatorAck,
        MutationType::ChangeOperators,
        MutationType::ReshareValidators,
        MutationType::ParticipationProof,
    ];

    /// The versioned wire tag for this type.
    pub fn tag(self) -> &'static str {
        match self {
            MutationType::CreateCluster => "keel/create_cluster/1.0.0",
            MutationType::OperatorEnr => "keel/operator_enr/1.0.0",
            MutationType::GenerateValidators => "keel/generate_validators/1.0.0",
            MutationType::AddValidators => "keel/add_validators/1.0.0",
            MutationType::OperatorAck => "keel/operator_ack/1.0.0",
            MutationType::ChangeOperators => "keel/change_operators/1.0.0",
            MutationType::ReshareValidators => "keel/reshare_validators/1.0.0",
            MutationType::ParticipationProof => "keel/participation_proof/1.0.0",
        }
    }

    /// Look a wire tag up in the registry. Unknown tags are rejected.
    pub fn from_tag(tag: &str) -> Result<Self, StructuralError> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| StructuralError::UnknownType(tag.to_string()))
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of a [`MutationType::CreateCluster`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCluster {
    /// Human-readable cluster name.
    pub name: String,
    /// Identity keys of the founding operators.
    pub operators: Vec<PublicKey>,
    /// Target number of validators the cluster should run.
    pub num_validators: u64,
    /// Withdrawal address for all validators.
    pub withdrawal_address: String,
}

/// Payload of a [`MutationType::OperatorEnr`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorEnr {
    /// The Ethereum Node Record being published.
    pub enr: String,
}

/// Payload of a [`MutationType::GenerateValidators`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateValidators {
    /// The new validators, each with one share per operator.
    pub validators: Vec<Validator>,
}

/// Payload of a [`MutationType::AddValidators`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddValidators {
    /// How many validators to add to the target.
    pub num_validators: u64,
}

/// Payload of a [`MutationType::ChangeOperators`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOperators {
    /// Replacement operator keys, same length as the current set.
    pub new_operators: Vec<PublicKey>,
}

/// Payload of a [`MutationType::ReshareValidators`] mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshareValidators {
    /// Replacement validator entries: same keys, new shares.
    pub new_validators: Vec<Validator>,
}

/// A mutation's typed payload. The variant is determined by the type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// See [`CreateCluster`].
    CreateCluster(CreateCluster),
    /// See [`OperatorEnr`].
    OperatorEnr(OperatorEnr),
    /// See [`GenerateValidators`].
    GenerateValidators(GenerateValidators),
    /// See [`AddValidators`].
    AddValidators(AddValidators),
    /// Operator acknowledgement carries no data.
    OperatorAck,
    /// See [`ChangeOperators`].
    ChangeOperators(ChangeOperators),
    /// See [`ReshareValidators`].
    ReshareValidators(ReshareValidators),
    /// See [`keel_types::ParticipationProof`].
    ParticipationProof(ParticipationProof),
}

impl Payload {
    /// The mutation type this payload belongs to.
    pub fn mutation_type(&self) -> MutationType {
        match self {
            Payload::CreateCluster(_) => MutationType::CreateCluster,
            Payload::OperatorEnr(_) => MutationType::OperatorEnr,
            Payload::GenerateValidators(_) => MutationType::GenerateValidators,
            Payload::AddValidators(_) => MutationType::AddValidators,
            Payload::OperatorAck => MutationType::OperatorAck,
            Payload::ChangeOperators(_) => MutationType::ChangeOperators,
            Payload::ReshareValidators(_) => MutationType::ReshareValidators,
            Payload::ParticipationProof(_) => MutationType::ParticipationProof,
        }
    }

    /// Canonical payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Payload::CreateCluster(p) => to_payload_bytes(p),
            Payload::OperatorEnr(p) => to_payload_bytes(p),
            Payload::GenerateValidators(p) => to_payload_bytes(p),
            Payload::AddValidators(p) => to_payload_bytes(p),
            Payload::OperatorAck => Vec::new(),
            Payload::ChangeOperators(p) => to_payload_bytes(p),
            Payload::ReshareValidators(p) => to_payload_bytes(p),
            Payload::ParticipationProof(p) => to_payload_bytes(p),
        }
    }

    /// Decode payload bytes against the schema the tag selects.
    pub fn decode(mutation_type: MutationType, bytes: &[u8]) -> Result<Self, StructuralError> {
        match mutation_type {
            MutationType::CreateCluster => {
                from_payload_bytes(mutation_type, bytes).map(Payload::CreateCluster)
            }
            MutationType::OperatorEnr => {
                from_payload_bytes(mutation_type, bytes).map(Payload::OperatorEnr)
            }
            MutationType::GenerateValidators => {
                from_payload_bytes(mutation_type, bytes).map(Payload::GenerateValidators)
            }
            MutationType::AddValidators => {
                from_payload_bytes(mutation_type, bytes).map(Payload::AddValidators)
            }
            MutationType::OperatorAck => {
                if bytes.is_empty() {
                    Ok(Payload::OperatorAck)
                } else {
                    Err(StructuralError::PayloadDecode {
                        mutation_type,
                        reason: "operator_ack carries no payload".to_string(),
                    })
                }
            }
            MutationType::ChangeOperators => {
                from_payload_bytes(mutation_type, bytes).map(Payload::ChangeOperators)
            }
            MutationType::ReshareValidators => {
                from_payload_bytes(mutation_type, bytes).map(Payload::ReshareValidators)
            }
            MutationType::ParticipationProof => {
                from_payload_bytes(mutation_type, bytes).map(Payload::ParticipationProof)
            }
        }
    }
}

fn to_payload_bytes<T: Serialize>(payload: &T) -> Vec<u8> {
    postcard::to_allocvec(payload).expect("serialization should not fail")
}

fn from_payload_bytes<T: for<'de> Deserialize<'de>>(
    mutation_type: MutationType,
    bytes: &[u8],
) -> Result<T, StructuralError> {
    postcard::from_bytes(bytes).map_err(|e| StructuralError::PayloadDecode {
        mutation_type,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// A vertex of the cluster DAG. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Hashes of the parent mutations (empty only for the root).
    pub parents: Vec<Hash>,
    /// The typed payload; determines the mutation type.
    pub payload: Payload,
    /// Caller-supplied creation time (unix seconds). Not interpreted by
    /// the engine; it only feeds the content hash.
    pub timestamp: u64,
}

/// Canonical wire form of a [`Mutation`].
///
/// The hash is computed over exactly these bytes, so the hash field and
/// the signature are excluded by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMutation {
    pub(crate) parents: Vec<Hash>,
    pub(crate) type_tag: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) timestamp: u64,
}

/// Canonical wire form of a [`SignedMutation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireSignedMutation {
    pub(crate) mutation: WireMutation,
    pub(crate) hash: Hash,
    pub(crate) source: PublicKey,
    pub(crate) signature: Vec<u8>,
}

impl Mutation {
    /// Create a mutation over the given parents.
    pub fn new(parents: Vec<Hash>, payload: Payload, timestamp: u64) -> Self {
        Self {
            parents,
            payload,
            timestamp,
        }
    }

    /// The mutation's type, derived from its payload.
    pub fn mutation_type(&self) -> MutationType {
        self.payload.mutation_type()
    }

    /// Content address: SHA-256 over the canonical wire form.
    pub fn compute_hash(&self) -> Hash {
        let bytes =
            postcard::to_allocvec(&self.to_wire()).expect("serialization should not fail");
        Hash::from_data(&bytes)
    }

    pub(crate) fn to_wire(&self) -> WireMutation {
        WireMutation {
            parents: self.parents.clone(),
            type_tag: self.mutation_type().tag().to_string(),
            payload: self.payload.encode(),
            timestamp: self.timestamp,
        }
    }

    pub(crate) fn from_wire(wire: WireMutation) -> Result<Self, StructuralError> {
        let mutation_type = MutationType::from_tag(&wire.type_tag)?;
        let payload = Payload::decode(mutation_type, &wire.payload)?;
        Ok(Self {
            parents: wire.parents,
            payload,
            timestamp: wire.timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// SignedMutation
// ---------------------------------------------------------------------------

/// A [`Mutation`] plus its content address, the public key of the source
/// that produced it, and the source's signature over the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMutation {
    /// The mutation itself.
    pub mutation: Mutation,
    /// SHA-256 of the mutation's canonical bytes.
    pub hash: Hash,
    /// Identity of the producer.
    pub source: PublicKey,
    /// Signature over `hash` by `source`.
    pub signature: Vec<u8>,
}

impl SignedMutation {
    /// Hash and sign a mutation with the given signer.
    pub fn new_signed(mutation: Mutation, signer: &dyn Signer) -> Result<Self, CryptoError> {
        let hash = mutation.compute_hash();
        let signature = signer.sign(&hash)?;
        Ok(Self {
            mutation,
            hash,
            source: signer.public_key(),
            signature,
        })
    }

    /// The mutation's type.
    pub fn mutation_type(&self) -> MutationType {
        self.mutation.mutation_type()
    }

    /// Whether the stored hash matches the mutation's content.
    pub fn verify_hash(&self) -> bool {
        self.mutation.compute_hash() == self.hash
    }

    /// Verify the signature over the hash against the source key.
    pub fn verify_signature(&self, verifier: &dyn Verifier) -> Result<(), CryptoError> {
        verifier.verify(&self.source, &self.hash, &self.signature)
    }

    /// Canonical wire bytes of the signed envelope.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let wire = WireSignedMutation {
            mutation: self.mutation.to_wire(),
            hash: self.hash,
            source: self.source.clone(),
            signature: self.signature.clone(),
        };
        postcard::to_allocvec(&wire).expect("serialization should not fail")
    }

    /// Decode a signed envelope. Rejects unknown type tags and payloads
    /// that do not match the tag's schema; hash and signature integrity
    /// are checked at admission, not here.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, StructuralError> {
        let wire: WireSignedMutation =
            postcard::from_bytes(bytes).map_err(|e| StructuralError::Envelope(e.to_string()))?;
        Self::from_wire(wire)
    }

    pub(crate) fn from_wire(wire: WireSignedMutation) -> Result<Self, StructuralError> {
        Ok(Self {
            mutation: Mutation::from_wire(wire.mutation)?,
            hash: wire.hash,
            source: wire.source,
            signature: wire.signature,
        })
    }
}
