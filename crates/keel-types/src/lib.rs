//! Shared types and identifiers for keel.
//!
//! This crate defines the core types used across the keel workspace:
//! the content-address [`Hash`], the opaque [`PublicKey`] identity, and the
//! cluster-domain types ([`Operator`], [`Validator`], [`DutyType`],
//! [`ParticipationProof`]) that the state engine folds mutations into.
//!
//! Everything here is a plain value type. Determinism matters more than
//! speed at this scale, so every map is a `BTreeMap` (keys serialise in
//! sorted byte order) and [`Hash`] ordering is byte-wise.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// Content address of a mutation: `sha256(canonical_bytes)`.
///
/// Two mutations are the same mutation iff their hashes are equal. The
/// `Ord` impl (byte-wise) is the sole tiebreaker wherever the engine needs
/// a deterministic order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Hash arbitrary data with SHA-256.
    pub fn from_data(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Opaque public key identifying an operator, a node, or a validator.
///
/// The engine never interprets the bytes; only the signer/verifier seam
/// assigns them meaning (the default ed25519 implementation expects a
/// 32-byte verifying key).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for PublicKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

// ---------------------------------------------------------------------------
// Cluster-domain types
// ---------------------------------------------------------------------------

/// A validator duty whose participation is tracked per operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DutyType {
    /// Attestation duty, once per epoch per validator.
    Attester,
    /// Block proposal duty.
    Proposer,
    /// Attestation aggregation duty.
    Aggregator,
}

/// A cluster operator: a human or organisation running one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// The operator's identity key.
    pub public_key: PublicKey,
    /// Ethereum Node Record endorsing the operator's node.
    /// Empty until the operator publishes one.
    pub enr: String,
}

impl Operator {
    /// Create an operator that has not yet published an ENR.
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            enr: String::new(),
        }
    }

    /// Whether the operator has published an ENR.
    pub fn has_enr(&self) -> bool {
        !self.enr.is_empty()
    }
}

/// A distributed validator whose signing power is split across the
/// operators via key shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// The validator's group public key.
    pub public_key: PublicKey,
    /// One public key share per operator, in operator order.
    pub public_shares: Vec<PublicKey>,
}

/// Participation counts per validator, duty, and operator.
pub type ParticipationCounts = BTreeMap<PublicKey, BTreeMap<DutyType, BTreeMap<PublicKey, u64>>>;

/// Proof of operator participation over an inclusive epoch range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationProof {
    /// First epoch covered (inclusive).
    pub start_epoch: u64,
    /// Last epoch covered (inclusive).
    pub end_epoch: u64,
    /// validator → duty → operator → count.
    pub validators: ParticipationCounts,
}

impl ParticipationProof {
    /// Whether the two inclusive epoch ranges intersect.
    pub fn overlaps(&self, other: &ParticipationProof) -> bool {
        self.start_epoch <= other.end_epoch && other.start_epoch <= self.end_epoch
    }
}
