//! The materialised cluster state folded from a DAG sequence.

use std::collections::BTreeMap;

use keel_types::{Hash, Operator, ParticipationProof, PublicKey, Validator};

use crate::mutation::SignedMutation;

/// The cluster state at some point in the DAG.
///
/// Never stored persistently — always re-derived by folding a leaf's
/// sequence through the per-type transforms. Plain value type: every
/// transform receives a clone and historic resolutions stay stable as the
/// DAG grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cluster {
    /// Mutations applied on the selected path.
    pub height: u64,
    /// Applied mutations that required (and obtained) approval.
    /// CreateCluster counts itself as the first.
    pub approved_mutations: u64,
    /// Every mutation contributing to this state, by hash.
    pub hashes: BTreeMap<Hash, SignedMutation>,

    /// Human-readable cluster name.
    pub name: String,
    /// The operator set, in founding (or replacement) order.
    pub operators: Vec<Operator>,
    /// Target number of validators.
    pub num_validators: u64,
    /// Withdrawal address for all validators.
    pub withdrawal_address: String,
    /// Validators generated so far, each with one share per operator.
    pub validators: Vec<Validator>,
    /// Accepted participation proofs; epoch ranges never overlap.
    pub participation_proofs: Vec<ParticipationProof>,
}

impl Cluster {
    /// Whether this is the pristine pre-creation state: every scalar zero,
    /// every list empty.
    pub fn is_empty(&self) -> bool {
        self.height == 0
            && self.approved_mutations == 0
            && self.hashes.is_empty()
            && self.name.is_empty()
            && self.operators.is_empty()
            && self.num_validators == 0
            && self.withdrawal_address.is_empty()
            && self.validators.is_empty()
            && self.participation_proofs.is_empty()
    }

    /// Whether the mutation with the given hash contributed to this state.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.hashes.contains_key(hash)
    }

    /// The operator with the given key, if any.
    pub fn operator(&self, key: &PublicKey) -> Option<&Operator> {
        self.operators.iter().find(|op| &op.public_key == key)
    }

    /// The approval quorum: ⌈2·|operators|/3⌉.
    pub fn quorum(&self) -> usize {
        (2 * self.operators.len()).div_ceil(3)
    }
}
