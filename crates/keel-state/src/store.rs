//! In-memory append-only store of signed mutations, with the structural
//! queries materialisation needs.
//!
//! The store owns its mutations; every query hands out borrows or fresh
//! lists. Scans are linear — fine at this scale (clusters mutate tens of
//! times, not millions) — and every order-sensitive result is sorted by
//! hash so that resolution is bit-for-bit reproducible.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use keel_types::Hash;

use crate::error::{ResolutionError, StructuralError};
use crate::mutation::SignedMutation;

/// Append-only set of signed mutations in admission order, indexed by hash.
#[derive(Debug, Clone, Default)]
pub struct DagStore {
    entries: Vec<SignedMutation>,
}

impl DagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an admitted mutation. The store never removes entries.
    pub fn append(&mut self, signed: SignedMutation) {
        self.entries.push(signed);
    }

    /// Number of stored mutations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no mutations.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the mutations in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &SignedMutation> {
        self.entries.iter()
    }

    /// The mutation with the given hash, if stored.
    pub fn get(&self, hash: &Hash) -> Option<&SignedMutation> {
        self.entries.iter().find(|e| &e.hash == hash)
    }

    /// Whether a mutation with the given hash is stored.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.get(hash).is_some()
    }

    /// All mutations listing `hash` as a parent, in ascending hash order.
    ///
    /// The hash order is the engine's sole determinism tiebreaker.
    pub fn children(&self, hash: &Hash) -> Vec<&SignedMutation> {
        let mut children: Vec<&SignedMutation> = self
            .entries
            .iter()
            .filter(|e| e.mutation.parents.contains(hash))
            .collect();
        children.sort_by_key(|e| e.hash);
        children
    }

    /// Hashes that are not a parent of any mutation, in ascending hash
    /// order. Each leaf is a candidate head of the cluster state.
    pub fn leaves(&self) -> Vec<Hash> {
        let parents: BTreeSet<&Hash> = self
            .entries
            .iter()
            .flat_map(|e| e.mutation.parents.iter())
            .collect();

        let mut leaves: Vec<Hash> = self
            .entries
            .iter()
            .map(|e| e.hash)
            .filter(|h| !parents.contains(h))
            .collect();
        leaves.sort();
        leaves
    }

    /// Height of every mutation: the root has height 1, every child is at
    /// least one above each of its parents.
    ///
    /// Walks breadth-first from the unique parentless root. Fails if the
    /// store is empty, has no root, or some mutation is unreachable from
    /// the root.
    pub fn heights(&self) -> Result<BTreeMap<Hash, u64>, ResolutionError> {
        if self.entries.is_empty() {
            return Err(ResolutionError::EmptyDag);
        }

        let root = self
            .entries
            .iter()
            .find(|e| e.mutation.parents.is_empty())
            .ok_or(ResolutionError::MissingRoot)?;

        let mut heights = BTreeMap::from([(root.hash, 1u64)]);
        let mut queue = VecDeque::from([root.hash]);

        while let Some(hash) = queue.pop_front() {
            let child_height = heights[&hash] + 1;
            for child in self.children(&hash) {
                let entry = heights.entry(child.hash).or_insert(0);
                if *entry < child_height {
                    *entry = child_height;
                    // Re-walk the child's subtree with the improved height.
                    queue.push_back(child.hash);
                }
            }
        }

        if heights.len() != self.entries.len() {
            return Err(ResolutionError::Disconnected);
        }

        Ok(heights)
    }

    /// A deterministic linear order of `head` and all its ancestors:
    /// height ascending, ties broken by hash ascending.
    ///
    /// The order respects the DAG's partial order (every parent precedes
    /// every child) and is stable under re-orderings of the store.
    pub fn sequence(&self, head: &Hash) -> Result<Vec<&SignedMutation>, ResolutionError> {
        let heights = self.heights()?;

        let mut sequence = Vec::new();
        let mut upstream = BTreeSet::from([*head]);
        let mut queue = VecDeque::from([*head]);

        while let Some(hash) = queue.pop_front() {
            let signed = self
                .get(&hash)
                .ok_or(ResolutionError::MissingMutation(hash))?;
            sequence.push(signed);

            for parent in &signed.mutation.parents {
                if upstream.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }

        sequence.sort_by_key(|e| (heights[&e.hash], e.hash));

        Ok(sequence)
    }

    /// Persistence layout: the concatenated canonical encoding of the
    /// signed mutations in admission order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.to_wire_bytes());
        }
        bytes
    }

    /// Decode a store persisted with [`DagStore::to_bytes`].
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, StructuralError> {
        let mut store = Self::new();
        while !bytes.is_empty() {
            let (wire, rest) = postcard::take_from_bytes(bytes)
                .map_err(|e| StructuralError::Envelope(e.to_string()))?;
            store.append(SignedMutation::from_wire(wire)?);
            bytes = rest;
        }
        Ok(store)
    }
}
