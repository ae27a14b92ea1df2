//! Materialisation: fold each leaf's sequence into a cluster state,
//! gating every mutation on its approval class.

use std::collections::{BTreeSet, VecDeque};

use keel_types::{Hash, PublicKey};
use tracing::debug;

use crate::cluster::Cluster;
use crate::error::ResolutionError;
use crate::mutation::MutationType;
use crate::registry::{apply_mutation, Approvals};
use crate::store::DagStore;

/// The cluster state materialised at one DAG leaf.
#[derive(Debug, Clone)]
pub struct ResolvedHead {
    /// The leaf this state was folded towards.
    pub head: Hash,
    /// The folded state. Partial if `blocked_at` is set.
    pub cluster: Cluster,
    /// The first mutation in the sequence that lacked the approvals its
    /// type requires. Folding stopped there; the mutation and everything
    /// after it are not reflected in `cluster`.
    pub blocked_at: Option<Hash>,
}

/// Materialise the cluster state at every leaf of the DAG.
///
/// Forks are a normal condition: each leaf yields its own candidate
/// state, in ascending leaf-hash order. Callers pick one with
/// [`select_head`]. An insufficiently approved mutation stops the fold
/// for its leaf (recorded in [`ResolvedHead::blocked_at`]); a mutation
/// that violates a cluster invariant fails resolution outright.
pub fn resolve(store: &DagStore) -> Result<Vec<ResolvedHead>, ResolutionError> {
    if store.is_empty() {
        return Err(ResolutionError::EmptyDag);
    }

    let mut heads = Vec::new();
    for leaf in store.leaves() {
        let sequence = store.sequence(&leaf)?;

        let first = sequence
            .first()
            .ok_or(ResolutionError::MissingMutation(leaf))?;
        if first.mutation_type() != MutationType::CreateCluster {
            return Err(ResolutionError::RootNotCreateCluster(first.hash));
        }

        let mut cluster = Cluster::default();
        let mut blocked_at = None;
        for signed in &sequence {
            let approvers = approved_by(store, &signed.hash);
            if !approved(signed.mutation_type().approvals(), &approvers, &cluster) {
                blocked_at = Some(signed.hash);
                break;
            }

            cluster = apply_mutation(signed, &cluster).map_err(|source| {
                ResolutionError::Transform {
                    hash: signed.hash,
                    source,
                }
            })?;
        }

        debug!(
            head = %leaf,
            height = cluster.height,
            approved = cluster.approved_mutations,
            blocked = blocked_at.is_some(),
            "resolved head"
        );
        heads.push(ResolvedHead {
            head: leaf,
            cluster,
            blocked_at,
        });
    }

    Ok(heads)
}

/// The sources of all transitive descendants of `hash`.
///
/// An operator approves a mutation by building on it: producing any
/// descendant, directly or through others' mutations.
pub fn approved_by(store: &DagStore, hash: &Hash) -> BTreeSet<PublicKey> {
    let mut approvers = BTreeSet::new();
    let mut visited = BTreeSet::from([*hash]);
    let mut queue: VecDeque<Hash> = VecDeque::from([*hash]);

    while let Some(current) = queue.pop_front() {
        for child in store.children(&current) {
            if visited.insert(child.hash) {
                approvers.insert(child.source.clone());
                queue.push_back(child.hash);
            }
        }
    }

    approvers
}

/// Whether `approvers` satisfies the approval class against the cluster's
/// operator set. Only operators count.
pub fn approved(require: Approvals, approvers: &BTreeSet<PublicKey>, cluster: &Cluster) -> bool {
    match require {
        Approvals::None => true,
        Approvals::Quorum | Approvals::All => {
            let count = cluster
                .operators
                .iter()
                .filter(|op| approvers.contains(&op.public_key))
                .count();

            match require {
                Approvals::Quorum => count >= cluster.quorum(),
                _ => count == cluster.operators.len(),
            }
        }
    }
}

/// Pick the leader among resolved heads: greatest `approved_mutations`,
/// then greatest `height`, then least head hash. Ties never remain.
pub fn select_head(heads: &[ResolvedHead]) -> Option<&ResolvedHead> {
    heads.iter().max_by(|a, b| {
        a.cluster
            .approved_mutations
            .cmp(&b.cluster.approved_mutations)
            .then(a.cluster.height.cmp(&b.cluster.height))
            .then_with(|| b.head.cmp(&a.head))
    })
}
