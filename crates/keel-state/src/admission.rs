//! Admission: decide whether an offered mutation may extend the DAG.
//!
//! Admission never mutates the store; callers append on success. The
//! checks are structural (parent existence, parent types, duplication),
//! approval-chain membership for gated types, and hash/signature
//! integrity through the pluggable [`Verifier`].

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{
    AdmissionError, ApprovalError, CryptoError, ResolutionError, StructuralError,
};
use crate::mutation::{MutationType, SignedMutation};
use crate::registry::Approvals;
use crate::resolve::{resolve, select_head};
use crate::signer::Verifier;
use crate::store::DagStore;

/// Validate a newly offered mutation against the current DAG.
pub fn validate(
    store: &DagStore,
    signed: &SignedMutation,
    verifier: &dyn Verifier,
) -> Result<(), AdmissionError> {
    if !signed.verify_hash() {
        return Err(CryptoError::HashMismatch(signed.hash).into());
    }
    signed.verify_signature(verifier)?;

    let mutation_type = signed.mutation_type();

    // The first mutation founds the cluster; there is nothing to resolve
    // yet, so it is admitted on structural, crypto, and transform checks
    // alone.
    if store.is_empty() {
        if mutation_type != MutationType::CreateCluster {
            return Err(StructuralError::FirstMutationMustCreate.into());
        }
        if let Some(parent) = signed.mutation.parents.first() {
            return Err(StructuralError::MissingParent(*parent).into());
        }
        return check_fold(store, signed);
    }

    // Everything after the root must extend the existing DAG; a second
    // parentless mutation would disconnect the graph.
    if signed.mutation.parents.is_empty() {
        return Err(StructuralError::MissingParents.into());
    }

    let requires_approval = mutation_type.approvals() != Approvals::None;
    if !requires_approval && signed.mutation.parents.len() > 1 {
        return Err(StructuralError::MultipleParentsForUnapproved.into());
    }

    let heads = resolve(store)?;
    let leader = select_head(&heads).ok_or(ResolutionError::EmptyDag)?;

    let allowed = mutation_type.allowed_parents();
    let mut seen_hashes = BTreeSet::new();
    let mut seen_sources = BTreeSet::new();

    for parent_hash in &signed.mutation.parents {
        if !seen_hashes.insert(*parent_hash) {
            return Err(StructuralError::DuplicateParent(*parent_hash).into());
        }

        let parent = store
            .get(parent_hash)
            .ok_or(StructuralError::MissingParent(*parent_hash))?;

        let parent_type = parent.mutation_type();
        if !allowed.contains(&parent_type) {
            return Err(StructuralError::ParentTypeNotAllowed {
                parent: parent_type,
                child: mutation_type,
            }
            .into());
        }

        if parent_type == mutation_type && parent.source == signed.source {
            return Err(StructuralError::DuplicateParentPair {
                mutation_type,
                shared_source: signed.source.clone(),
            }
            .into());
        }

        if !requires_approval {
            continue;
        }

        // Gated mutations may only extend the longest approved chain, and
        // each parent must come from a distinct source.
        if !leader.cluster.contains(parent_hash) {
            warn!(
                parent = %parent_hash,
                leader = %leader.head,
                "rejecting mutation extending a non-leader chain"
            );
            return Err(ApprovalError::ParentNotInApprovedChain(*parent_hash).into());
        }
        if !seen_sources.insert(parent.source.clone()) {
            return Err(ApprovalError::DuplicateParentSource(parent.source.clone()).into());
        }
    }

    check_fold(store, signed)
}

/// Tentatively fold the DAG extended with the offered mutation, so a
/// mutation whose transform would violate a cluster invariant is refused
/// before it poisons the store.
///
/// A gated mutation that is not yet approved stops its fold before its
/// transform runs; its invariants are only checkable once approvals
/// arrive, which is inherent to the approval model.
fn check_fold(store: &DagStore, signed: &SignedMutation) -> Result<(), AdmissionError> {
    let mut extended = store.clone();
    extended.append(signed.clone());

    match resolve(&extended) {
        Ok(_) => Ok(()),
        Err(ResolutionError::Transform { hash, source }) if hash == signed.hash => {
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}
