//! Admission tests: structural rules, approval-chain membership, crypto
//! integrity, and invariant checking at the gate.

use std::collections::BTreeMap;

use keel_types::{Hash, ParticipationProof, PublicKey};

use super::{create_payload, enr_payload, signed, test_signer, test_validator};
use crate::admission::validate;
use crate::error::{
    AdmissionError, ApprovalError, CryptoError, InvariantError, StructuralError,
};
use crate::mutation::{
    AddValidators, CreateCluster, GenerateValidators, Mutation, Payload, SignedMutation,
};
use crate::resolve::{resolve, select_head};
use crate::signer::{Ed25519Signer, Ed25519Verifier, Signer};
use crate::store::DagStore;

fn signers() -> [Ed25519Signer; 3] {
    [test_signer(1), test_signer(2), test_signer(3)]
}

fn operator_keys() -> Vec<PublicKey> {
    signers().iter().map(|s| s.public_key()).collect()
}

/// Validate against the default verifier and append on success.
fn admit(store: &mut DagStore, sm: SignedMutation) {
    validate(store, &sm, &Ed25519Verifier).unwrap();
    store.append(sm);
}

/// Admit a root and a full ENR chain signed by the three operators.
/// Returns the store and the hashes of root and enr1..enr3.
fn admitted_chain(num_validators: u64) -> (DagStore, [Hash; 4]) {
    let mut store = DagStore::new();
    let [s1, s2, s3] = signers();

    let root = signed(
        create_payload("alpha", operator_keys(), num_validators),
        vec![],
        &s1,
        1,
    );
    let root_hash = root.hash;
    admit(&mut store, root);

    let mut hashes = [root_hash; 4];
    let mut parent = root_hash;
    for (i, signer) in [&s1, &s2, &s3].into_iter().enumerate() {
        let enr = signed(
            enr_payload(&format!("enr:-{i}")),
            vec![parent],
            signer,
            2 + i as u64,
        );
        parent = enr.hash;
        hashes[i + 1] = parent;
        admit(&mut store, enr);
    }

    (store, hashes)
}

#[test]
fn first_mutation_must_create_the_cluster() {
    let store = DagStore::new();
    let sm = signed(enr_payload("enr:-a"), vec![], &test_signer(1), 1);

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::FirstMutationMustCreate)
    ));
}

#[test]
fn root_may_not_declare_parents() {
    let store = DagStore::new();
    let sm = signed(
        create_payload("alpha", operator_keys(), 1),
        vec![Hash::from([7u8; 32])],
        &test_signer(1),
        1,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::MissingParent(_))
    ));
}

#[test]
fn root_invariants_are_checked_at_admission() {
    let store = DagStore::new();
    let sm = signed(create_payload("", operator_keys(), 1), vec![], &test_signer(1), 1);

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Invariant(InvariantError::EmptyName)
    ));
}

#[test]
fn a_second_parentless_mutation_is_rejected() {
    let (store, _) = admitted_chain(1);
    let sm = signed(
        Payload::ParticipationProof(ParticipationProof {
            start_epoch: 1,
            end_epoch: 2,
            validators: BTreeMap::new(),
        }),
        vec![],
        &test_signer(1),
        10,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::MissingParents)
    ));
}

/// GenerateValidators may only extend an ack or an ENR, never the root.
#[test]
fn s6_generate_validators_cannot_extend_create_cluster() {
    let (store, [root, ..]) = admitted_chain(1);
    let sm = signed(
        Payload::GenerateValidators(GenerateValidators {
            validators: vec![test_validator(1, 3)],
        }),
        vec![root],
        &test_signer(1),
        10,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::ParentTypeNotAllowed { .. })
    ));
}

#[test]
fn unknown_parents_are_rejected() {
    let (store, _) = admitted_chain(1);
    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 1 }),
        vec![Hash::from([7u8; 32])],
        &test_signer(1),
        10,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::MissingParent(_))
    ));
}

#[test]
fn duplicate_parent_hashes_are_rejected() {
    let (store, [.., enr3]) = admitted_chain(1);
    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 1 }),
        vec![enr3, enr3],
        &test_signer(1),
        10,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::DuplicateParent(_))
    ));
}

#[test]
fn a_parent_sharing_type_and_source_is_rejected() {
    let (store, [_, enr1, ..]) = admitted_chain(1);
    // enr1 was signed by operator 1; another ENR by the same operator
    // extending it duplicates the (type, source) pair.
    let sm = signed(enr_payload("enr:-again"), vec![enr1], &test_signer(1), 10);

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::DuplicateParentPair { .. })
    ));
}

#[test]
fn unapproved_mutations_take_a_single_parent() {
    let (store, [root, enr1, ..]) = admitted_chain(1);
    let sm = signed(enr_payload("enr:-multi"), vec![root, enr1], &test_signer(2), 10);

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::MultipleParentsForUnapproved)
    ));
}

#[test]
fn gated_mutations_may_extend_only_the_leader_chain() {
    let (mut store, [_, enr1, _, _]) = admitted_chain(1);
    // A competing ENR by operator 3 directly off enr1 forks the DAG; the
    // shorter fork branch loses leader selection on height.
    let [_, _, s3] = signers();
    let fork = signed(enr_payload("enr:-fork"), vec![enr1], &s3, 20);
    admit(&mut store, fork);

    let heads = resolve(&store).unwrap();
    assert_eq!(heads.len(), 2);
    let leader = select_head(&heads).unwrap();
    let minority_head = heads
        .iter()
        .map(|h| h.head)
        .find(|h| *h != leader.head)
        .unwrap();

    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 1 }),
        vec![minority_head],
        &test_signer(1),
        21,
    );
    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Approval(ApprovalError::ParentNotInApprovedChain(_))
    ));
}

#[test]
fn gated_mutations_need_distinct_parent_sources() {
    let (mut store, [_, _, enr2, enr3]) = admitted_chain(1);
    let [s1, s2, s3] = signers();

    // Quorum-approve an AddValidators so acks exist in the leader chain.
    let add = signed(
        Payload::AddValidators(AddValidators { num_validators: 1 }),
        vec![enr3],
        &s1,
        30,
    );
    let add_hash = add.hash;
    admit(&mut store, add);
    let ack_2 = signed(Payload::OperatorAck, vec![add_hash], &s2, 31);
    let ack_3 = signed(Payload::OperatorAck, vec![add_hash], &s3, 32);
    admit(&mut store, ack_2.clone());
    admit(&mut store, ack_3.clone());

    // The leader head carries exactly one of the sibling acks; pair it
    // with the ENR published by the same operator.
    let leader = select_head(&resolve(&store).unwrap()).unwrap().clone();
    let (ack, enr) = if leader.cluster.contains(&ack_2.hash) {
        (ack_2.hash, enr2)
    } else {
        (ack_3.hash, enr3)
    };

    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 2 }),
        vec![ack, enr],
        &s1,
        33,
    );
    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Approval(ApprovalError::DuplicateParentSource(_))
    ));
}

#[test]
fn gated_mutation_with_distinct_sources_is_admitted() {
    let (store, [_, _, enr2, enr3]) = admitted_chain(1);
    // Parents from two different operators, both in the leader chain.
    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 1 }),
        vec![enr2, enr3],
        &test_signer(1),
        30,
    );

    assert!(validate(&store, &sm, &Ed25519Verifier).is_ok());
}

/// An overlapping participation proof is refused at the gate.
#[test]
fn s5_overlapping_proof_is_rejected_at_admission() {
    let (mut store, [.., enr3]) = admitted_chain(1);
    let [s1, s2, _] = signers();

    let first = signed(
        Payload::ParticipationProof(ParticipationProof {
            start_epoch: 100,
            end_epoch: 200,
            validators: BTreeMap::new(),
        }),
        vec![enr3],
        &s1,
        40,
    );
    let first_hash = first.hash;
    admit(&mut store, first);

    let second = signed(
        Payload::ParticipationProof(ParticipationProof {
            start_epoch: 150,
            end_epoch: 250,
            validators: BTreeMap::new(),
        }),
        vec![first_hash],
        &s2,
        41,
    );
    let err = validate(&store, &second, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Invariant(InvariantError::OverlappingEpochs { .. })
    ));
}

#[test]
fn tampered_hashes_are_rejected() {
    let (store, [.., enr3]) = admitted_chain(1);
    let mut sm = signed(enr_payload("enr:-x"), vec![enr3], &test_signer(2), 50);
    sm.hash = Hash::from([0xaa; 32]);

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Crypto(CryptoError::HashMismatch(_))
    ));
}

#[test]
fn signatures_from_the_wrong_key_are_rejected() {
    let (store, [.., enr3]) = admitted_chain(1);

    // Claim operator 2 as source but sign with operator 3's key.
    let mutation = Mutation::new(vec![enr3], enr_payload("enr:-x"), 50);
    let forged = SignedMutation {
        hash: mutation.compute_hash(),
        signature: test_signer(3).sign(&mutation.compute_hash()).unwrap(),
        source: test_signer(2).public_key(),
        mutation,
    };

    let err = validate(&store, &forged, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Crypto(CryptoError::SignatureVerification)
    ));
}

/// A gated mutation that is not yet approved is admissible; its
/// transform simply has not run yet.
#[test]
fn unapproved_gated_mutations_are_admissible() {
    let (store, [.., enr3]) = admitted_chain(1);
    let sm = signed(
        Payload::AddValidators(AddValidators { num_validators: 2 }),
        vec![enr3],
        &test_signer(1),
        60,
    );

    assert!(validate(&store, &sm, &Ed25519Verifier).is_ok());
}

#[test]
fn create_cluster_cannot_recur_mid_dag() {
    let (store, [.., enr3]) = admitted_chain(1);
    let sm = signed(
        Payload::CreateCluster(CreateCluster {
            name: "beta".to_string(),
            operators: operator_keys(),
            num_validators: 1,
            withdrawal_address: "0xw".to_string(),
        }),
        vec![enr3],
        &test_signer(1),
        70,
    );

    let err = validate(&store, &sm, &Ed25519Verifier).unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Structural(StructuralError::ParentTypeNotAllowed { .. })
    ));
}
