//! Tests for the state engine.

mod admission_tests;

use keel_types::{Hash, PublicKey, Validator};

use crate::mutation::{CreateCluster, Mutation, OperatorEnr, Payload, SignedMutation};
use crate::signer::{Ed25519Signer, Signer};
use crate::store::DagStore;

/// Deterministic ed25519 signer from a seed byte.
fn test_signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::from_seed(&[seed; 32])
}

/// The public key of the seeded test signer.
fn test_key(seed: u8) -> PublicKey {
    test_signer(seed).public_key()
}

/// An opaque (non-ed25519) key for engine-level tests that bypass
/// signature verification.
fn opaque_key(name: &str) -> PublicKey {
    PublicKey::from(name.as_bytes())
}

/// Hash and sign a mutation.
fn signed(
    payload: Payload,
    parents: Vec<Hash>,
    signer: &Ed25519Signer,
    timestamp: u64,
) -> SignedMutation {
    SignedMutation::new_signed(Mutation::new(parents, payload, timestamp), signer).unwrap()
}

/// A hashed but unsigned mutation from an opaque source, for store and
/// resolver tests that never reach the verifier.
fn raw(payload: Payload, parents: Vec<Hash>, source: &str, timestamp: u64) -> SignedMutation {
    let mutation = Mutation::new(parents, payload, timestamp);
    let hash = mutation.compute_hash();
    SignedMutation {
        mutation,
        hash,
        source: opaque_key(source),
        signature: Vec::new(),
    }
}

/// CreateCluster payload over the given operator keys.
fn create_payload(name: &str, operators: Vec<PublicKey>, num_validators: u64) -> Payload {
    Payload::CreateCluster(CreateCluster {
        name: name.to_string(),
        operators,
        num_validators,
        withdrawal_address: "0xw".to_string(),
    })
}

/// OperatorEnr payload.
fn enr_payload(enr: &str) -> Payload {
    Payload::OperatorEnr(OperatorEnr {
        enr: enr.to_string(),
    })
}

/// A validator with distinct share keys.
fn test_validator(seed: u8, shares: usize) -> Validator {
    Validator {
        public_key: opaque_key(&format!("validator-{seed}")),
        public_shares: (0..shares)
            .map(|i| opaque_key(&format!("share-{seed}-{i}")))
            .collect(),
    }
}

/// Bootstrap a store with a cluster of three opaque operators `k1..k3`
/// and an ENR chain, the setup shared by most resolver scenarios.
///
/// Returns the store and the hashes of the root and the last ENR.
fn bootstrap_store(num_validators: u64) -> (DagStore, Hash, Hash) {
    let mut store = DagStore::new();

    let operators = vec![opaque_key("k1"), opaque_key("k2"), opaque_key("k3")];
    let root = raw(create_payload("alpha", operators, num_validators), vec![], "k1", 1);
    let root_hash = root.hash;
    store.append(root);

    let mut parent = root_hash;
    for (i, name) in ["k1", "k2", "k3"].iter().enumerate() {
        let enr = raw(
            enr_payload(&format!("enr:-{name}")),
            vec![parent],
            name,
            2 + i as u64,
        );
        parent = enr.hash;
        store.append(enr);
    }

    (store, root_hash, parent)
}
