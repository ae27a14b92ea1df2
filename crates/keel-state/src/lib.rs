//! Deterministic cluster-state engine over a content-addressed DAG of
//! signed mutations.
//!
//! A distributed-validator cluster — a small group of operators
//! cooperatively running validator duties — records every configuration
//! change as a signed [`Mutation`] referencing its parents by hash. From
//! that append-only DAG, any party can deterministically materialise the
//! current [`Cluster`] state without a central authority.
//!
//! The engine is a pure transformer: admission ([`admission::validate`]),
//! structural queries ([`DagStore`]), and materialisation ([`resolve`])
//! are synchronous computations over their inputs. Concurrent forks are a
//! normal condition; the resolver emits one candidate state per DAG leaf
//! and [`select_head`] picks the leader by a deterministic total order.
//!
//! [`ClusterLog`] wraps the pure core in the single-writer shell most
//! callers want: sign, admit, and append under one lock, resolve under a
//! read lock.

mod admission;
mod cluster;
mod error;
mod log;
mod mutation;
mod registry;
mod resolve;
mod signer;
mod store;

#[cfg(test)]
mod tests;

pub use admission::validate;
pub use cluster::Cluster;
pub use error::{
    AdmissionError, ApprovalError, CryptoError, InvariantError, ResolutionError, StructuralError,
};
pub use log::ClusterLog;
pub use mutation::{
    AddValidators, ChangeOperators, CreateCluster, GenerateValidators, Mutation, MutationType,
    OperatorEnr, Payload, ReshareValidators, SignedMutation,
};
pub use registry::{apply_mutation, Approvals};
pub use resolve::{approved, approved_by, resolve, select_head, ResolvedHead};
pub use signer::{Ed25519Signer, Ed25519Verifier, Signer, Verifier};
pub use store::DagStore;
