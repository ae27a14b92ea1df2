//! Type registry: per-type approval class, allowed parents, and transform.
//!
//! The transform is the only place a mutation's semantic effect on the
//! cluster is expressed. Transforms validate their pre-conditions against
//! the current cluster and return a fresh state; they never mutate their
//! input. The engine wrapper [`apply_mutation`] — not the transform —
//! increments `height` and records the hash; transforms bump
//! `approved_mutations` exactly when their type requires approval.

use keel_types::{Operator, ParticipationProof, PublicKey};

use crate::cluster::Cluster;
use crate::error::InvariantError;
use crate::mutation::{
    AddValidators, ChangeOperators, CreateCluster, GenerateValidators, MutationType, OperatorEnr,
    Payload, ReshareValidators, SignedMutation,
};

/// How many operators must build on a mutation before it takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approvals {
    /// Self-approving; applied as soon as it is reached in a sequence.
    None,
    /// At least ⌈2·|operators|/3⌉ operators.
    Quorum,
    /// Every operator.
    All,
}

impl MutationType {
    /// The approval class gating this type.
    pub fn approvals(self) -> Approvals {
        match self {
            MutationType::CreateCluster
            | MutationType::OperatorEnr
            | MutationType::OperatorAck
            | MutationType::ParticipationProof => Approvals::None,
            MutationType::AddValidators | MutationType::ChangeOperators => Approvals::Quorum,
            MutationType::GenerateValidators | MutationType::ReshareValidators => Approvals::All,
        }
    }

    /// The parent types a mutation of this type may extend.
    pub fn allowed_parents(self) -> &'static [MutationType] {
        match self {
            MutationType::CreateCluster => &[],
            MutationType::OperatorEnr => {
                &[MutationType::CreateCluster, MutationType::OperatorEnr]
            }
            MutationType::GenerateValidators
            | MutationType::AddValidators
            | MutationType::ChangeOperators
            | MutationType::ReshareValidators => {
                &[MutationType::OperatorAck, MutationType::OperatorEnr]
            }
            MutationType::OperatorAck => &[
                MutationType::AddValidators,
                MutationType::GenerateValidators,
                MutationType::ReshareValidators,
            ],
            MutationType::ParticipationProof => &[
                MutationType::ParticipationProof,
                MutationType::OperatorAck,
                MutationType::OperatorEnr,
            ],
        }
    }
}

/// Apply a mutation's transform to the cluster, returning the new state.
///
/// Dispatches on the payload variant, then performs the engine-side
/// bookkeeping shared by every type: bump `height` and record the hash.
pub fn apply_mutation(
    signed: &SignedMutation,
    cluster: &Cluster,
) -> Result<Cluster, InvariantError> {
    let next = cluster.clone();
    let mut next = match &signed.mutation.payload {
        Payload::CreateCluster(p) => create_cluster(p, next)?,
        Payload::OperatorEnr(p) => operator_enr(&signed.source, p, next)?,
        Payload::GenerateValidators(p) => generate_validators(p, next)?,
        Payload::AddValidators(p) => add_validators(p, next)?,
        Payload::OperatorAck => next,
        Payload::ChangeOperators(p) => change_operators(p, next)?,
        Payload::ReshareValidators(p) => reshare_validators(p, next)?,
        Payload::ParticipationProof(p) => participation_proof(p, next)?,
    };

    next.height += 1;
    next.hashes.insert(signed.hash, signed.clone());

    Ok(next)
}

fn create_cluster(payload: &CreateCluster, cluster: Cluster) -> Result<Cluster, InvariantError> {
    if payload.name.is_empty() {
        return Err(InvariantError::EmptyName);
    }
    if payload.operators.is_empty() {
        return Err(InvariantError::NoOperators);
    }
    if !cluster.is_empty() {
        return Err(InvariantError::ClusterNotEmpty);
    }

    let operators = payload
        .operators
        .iter()
        .cloned()
        .map(Operator::new)
        .collect();

    Ok(Cluster {
        approved_mutations: 1,
        name: payload.name.clone(),
        operators,
        num_validators: payload.num_validators,
        withdrawal_address: payload.withdrawal_address.clone(),
        ..cluster
    })
}

fn operator_enr(
    source: &PublicKey,
    payload: &OperatorEnr,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    let operator = cluster
        .operators
        .iter_mut()
        .find(|op| &op.public_key == source)
        .ok_or_else(|| InvariantError::OperatorNotFound(source.clone()))?;

    if operator.has_enr() {
        return Err(InvariantError::EnrAlreadySet(source.clone()));
    }
    operator.enr = payload.enr.clone();

    Ok(cluster)
}

fn generate_validators(
    payload: &GenerateValidators,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    let missing = cluster
        .num_validators
        .saturating_sub(cluster.validators.len() as u64);
    if missing == 0 {
        return Err(InvariantError::NoValidatorsMissing);
    }
    if payload.validators.len() as u64 > missing {
        return Err(InvariantError::TooManyValidators {
            offered: payload.validators.len() as u64,
            missing,
        });
    }
    for validator in &payload.validators {
        if validator.public_shares.len() != cluster.operators.len() {
            return Err(InvariantError::WrongShareCount {
                validator: validator.public_key.clone(),
                expected: cluster.operators.len() as u64,
                actual: validator.public_shares.len() as u64,
            });
        }
    }

    cluster.validators.extend(payload.validators.iter().cloned());
    cluster.approved_mutations += 1;

    Ok(cluster)
}

fn add_validators(
    payload: &AddValidators,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    cluster.num_validators += payload.num_validators;
    cluster.approved_mutations += 1;

    Ok(cluster)
}

fn change_operators(
    payload: &ChangeOperators,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    if payload.new_operators.len() != cluster.operators.len() {
        return Err(InvariantError::WrongOperatorCount {
            expected: cluster.operators.len() as u64,
            actual: payload.new_operators.len() as u64,
        });
    }

    // Replacement, not an in-place update: new entries start without ENRs.
    cluster.operators = payload
        .new_operators
        .iter()
        .cloned()
        .map(Operator::new)
        .collect();
    cluster.approved_mutations += 1;

    Ok(cluster)
}

fn reshare_validators(
    payload: &ReshareValidators,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    for operator in &cluster.operators {
        if !operator.has_enr() {
            return Err(InvariantError::MissingEnr(operator.public_key.clone()));
        }
    }
    if payload.new_validators.len() != cluster.validators.len() {
        return Err(InvariantError::WrongValidatorCount {
            expected: cluster.validators.len() as u64,
            actual: payload.new_validators.len() as u64,
        });
    }
    for (index, (new, old)) in payload
        .new_validators
        .iter()
        .zip(&cluster.validators)
        .enumerate()
    {
        if new.public_shares.len() != cluster.operators.len() {
            return Err(InvariantError::WrongShareCount {
                validator: new.public_key.clone(),
                expected: cluster.operators.len() as u64,
                actual: new.public_shares.len() as u64,
            });
        }
        if new.public_key != old.public_key {
            return Err(InvariantError::ValidatorKeyMismatch { index });
        }
    }

    cluster.validators = payload.new_validators.clone();
    cluster.approved_mutations += 1;

    Ok(cluster)
}

fn participation_proof(
    payload: &ParticipationProof,
    mut cluster: Cluster,
) -> Result<Cluster, InvariantError> {
    for prev in &cluster.participation_proofs {
        if payload.overlaps(prev) {
            return Err(InvariantError::OverlappingEpochs {
                start_epoch: payload.start_epoch,
                end_epoch: payload.end_epoch,
                prev_start_epoch: prev.start_epoch,
                prev_end_epoch: prev.end_epoch,
            });
        }
    }

    for (validator_key, duties) in &payload.validators {
        if !cluster
            .validators
            .iter()
            .any(|v| &v.public_key == validator_key)
        {
            return Err(InvariantError::UnknownValidator(validator_key.clone()));
        }
        for (duty, counts) in duties {
            for operator in &cluster.operators {
                if !counts.contains_key(&operator.public_key) {
                    return Err(InvariantError::MissingOperatorCount {
                        validator: validator_key.clone(),
                        duty: *duty,
                        operator: operator.public_key.clone(),
                    });
                }
            }
        }
    }

    cluster.participation_proofs.push(payload.clone());

    Ok(cluster)
}
