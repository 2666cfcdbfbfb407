//! Errors raised while compiling animation sets and ticking their states.

use crate::{
    node::{NodeMode, ParticleNodeID},
    register::{RegisterKind, RegisterSlot},
    state::LifecyclePhase,
};
use thiserror::Error;

/// A register pool of the given kind has no free slot left.
///
/// Raised by the [`RegisterAllocator`](crate::register::RegisterAllocator);
/// the compile pass wraps it into [`AnimationError::PoolExhausted`] with the
/// name of the node that made the request.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("All {limit} {kind} registers are in use")]
pub struct RegisterPoolExhausted {
    pub kind: RegisterKind,
    pub limit: u32,
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum AnimationError {
    #[error("Node `{node}` could not obtain a {kind} register (all {limit} are in use)")]
    PoolExhausted {
        node: ParticleNodeID,
        kind: RegisterKind,
        limit: u32,
    },

    #[error("A node named `{node}` already exists in the animation set")]
    DuplicateNode { node: ParticleNodeID },

    #[error("No node named `{node}` in the animation set")]
    UnknownNode { node: ParticleNodeID },

    #[error("No register recorded for slot `{slot}` of node `{node}`")]
    MissingRegister {
        node: ParticleNodeID,
        slot: RegisterSlot,
    },

    #[error("No vertex column assigned to per-particle node `{node}`")]
    MissingColumn { node: ParticleNodeID },

    #[error("{state} for node `{node}` cannot go from {from} to {to}")]
    IllegalTransition {
        node: ParticleNodeID,
        state: &'static str,
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    #[error("{state} for node `{node}` was ticked before being bound")]
    UnboundState {
        node: ParticleNodeID,
        state: &'static str,
    },

    #[error("{state} for node `{node}` was ticked after being disposed")]
    DisposedState {
        node: ParticleNodeID,
        state: &'static str,
    },

    #[error("Particles {first} and {second} have overlapping vertex ranges")]
    OverlappingParticleRanges { first: usize, second: usize },

    #[error("Particle {particle} has an invalid range: {reason}")]
    InvalidParticleRange { particle: usize, reason: &'static str },

    #[error("Particle {particle} does not exist in the range table")]
    UnknownParticle { particle: usize },

    #[error("Node `{node}` expects {expected} components per value, got {actual}")]
    ValueLength {
        node: ParticleNodeID,
        expected: usize,
        actual: usize,
    },

    #[error("Node `{node}` is {mode:?} and does not accept this kind of value")]
    ModeMismatch { node: ParticleNodeID, mode: NodeMode },

    #[error("The register allocator has already served a compile pass")]
    AllocatorAlreadyUsed,
}
