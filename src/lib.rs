//! Compilation and per-frame runtime of particle animation nodes.
//!
//! A [`ParticleAnimationSet`](set::ParticleAnimationSet) is compiled once into
//! a vertex program fragment and a register index map, after which a
//! [`ParticleAnimator`](animator::ParticleAnimator) ticks one state per node
//! every frame, writing uniform registers and the shared interleaved vertex
//! buffer.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::cast_lossless)]

#[macro_use]
mod macros;

pub mod animator;
pub mod codegen;
pub mod config;
pub mod elements;
pub mod error;
pub mod hash;
pub mod node;
pub mod register;
pub mod set;
pub mod state;
pub mod uniform;

pub use animator::{ParticleAnimator, TransformSource};
pub use elements::{AnimationElements, ParticleRange, ParticleRangeTable};
pub use error::{AnimationError, RegisterPoolExhausted};
pub use node::{NodeMode, ParticleNode, ParticleNodeID};
pub use register::{Register, RegisterAllocator, RegisterIndexMap, RegisterKind};
pub use set::{CompiledAnimationProgram, ParticleAnimationSet};
pub use state::{ParticleAnimationState, StateLifecycle};
