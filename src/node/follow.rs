//! Particles trailing a moving target.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{FollowTargetID, NodeCompileContext, ParticleNodeID},
};
use anyhow::Result;
use lazy_static::lazy_static;

/// Which part of the target's transform a follow node applies.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FollowProperty {
    /// The target's position is added to the particle's offset.
    Position,
    /// The target's Euler angles rotate the particle's local geometry.
    Rotation,
}

/// How the sampled target transform is turned into per-particle values.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FollowPolicy {
    /// Particles starting a cycle take the current sample as is.
    #[default]
    Discrete,
    /// Particles starting a cycle take the current sample extrapolated back
    /// to the moment their cycle began, using the velocity between the two
    /// latest samples.
    Smoothed,
}

/// How a follow node keeps track of the sample it extrapolates from when
/// smoothing.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PreviousSampleTracking {
    /// The previous sample is the one taken on the previous tick.
    #[default]
    PerTick,
    /// The previous sample is the first one ever taken and is never
    /// refreshed. Reproduces how rotation smoothing historically behaved.
    Frozen,
}

/// Makes each particle pick up the transform of a target at the moment its
/// cycle begins and keep it for the rest of the cycle, so that particles
/// form a trail behind a moving target.
#[derive(Clone, Debug, PartialEq)]
pub struct FollowNode {
    id: ParticleNodeID,
    target: FollowTargetID,
    property: FollowProperty,
    policy: FollowPolicy,
    tracking: PreviousSampleTracking,
}

lazy_static! {
    static ref OFFSET: CodeTemplate<'static> = CodeTemplate::new(
        "
        add {{offset}}.xyz, {{offset}}.xyz, {{stream}}.xyz
        "
    );
    static ref ROTATE: CodeTemplate<'static> = CodeTemplate::new(
        "
        sin {{sin}}.xyz, {{stream}}.xyz
        cos {{cos}}.xyz, {{stream}}.xyz
        mul {{scratch}}.x, {{position}}.y, {{cos}}.x
        mul {{scratch}}.y, {{position}}.z, {{sin}}.x
        sub {{scratch}}.z, {{scratch}}.x, {{scratch}}.y
        mul {{scratch}}.x, {{position}}.y, {{sin}}.x
        mul {{scratch}}.y, {{position}}.z, {{cos}}.x
        add {{position}}.z, {{scratch}}.x, {{scratch}}.y
        mov {{position}}.y, {{scratch}}.z
        mul {{scratch}}.x, {{position}}.x, {{cos}}.y
        mul {{scratch}}.y, {{position}}.z, {{sin}}.y
        add {{scratch}}.z, {{scratch}}.x, {{scratch}}.y
        mul {{scratch}}.x, {{position}}.z, {{cos}}.y
        mul {{scratch}}.y, {{position}}.x, {{sin}}.y
        sub {{position}}.z, {{scratch}}.x, {{scratch}}.y
        mov {{position}}.x, {{scratch}}.z
        mul {{scratch}}.x, {{position}}.x, {{cos}}.z
        mul {{scratch}}.y, {{position}}.y, {{sin}}.z
        sub {{scratch}}.z, {{scratch}}.x, {{scratch}}.y
        mul {{scratch}}.x, {{position}}.x, {{sin}}.z
        mul {{scratch}}.y, {{position}}.y, {{cos}}.z
        add {{position}}.y, {{scratch}}.x, {{scratch}}.y
        mov {{position}}.x, {{scratch}}.z
        "
    );
}

impl FollowNode {
    /// A position offset or a set of Euler angles.
    pub const DATA_LENGTH: usize = 3;

    pub fn new(
        name: &str,
        target: FollowTargetID,
        property: FollowProperty,
        policy: FollowPolicy,
    ) -> Self {
        Self {
            id: ParticleNodeID::from_name(name),
            target,
            property,
            policy,
            tracking: PreviousSampleTracking::default(),
        }
    }

    /// Returns the node with the given way of tracking the previous sample.
    pub fn with_tracking(mut self, tracking: PreviousSampleTracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn id(&self) -> ParticleNodeID {
        self.id
    }

    pub fn target(&self) -> FollowTargetID {
        self.target
    }

    pub fn property(&self) -> FollowProperty {
        self.property
    }

    pub fn policy(&self) -> FollowPolicy {
        self.policy
    }

    pub fn tracking(&self) -> PreviousSampleTracking {
        self.tracking
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let stream = ctx.allocate_stream()?;
        let shared = *ctx.shared();

        match self.property {
            FollowProperty::Position => OFFSET.resolve_fragment([
                ("offset", shared.offset_target.to_string()),
                ("stream", stream.to_string()),
            ]),
            FollowProperty::Rotation => {
                let sin = ctx.allocate_scratch()?;
                let cos = ctx.allocate_scratch()?;
                let scratch = ctx.allocate_scratch()?;
                ROTATE.resolve_fragment([
                    ("sin", sin.to_string()),
                    ("cos", cos.to_string()),
                    ("scratch", scratch.to_string()),
                    ("stream", stream.to_string()),
                    ("position", shared.position_target.to_string()),
                ])
            }
        }
    }
}
