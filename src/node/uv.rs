//! Oscillation of texture coordinates.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{NodeCompileContext, ParticleNodeID},
    register::{RegisterKind, RegisterSlot},
    set::{AnimationSetMetadata, MetadataKey},
};
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;

/// Texture coordinate axis.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UVAxis {
    U,
    V,
}

/// Shifts one texture coordinate of every vertex back and forth as a sine of
/// the particle's local time.
#[derive(Clone, Debug, PartialEq)]
pub struct UVNode {
    id: ParticleNodeID,
    axis: UVAxis,
    cycle_duration: f32,
    scale: f32,
}

lazy_static! {
    static ref OSCILLATE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mul {{scratch}}.x, {{time}}.x, {{params}}.x
        sin {{scratch}}.x, {{scratch}}.x
        mul {{scratch}}.x, {{scratch}}.x, {{params}}.y
        add {{uv}}.{{axis}}, {{uv}}.{{axis}}, {{scratch}}.x
        "
    );
}

impl UVAxis {
    /// The component of the texture coordinate register along this axis.
    pub const fn component(&self) -> &'static str {
        match self {
            Self::U => "x",
            Self::V => "y",
        }
    }
}

impl UVNode {
    /// Constant register holding the angular frequency in `x` and the
    /// amplitude in `y`.
    pub const PARAMS: RegisterSlot = RegisterSlot("uv_params");

    /// Creates a UV node oscillating the given axis once every
    /// `cycle_duration` with amplitude `scale`.
    pub fn new(axis: UVAxis, cycle_duration: f32, scale: f32) -> Self {
        Self::named("uv", axis, cycle_duration, scale)
    }

    pub fn named(name: &str, axis: UVAxis, cycle_duration: f32, scale: f32) -> Self {
        Self {
            id: ParticleNodeID::from_name(name),
            axis,
            cycle_duration,
            scale,
        }
    }

    pub fn id(&self) -> ParticleNodeID {
        self.id
    }

    pub fn axis(&self) -> UVAxis {
        self.axis
    }

    pub fn cycle_duration(&self) -> f32 {
        self.cycle_duration
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub(super) fn contribute_metadata(&self, metadata: &mut AnimationSetMetadata) {
        metadata.announce(MetadataKey::HAS_UV);
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let params = ctx.allocate_slot(RegisterKind::Constant, Self::PARAMS)?;
        let scratch = ctx.allocate_scratch()?;

        let shared = *ctx.shared();
        let uv = shared
            .uv_target
            .ok_or_else(|| anyhow!("No texture coordinate target for UV node `{}`", self.id))?;

        OSCILLATE.resolve_fragment([
            ("scratch", scratch.to_string()),
            ("time", shared.vertex_time.to_string()),
            ("params", params.to_string()),
            ("uv", uv.to_string()),
            ("axis", self.axis.component().to_string()),
        ])
    }
}
