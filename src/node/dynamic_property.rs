//! Properties whose values are set at runtime.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{NodeCompileContext, NodeMode, ParticleNodeID},
    register::{Register, RegisterKind, RegisterSlot},
    set::{AnimationSetMetadata, MetadataKey},
};
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;

/// The particle property a dynamic property node drives.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DynamicProperty {
    /// Constant offset added to the particle position.
    Position,
    /// Constant velocity, integrated over the particle's local time.
    Velocity,
    /// Uniform scale of the particle's local geometry.
    Scale,
}

/// Drives a particle property with values the application sets at runtime,
/// either one value for all particles or one value per particle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicPropertyNode {
    id: ParticleNodeID,
    property: DynamicProperty,
    mode: NodeMode,
}

lazy_static! {
    static ref OFFSET: CodeTemplate<'static> = CodeTemplate::new(
        "
        add {{offset}}.xyz, {{offset}}.xyz, {{value}}.xyz
        "
    );
    static ref VELOCITY: CodeTemplate<'static> = CodeTemplate::new(
        "
        add {{velocity}}.xyz, {{velocity}}.xyz, {{value}}.xyz
        mul {{scratch}}.xyz, {{value}}.xyz, {{time}}.x
        add {{offset}}.xyz, {{offset}}.xyz, {{scratch}}.xyz
        "
    );
    static ref SCALE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mul {{position}}.xyz, {{position}}.xyz, {{value}}.x
        "
    );
}

impl DynamicProperty {
    /// Number of floats in a value of the property.
    pub const fn n_components(&self) -> usize {
        match self {
            Self::Position | Self::Velocity => 3,
            Self::Scale => 1,
        }
    }
}

impl DynamicPropertyNode {
    /// Constant register holding the value of a global node.
    pub const VALUE: RegisterSlot = RegisterSlot("dynamic_value");

    pub fn new(name: &str, property: DynamicProperty, mode: NodeMode) -> Self {
        Self {
            id: ParticleNodeID::from_name(name),
            property,
            mode,
        }
    }

    pub fn id(&self) -> ParticleNodeID {
        self.id
    }

    pub fn property(&self) -> DynamicProperty {
        self.property
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub(super) fn contribute_metadata(&self, metadata: &mut AnimationSetMetadata) {
        if self.property == DynamicProperty::Velocity {
            metadata.announce(MetadataKey::NEEDS_VELOCITY);
        }
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let value = self.allocate_value(ctx)?.to_string();
        let shared = *ctx.shared();

        match self.property {
            DynamicProperty::Position => OFFSET.resolve_fragment([
                ("offset", shared.offset_target.to_string()),
                ("value", value),
            ]),
            DynamicProperty::Velocity => {
                let velocity = shared
                    .velocity_target
                    .ok_or_else(|| anyhow!("No velocity target for node `{}`", self.id))?;
                let scratch = ctx.allocate_scratch()?;
                VELOCITY.resolve_fragment([
                    ("velocity", velocity.to_string()),
                    ("value", value),
                    ("scratch", scratch.to_string()),
                    ("time", shared.vertex_time.to_string()),
                    ("offset", shared.offset_target.to_string()),
                ])
            }
            DynamicProperty::Scale => SCALE.resolve_fragment([
                ("position", shared.position_target.to_string()),
                ("value", value),
            ]),
        }
    }

    fn allocate_value(&self, ctx: &mut NodeCompileContext<'_>) -> Result<Register> {
        let register = match self.mode {
            NodeMode::Global => ctx.allocate_slot(RegisterKind::Constant, Self::VALUE)?,
            NodeMode::PerParticle => ctx.allocate_stream()?,
        };
        Ok(register)
    }
}
