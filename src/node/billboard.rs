//! Orientation of particles towards the camera.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{NodeCompileContext, ParticleNodeID},
    register::{RegisterKind, RegisterSlot},
    set::{AnimationSetMetadata, MetadataKey},
};
use anyhow::Result;
use lazy_static::lazy_static;
use nalgebra::Vector3;

/// Rotates the local geometry of every particle so that it faces the camera,
/// optionally only about a fixed axis.
#[derive(Clone, Debug, PartialEq)]
pub struct BillboardNode {
    id: ParticleNodeID,
    axis: Option<Vector3<f32>>,
}

lazy_static! {
    static ref ROTATE: CodeTemplate<'static> = CodeTemplate::new(
        "
        m33 {{position}}.xyz, {{position}}.xyz, {{matrix}}
        "
    );
}

impl BillboardNode {
    /// Three constant registers holding the rows of the billboard rotation.
    pub const MATRIX: RegisterSlot = RegisterSlot("billboard_matrix");

    /// Creates a billboard node that fully faces the camera.
    pub fn new() -> Self {
        Self::named("billboard", None)
    }

    /// Creates a billboard node that only rotates about the given axis,
    /// expressed in the particle system's model space.
    pub fn with_axis(axis: Vector3<f32>) -> Self {
        Self::named("billboard", Some(axis))
    }

    /// Creates a billboard node with the given name and optional axis.
    pub fn named(name: &str, axis: Option<Vector3<f32>>) -> Self {
        Self {
            id: ParticleNodeID::from_name(name),
            axis: axis.and_then(|axis| axis.try_normalize(f32::EPSILON)),
        }
    }

    pub fn id(&self) -> ParticleNodeID {
        self.id
    }

    /// The unit axis the rotation is constrained to, if any.
    pub fn axis(&self) -> Option<Vector3<f32>> {
        self.axis
    }

    pub(super) fn contribute_metadata(&self, metadata: &mut AnimationSetMetadata) {
        metadata.announce(MetadataKey::HAS_BILLBOARD);
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let matrix = ctx.allocate_slot_rows(RegisterKind::Constant, 3, Self::MATRIX)?;
        ROTATE.resolve_fragment([
            ("position", ctx.shared().position_target.to_string()),
            ("matrix", matrix.to_string()),
        ])
    }
}

impl Default for BillboardNode {
    fn default() -> Self {
        Self::new()
    }
}
