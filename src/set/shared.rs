//! Registers shared by every node of a compiled program.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    error::RegisterPoolExhausted,
    register::{Register, RegisterAllocator, RegisterKind},
    set::metadata::{AnimationSetMetadata, MetadataKey},
};
use anyhow::Result;
use lazy_static::lazy_static;

/// Values of the common constants register.
pub const COMMON_CONSTANTS: [f32; 4] = [0.0, 1.0, 2.0, 0.5];

/// Registers the animation set allocates before any node emits code. Nodes
/// read and modify the targets, and the host reads the final position from
/// [`position_target`](Self::position_target).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SharedRegisters {
    /// Attribute holding the local position of the vertex.
    pub position_source: Register,
    /// Attribute holding the texture coordinates of the vertex.
    pub uv_source: Option<Register>,
    /// Constant holding [`COMMON_CONSTANTS`].
    pub common_constants: Register,
    /// Local geometry of the vertex, scaled and rotated by nodes.
    pub position_target: Register,
    /// Translation accumulated by nodes.
    pub offset_target: Register,
    /// Local time of the vertex's particle (`x`) and the fraction of its
    /// cycle that has passed (`y`).
    pub vertex_time: Register,
    pub velocity_target: Option<Register>,
    pub uv_target: Option<Register>,
    pub uv_varying: Option<Register>,
}

lazy_static! {
    static ref PROLOGUE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mov {{position}}, {{position_source}}
        mov {{offset}}.xyz, {{common}}.xxx
        "
    );
    static ref VELOCITY_PROLOGUE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mov {{velocity}}.xyz, {{common}}.xxx
        "
    );
    static ref UV_PROLOGUE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mov {{uv}}, {{uv_source}}
        "
    );
    static ref EPILOGUE: CodeTemplate<'static> = CodeTemplate::new(
        "
        add {{position}}.xyz, {{position}}.xyz, {{offset}}.xyz
        "
    );
    static ref UV_EPILOGUE: CodeTemplate<'static> = CodeTemplate::new(
        "
        mov {{uv_varying}}, {{uv}}
        "
    );
}

impl SharedRegisters {
    /// Allocates the shared registers required by the announced facts.
    ///
    /// # Errors
    /// Returns [`RegisterPoolExhausted`] if a pool runs out.
    pub(crate) fn allocate(
        allocator: &mut RegisterAllocator,
        metadata: &AnimationSetMetadata,
    ) -> Result<Self, RegisterPoolExhausted> {
        let has_uv = metadata.has(MetadataKey::HAS_UV);
        let needs_velocity = metadata.has(MetadataKey::NEEDS_VELOCITY);

        let position_source = allocator.allocate(RegisterKind::Attribute)?;
        let uv_source = has_uv
            .then(|| allocator.allocate(RegisterKind::Attribute))
            .transpose()?;
        let common_constants = allocator.allocate(RegisterKind::Constant)?;
        let position_target = allocator.allocate(RegisterKind::Temp)?;
        let offset_target = allocator.allocate(RegisterKind::Temp)?;
        let vertex_time = allocator.allocate(RegisterKind::Temp)?;
        let velocity_target = needs_velocity
            .then(|| allocator.allocate(RegisterKind::Temp))
            .transpose()?;
        let uv_target = has_uv
            .then(|| allocator.allocate(RegisterKind::Temp))
            .transpose()?;
        let uv_varying = has_uv
            .then(|| allocator.allocate(RegisterKind::Varying))
            .transpose()?;

        Ok(Self {
            position_source,
            uv_source,
            common_constants,
            position_target,
            offset_target,
            vertex_time,
            velocity_target,
            uv_target,
            uv_varying,
        })
    }

    /// Returns the shared temps, which stay live for the whole compile pass.
    pub fn temps(&self) -> impl Iterator<Item = Register> {
        [
            Some(self.position_target),
            Some(self.offset_target),
            Some(self.vertex_time),
            self.velocity_target,
            self.uv_target,
        ]
        .into_iter()
        .flatten()
    }

    /// Emits the code initializing the targets from the sources.
    pub(crate) fn prologue(&self) -> Result<CodeFragment> {
        let mut fragment = PROLOGUE.resolve_fragment([
            ("position", self.position_target.to_string()),
            ("position_source", self.position_source.to_string()),
            ("offset", self.offset_target.to_string()),
            ("common", self.common_constants.to_string()),
        ])?;

        if let Some(velocity) = self.velocity_target {
            fragment.append(&VELOCITY_PROLOGUE.resolve_fragment([
                ("velocity", velocity.to_string()),
                ("common", self.common_constants.to_string()),
            ])?);
        }

        if let (Some(uv), Some(uv_source)) = (self.uv_target, self.uv_source) {
            fragment.append(&UV_PROLOGUE.resolve_fragment([
                ("uv", uv.to_string()),
                ("uv_source", uv_source.to_string()),
            ])?);
        }

        Ok(fragment)
    }

    /// Emits the code combining the targets into the program outputs.
    pub(crate) fn epilogue(&self) -> Result<CodeFragment> {
        let mut fragment = EPILOGUE.resolve_fragment([
            ("position", self.position_target.to_string()),
            ("offset", self.offset_target.to_string()),
        ])?;

        if let (Some(uv), Some(uv_varying)) = (self.uv_target, self.uv_varying) {
            fragment.append(&UV_EPILOGUE.resolve_fragment([
                ("uv", uv.to_string()),
                ("uv_varying", uv_varying.to_string()),
            ])?);
        }

        Ok(fragment)
    }
}
