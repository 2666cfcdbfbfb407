//! Alignment of particles with their direction of motion.

use crate::{
    codegen::{CodeFragment, CodeTemplate},
    node::{NodeCompileContext, ParticleNodeID},
    register::{RegisterKind, RegisterSlot},
    set::{AnimationSetMetadata, MetadataKey},
};
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;

/// Rotates the local geometry of every particle so that its `x` axis points
/// along the particle's velocity.
///
/// If the set also has a billboard node, the rotation happens in the view
/// plane before the billboard orientation is applied, using the model-view
/// rotation held in [`MATRIX`](Self::MATRIX). Otherwise a full heading basis
/// is built in the vertex program and the node needs no constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotateToHeadingNode {
    id: ParticleNodeID,
}

lazy_static! {
    static ref VIEW_PLANE_HEADING: CodeTemplate<'static> = CodeTemplate::new(
        "
        m33 {{heading}}.xyz, {{velocity}}.xyz, {{matrix}}
        mul {{scratch}}.xy, {{heading}}.xy, {{heading}}.xy
        add {{scratch}}.x, {{scratch}}.x, {{scratch}}.y
        rsq {{scratch}}.x, {{scratch}}.x
        mul {{heading}}.xy, {{heading}}.xy, {{scratch}}.x
        mul {{scratch}}.x, {{position}}.x, {{heading}}.x
        mul {{scratch}}.y, {{position}}.y, {{heading}}.y
        sub {{scratch}}.z, {{scratch}}.x, {{scratch}}.y
        mul {{scratch}}.x, {{position}}.x, {{heading}}.y
        mul {{scratch}}.y, {{position}}.y, {{heading}}.x
        add {{position}}.y, {{scratch}}.x, {{scratch}}.y
        mov {{position}}.x, {{scratch}}.z
        "
    );
    static ref HEADING_BASIS: CodeTemplate<'static> = CodeTemplate::new(
        "
        nrm {{forward}}.xyz, {{velocity}}.xyz
        crs {{side}}.xyz, {{forward}}.xyz, {{common}}.xyx
        nrm {{side}}.xyz, {{side}}.xyz
        crs {{up}}.xyz, {{side}}.xyz, {{forward}}.xyz
        mul {{scratch}}.xyz, {{forward}}.xyz, {{position}}.x
        mul {{up}}.xyz, {{up}}.xyz, {{position}}.y
        add {{scratch}}.xyz, {{scratch}}.xyz, {{up}}.xyz
        mul {{side}}.xyz, {{side}}.xyz, {{position}}.z
        add {{position}}.xyz, {{scratch}}.xyz, {{side}}.xyz
        "
    );
}

impl RotateToHeadingNode {
    /// Three constant registers holding the rows of the model-view rotation,
    /// only allocated when the set has a billboard node.
    pub const MATRIX: RegisterSlot = RegisterSlot("heading_matrix");

    pub fn new() -> Self {
        Self::named("rotate_to_heading")
    }

    pub fn named(name: &str) -> Self {
        Self {
            id: ParticleNodeID::from_name(name),
        }
    }

    pub fn id(&self) -> ParticleNodeID {
        self.id
    }

    pub(super) fn contribute_metadata(&self, metadata: &mut AnimationSetMetadata) {
        metadata.announce(MetadataKey::NEEDS_VELOCITY);
    }

    pub(super) fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        let shared = *ctx.shared();
        let velocity = shared
            .velocity_target
            .ok_or_else(|| anyhow!("No velocity target for heading node `{}`", self.id))?;

        if ctx.metadata().has(MetadataKey::HAS_BILLBOARD) {
            let matrix = ctx.allocate_slot_rows(RegisterKind::Constant, 3, Self::MATRIX)?;
            let heading = ctx.allocate_scratch()?;
            let scratch = ctx.allocate_scratch()?;

            VIEW_PLANE_HEADING.resolve_fragment([
                ("heading", heading.to_string()),
                ("velocity", velocity.to_string()),
                ("matrix", matrix.to_string()),
                ("scratch", scratch.to_string()),
                ("position", shared.position_target.to_string()),
            ])
        } else {
            let forward = ctx.allocate_scratch()?;
            let side = ctx.allocate_scratch()?;
            let up = ctx.allocate_scratch()?;
            let scratch = ctx.allocate_scratch()?;

            HEADING_BASIS.resolve_fragment([
                ("forward", forward.to_string()),
                ("side", side.to_string()),
                ("up", up.to_string()),
                ("scratch", scratch.to_string()),
                ("velocity", velocity.to_string()),
                ("common", shared.common_constants.to_string()),
                ("position", shared.position_target.to_string()),
            ])
        }
    }
}

impl Default for RotateToHeadingNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        register::{RegisterAllocator, RegisterLimits},
        set::{COMMON_CONSTANTS, ParticleAnimationSet},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Vector3};
    use std::collections::HashMap;

    fn operand(text: &str) -> (String, Vec<usize>) {
        let (register, components) = text.split_once('.').unwrap();
        let components = components
            .chars()
            .map(|component| "xyzw".find(component).unwrap())
            .collect();
        (register.to_string(), components)
    }

    /// Runs the `nrm`, `crs`, `mul` and `add` instructions of a fragment on
    /// the given register values.
    fn execute(lines: &[String], registers: &mut HashMap<String, [f32; 4]>) {
        for line in lines {
            let (op, operands) = line.split_once(' ').unwrap();
            let operands: Vec<_> = operands.split(", ").map(operand).collect();
            let (destination, mask) = &operands[0];

            let read = |registers: &HashMap<String, [f32; 4]>, index: usize| -> Vector3<f32> {
                let (register, swizzle) = &operands[index];
                let values = registers[register];
                Vector3::from_fn(|i, _| values[swizzle[i.min(swizzle.len() - 1)]])
            };

            let result = match op {
                "nrm" => read(registers, 1).normalize(),
                "crs" => read(registers, 1).cross(&read(registers, 2)),
                "mul" => read(registers, 1).component_mul(&read(registers, 2)),
                "add" => read(registers, 1) + read(registers, 2),
                _ => panic!("Unexpected instruction `{}`", line),
            };

            let target = registers.entry(destination.clone()).or_insert([0.0; 4]);
            for (i, &component) in mask.iter().enumerate() {
                target[component] = result[i];
            }
        }
    }

    /// Returns the matrix the heading basis applies to local positions for
    /// a particle moving with the given velocity.
    fn heading_basis(velocity: Vector3<f32>) -> Matrix3<f32> {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(RotateToHeadingNode::new()).unwrap();
        let program = set
            .compile(RegisterAllocator::new(RegisterLimits::default()))
            .unwrap();
        let shared = program.shared();
        let fragment = program
            .node_fragment(ParticleNodeID::from_name("rotate_to_heading"))
            .unwrap();

        let mut columns = Vec::new();
        for axis in 0..3 {
            let mut position = [0.0; 4];
            position[axis] = 1.0;

            let mut registers = HashMap::new();
            registers.insert(shared.common_constants.to_string(), COMMON_CONSTANTS);
            registers.insert(
                shared.velocity_target.unwrap().to_string(),
                [velocity.x, velocity.y, velocity.z, 0.0],
            );
            registers.insert(shared.position_target.to_string(), position);

            execute(fragment.lines(), &mut registers);

            let result = registers[&shared.position_target.to_string()];
            columns.push(Vector3::new(result[0], result[1], result[2]));
        }
        Matrix3::from_columns(&columns)
    }

    #[test]
    fn heading_along_x_leaves_geometry_unchanged() {
        assert_abs_diff_eq!(
            heading_basis(Vector3::x()),
            Matrix3::identity(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn heading_basis_is_a_rotation_taking_x_to_velocity() {
        for velocity in [
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(-3.0, 1.0, 0.5),
            Vector3::new(0.2, -1.0, -0.7),
        ] {
            let basis = heading_basis(velocity);
            assert_abs_diff_eq!(basis.determinant(), 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(
                basis.transpose() * basis,
                Matrix3::identity(),
                epsilon = 1e-5
            );
            assert_abs_diff_eq!(
                basis * Vector3::x(),
                velocity.normalize(),
                epsilon = 1e-5
            );
        }
    }
}
