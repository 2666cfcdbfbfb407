//! Runtime state for billboard nodes.

use crate::{
    error::AnimationError,
    node::BillboardNode,
    state::{StateBinding, TickContext},
    uniform::UniformRegisterWriter,
};
use nalgebra::{Isometry3, Matrix3, Vector3};

/// Writes the rotation making particles face the camera every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct BillboardState {
    axis: Option<Vector3<f32>>,
}

/// Computes the rotation, in the model space of the particle system, that
/// turns a particle's local `xy` plane towards the camera.
///
/// `render_transform` maps model space to world space and `view_transform`
/// maps world space to camera space. With an axis, the particle's local `y`
/// axis is kept along it and the rotation is only about the axis. If the
/// camera lies on the axis, the unconstrained rotation is used.
pub fn billboard_rotation(
    render_transform: &Isometry3<f32>,
    view_transform: &Isometry3<f32>,
    axis: Option<Vector3<f32>>,
) -> Matrix3<f32> {
    let facing_camera = (view_transform.rotation * render_transform.rotation)
        .inverse()
        .to_rotation_matrix()
        .into_inner();

    let Some(axis) = axis else {
        return facing_camera;
    };

    let camera_position = (view_transform * render_transform)
        .inverse()
        .translation
        .vector;

    match (camera_position - axis * camera_position.dot(&axis)).try_normalize(f32::EPSILON) {
        Some(facing) => Matrix3::from_columns(&[axis.cross(&facing), axis, facing]),
        None => facing_camera,
    }
}

/// Returns the rows of the given matrix as constant register values.
pub(super) fn matrix_rows(matrix: &Matrix3<f32>) -> [[f32; 4]; 3] {
    [0, 1, 2].map(|row| {
        [
            matrix[(row, 0)],
            matrix[(row, 1)],
            matrix[(row, 2)],
            0.0,
        ]
    })
}

impl BillboardState {
    pub fn new(node: &BillboardNode) -> Self {
        Self { axis: node.axis() }
    }

    pub fn axis(&self) -> Option<Vector3<f32>> {
        self.axis
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        let rotation = billboard_rotation(
            &ctx.transforms.render_transform(),
            &ctx.transforms.view_transform(),
            self.axis,
        );
        ctx.constants
            .write_constant_rows(binding.uniform()?, &matrix_rows(&rotation));
        Ok(())
    }
}
