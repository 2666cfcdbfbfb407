//! Runtime state for rotate-to-heading nodes.

use crate::{
    error::AnimationError,
    state::{StateBinding, TickContext, billboard::matrix_rows},
    uniform::UniformRegisterWriter,
};
use nalgebra::{Isometry3, Matrix3};

/// Writes the model-view rotation used to project velocities onto the view
/// plane. When the program builds the heading without a billboard there is
/// nothing to write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotateToHeadingState;

/// Computes the rotation from the model space of the particle system to
/// camera space.
pub fn model_view_rotation(
    render_transform: &Isometry3<f32>,
    view_transform: &Isometry3<f32>,
) -> Matrix3<f32> {
    (view_transform.rotation * render_transform.rotation)
        .to_rotation_matrix()
        .into_inner()
}

impl RotateToHeadingState {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        if let Some(matrix) = binding.optional_uniform() {
            let rotation = model_view_rotation(
                &ctx.transforms.render_transform(),
                &ctx.transforms.view_transform(),
            );
            ctx.constants
                .write_constant_rows(matrix, &matrix_rows(&rotation));
        }
        Ok(())
    }
}
