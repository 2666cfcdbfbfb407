//! Runtime state for the time node.

use crate::{
    error::AnimationError,
    state::{StateBinding, TickContext},
    uniform::UniformRegisterWriter,
};

/// Writes the clock to its constant register every tick, and the start time
/// and cycle duration of every particle to the time column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeState;

impl TimeState {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        ctx.constants
            .write_constant(binding.uniform()?, [ctx.clock, 0.0, 0.0, 0.0]);

        if !ctx.writes_vertex_data() {
            return Ok(());
        }

        let column = binding.column()?;
        for particle_index in 0..ctx.elements.range_table().n_particles() {
            let range = ctx.elements.range_table().ranges()[particle_index];
            ctx.elements.write_particle(
                column,
                particle_index,
                &[range.start_time, range.total_time],
            );
        }
        Ok(())
    }
}
