//! Runtime state for UV nodes.

use crate::{
    error::AnimationError,
    node::UVNode,
    state::{StateBinding, TickContext},
    uniform::UniformRegisterWriter,
};
use std::f32::consts::TAU;

/// Writes the angular frequency and amplitude of the texture coordinate
/// oscillation every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct UVState {
    cycle_duration: f32,
    scale: f32,
}

impl UVState {
    pub fn new(node: &UVNode) -> Self {
        Self {
            cycle_duration: node.cycle_duration(),
            scale: node.scale(),
        }
    }

    pub fn cycle_duration(&self) -> f32 {
        self.cycle_duration
    }

    pub fn set_cycle_duration(&mut self, cycle_duration: f32) {
        self.cycle_duration = cycle_duration;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// The values of the UV parameter register. A non-positive cycle
    /// duration freezes the oscillation.
    pub fn params(&self) -> [f32; 4] {
        let angular_frequency = if self.cycle_duration > 0.0 {
            TAU / self.cycle_duration
        } else {
            0.0
        };
        [angular_frequency, self.scale, 0.0, 0.0]
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        ctx.constants.write_constant(binding.uniform()?, self.params());
        Ok(())
    }
}
