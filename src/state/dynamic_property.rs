//! Runtime state for dynamic property nodes.

use crate::{
    error::AnimationError,
    node::{DynamicProperty, DynamicPropertyNode, NodeMode, ParticleNodeID},
    state::{StateBinding, TickContext},
    uniform::UniformRegisterWriter,
};
use std::collections::BTreeMap;

/// Holds the values of a dynamic property and writes them every tick.
///
/// A global property writes its single value to its constant register. A
/// per-particle property writes each particle's value to its column,
/// falling back to the property's neutral value for particles without one.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicPropertyState {
    node: ParticleNodeID,
    property: DynamicProperty,
    mode: NodeMode,
    global_value: Vec<f32>,
    particle_values: BTreeMap<usize, Vec<f32>>,
}

impl DynamicPropertyState {
    pub fn new(node: &DynamicPropertyNode) -> Self {
        let property = node.property();
        Self {
            node: node.id(),
            property,
            mode: node.mode(),
            global_value: Self::neutral_value(property),
            particle_values: BTreeMap::new(),
        }
    }

    pub fn property(&self) -> DynamicProperty {
        self.property
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    /// The value that leaves particles unchanged: a scale of one, and zero
    /// for everything else.
    pub fn neutral_value(property: DynamicProperty) -> Vec<f32> {
        match property {
            DynamicProperty::Scale => vec![1.0],
            DynamicProperty::Position | DynamicProperty::Velocity => vec![0.0; 3],
        }
    }

    pub fn global_value(&self) -> &[f32] {
        &self.global_value
    }

    /// Sets the value shared by all particles.
    ///
    /// # Errors
    /// Returns [`AnimationError::ModeMismatch`] if the property is
    /// per-particle, and [`AnimationError::ValueLength`] if the number of
    /// components does not match the property.
    pub fn set_global_value(&mut self, values: &[f32]) -> Result<(), AnimationError> {
        self.check_mode(NodeMode::Global)?;
        self.check_length(values)?;
        self.global_value = values.to_vec();
        Ok(())
    }

    /// Returns the value set for the given particle, if any.
    pub fn particle_value(&self, particle_index: usize) -> Option<&[f32]> {
        self.particle_values
            .get(&particle_index)
            .map(Vec::as_slice)
    }

    /// Sets the value of the given particle.
    ///
    /// # Errors
    /// Returns [`AnimationError::ModeMismatch`] if the property is global,
    /// and [`AnimationError::ValueLength`] if the number of components does
    /// not match the property.
    pub fn set_particle_value(
        &mut self,
        particle_index: usize,
        values: &[f32],
    ) -> Result<(), AnimationError> {
        self.check_mode(NodeMode::PerParticle)?;
        self.check_length(values)?;
        self.particle_values.insert(particle_index, values.to_vec());
        Ok(())
    }

    /// Forgets the values of all particles.
    pub fn clear_particle_values(&mut self) {
        self.particle_values.clear();
    }

    pub(super) fn tick(
        &mut self,
        binding: &StateBinding,
        ctx: &mut TickContext<'_>,
    ) -> Result<(), AnimationError> {
        match self.mode {
            NodeMode::Global => {
                let mut register_values = [0.0; 4];
                register_values[..self.global_value.len()].copy_from_slice(&self.global_value);
                ctx.constants
                    .write_constant(binding.uniform()?, register_values);
            }
            NodeMode::PerParticle => {
                if !ctx.writes_vertex_data() {
                    return Ok(());
                }
                let column = binding.column()?;
                let neutral = Self::neutral_value(self.property);
                for particle_index in 0..ctx.elements.range_table().n_particles() {
                    let values = self
                        .particle_values
                        .get(&particle_index)
                        .unwrap_or(&neutral);
                    ctx.elements.write_particle(column, particle_index, values);
                }
            }
        }
        Ok(())
    }

    fn check_mode(&self, required: NodeMode) -> Result<(), AnimationError> {
        if self.mode == required {
            Ok(())
        } else {
            Err(AnimationError::ModeMismatch {
                node: self.node,
                mode: self.mode,
            })
        }
    }

    fn check_length(&self, values: &[f32]) -> Result<(), AnimationError> {
        let expected = self.property.n_components();
        if values.len() == expected {
            Ok(())
        } else {
            Err(AnimationError::ValueLength {
                node: self.node,
                expected,
                actual: values.len(),
            })
        }
    }
}
