//! Per-frame driver of the animation states of one particle system.

use crate::{
    elements::{AnimationElements, BufferChange, ParticleRangeTable, VertexBufferUploader},
    error::AnimationError,
    node::{FollowTargetID, ParticleNodeID},
    set::CompiledAnimationProgram,
    state::{DynamicPropertyState, ParticleAnimationState, StateBehavior, TickContext},
    uniform::{ConstantBufferUploader, VertexConstantData},
};
use anyhow::{Result, bail};
use nalgebra::{Isometry3, Point3, Vector3};
use std::{collections::HashMap, sync::Arc};

/// Supplier of the transforms animation states depend on.
pub trait TransformSource {
    /// Returns the current position of the given follow target in the model
    /// space of the particle system, or [`None`] if the target is not
    /// available this frame.
    fn target_position(&self, target: FollowTargetID) -> Option<Point3<f32>>;

    /// Returns the current Euler angles of the given follow target, or
    /// [`None`] if the target is not available this frame.
    fn target_rotation(&self, target: FollowTargetID) -> Option<Vector3<f32>>;

    /// The transform from the model space of the particle system to world
    /// space.
    fn render_transform(&self) -> Isometry3<f32>;

    /// The transform from world space to camera space.
    fn view_transform(&self) -> Isometry3<f32>;
}

/// A fixed set of transforms, for hosts that sample their scene once per
/// frame.
#[derive(Clone, Debug)]
pub struct TransformSnapshot {
    target_positions: HashMap<FollowTargetID, Point3<f32>>,
    target_rotations: HashMap<FollowTargetID, Vector3<f32>>,
    render_transform: Isometry3<f32>,
    view_transform: Isometry3<f32>,
}

/// Runs the animation states of one particle system against a compiled
/// program.
///
/// The animator owns the vertex buffer and the constant registers of the
/// particle system, and one state for every node of the program, in compile
/// order. Each [`tick`](Self::tick) runs all states that are not disposed
/// and then records the tick time once, so every state of a tick sees the
/// same time step.
#[derive(Debug)]
pub struct ParticleAnimator {
    program: Arc<CompiledAnimationProgram>,
    elements: AnimationElements,
    constants: VertexConstantData,
    states: Vec<ParticleAnimationState>,
}

impl TransformSnapshot {
    /// Creates a snapshot with no follow targets and identity render and
    /// view transforms.
    pub fn new() -> Self {
        Self {
            target_positions: HashMap::new(),
            target_rotations: HashMap::new(),
            render_transform: Isometry3::identity(),
            view_transform: Isometry3::identity(),
        }
    }

    pub fn with_target_position(mut self, target: FollowTargetID, position: Point3<f32>) -> Self {
        self.set_target_position(target, position);
        self
    }

    pub fn with_target_rotation(mut self, target: FollowTargetID, rotation: Vector3<f32>) -> Self {
        self.set_target_rotation(target, rotation);
        self
    }

    pub fn with_render_transform(mut self, render_transform: Isometry3<f32>) -> Self {
        self.render_transform = render_transform;
        self
    }

    pub fn with_view_transform(mut self, view_transform: Isometry3<f32>) -> Self {
        self.view_transform = view_transform;
        self
    }

    pub fn set_target_position(&mut self, target: FollowTargetID, position: Point3<f32>) {
        self.target_positions.insert(target, position);
    }

    pub fn set_target_rotation(&mut self, target: FollowTargetID, rotation: Vector3<f32>) {
        self.target_rotations.insert(target, rotation);
    }

    /// Makes the given target unavailable.
    pub fn remove_target(&mut self, target: FollowTargetID) {
        self.target_positions.remove(&target);
        self.target_rotations.remove(&target);
    }

    pub fn set_render_transform(&mut self, render_transform: Isometry3<f32>) {
        self.render_transform = render_transform;
    }

    pub fn set_view_transform(&mut self, view_transform: Isometry3<f32>) {
        self.view_transform = view_transform;
    }
}

impl Default for TransformSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformSource for TransformSnapshot {
    fn target_position(&self, target: FollowTargetID) -> Option<Point3<f32>> {
        self.target_positions.get(&target).copied()
    }

    fn target_rotation(&self, target: FollowTargetID) -> Option<Vector3<f32>> {
        self.target_rotations.get(&target).copied()
    }

    fn render_transform(&self) -> Isometry3<f32> {
        self.render_transform
    }

    fn view_transform(&self) -> Isometry3<f32> {
        self.view_transform
    }
}

impl ParticleAnimator {
    /// Creates an animator for the particles in the given range table and
    /// binds a state for every node of the given program.
    ///
    /// # Errors
    /// Returns an error if a state cannot be bound to the program.
    pub fn new(
        program: Arc<CompiledAnimationProgram>,
        range_table: ParticleRangeTable,
    ) -> Result<Self> {
        let elements = AnimationElements::for_layout(program.layout(), range_table);
        let constants = program.initial_constant_data();

        let states = program
            .nodes()
            .iter()
            .map(|node| {
                let mut state = ParticleAnimationState::for_node(node);
                state.bind(&program)?;
                Ok(state)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Created particle animator with {} states for {} particles",
            states.len(),
            elements.range_table().n_particles()
        );

        Ok(Self {
            program,
            elements,
            constants,
            states,
        })
    }

    pub fn program(&self) -> &Arc<CompiledAnimationProgram> {
        &self.program
    }

    pub fn elements(&self) -> &AnimationElements {
        &self.elements
    }

    pub fn constants(&self) -> &VertexConstantData {
        &self.constants
    }

    pub fn states(&self) -> &[ParticleAnimationState] {
        &self.states
    }

    pub fn state(&self, node: ParticleNodeID) -> Option<&ParticleAnimationState> {
        self.states.iter().find(|state| state.node() == node)
    }

    pub fn state_mut(&mut self, node: ParticleNodeID) -> Option<&mut ParticleAnimationState> {
        self.states.iter_mut().find(|state| state.node() == node)
    }

    /// Advances every state that is not disposed to the given clock time.
    ///
    /// # Errors
    /// Returns an error if a state fails to tick. The tick time is then not
    /// recorded.
    pub fn tick(&mut self, clock: f32, transforms: &dyn TransformSource) -> Result<()> {
        let mut ctx = TickContext::new(
            clock,
            &mut self.elements,
            &mut self.constants,
            transforms,
        );

        log::trace!(
            "Ticking particle animator at t = {} (dt = {:?})",
            clock,
            ctx.delta_time
        );

        for state in self.states.iter_mut().filter(|state| !state.is_disposed()) {
            state.tick(&mut ctx)?;
        }

        self.elements.advance_time(clock);
        Ok(())
    }

    /// Disposes the state of the given node, so that it never writes again.
    ///
    /// # Errors
    /// Returns an error if the program has no such node or the state is
    /// already disposed.
    pub fn dispose_state(&mut self, node: ParticleNodeID) -> Result<()> {
        self.state_mut(node)
            .ok_or(AnimationError::UnknownNode { node })?
            .dispose()
    }

    /// Sets the global value of the given dynamic property node. The value
    /// is written on the next tick.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The program has no such node ([`AnimationError::UnknownNode`]).
    /// - The node is not a dynamic property.
    /// - The node is per-particle ([`AnimationError::ModeMismatch`]).
    /// - The number of values does not match the property
    ///   ([`AnimationError::ValueLength`]).
    pub fn set_dynamic_value(&mut self, node: ParticleNodeID, values: &[f32]) -> Result<()> {
        let state = self.dynamic_property_state(node)?;
        state.set_global_value(values)?;
        Ok(())
    }

    /// Sets the value of the given dynamic property node for one particle.
    /// The value is written on the next tick.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The particle is not in the range table
    ///   ([`AnimationError::UnknownParticle`]).
    /// - The program has no such node ([`AnimationError::UnknownNode`]).
    /// - The node is not a dynamic property.
    /// - The node is global ([`AnimationError::ModeMismatch`]).
    /// - The number of values does not match the property
    ///   ([`AnimationError::ValueLength`]).
    pub fn set_particle_value(
        &mut self,
        node: ParticleNodeID,
        particle_index: usize,
        values: &[f32],
    ) -> Result<()> {
        if self.elements.range_table().get(particle_index).is_none() {
            return Err(AnimationError::UnknownParticle {
                particle: particle_index,
            }
            .into());
        }
        let state = self.dynamic_property_state(node)?;
        state.set_particle_value(particle_index, values)?;
        Ok(())
    }

    /// Replaces the particles of the system. The vertex buffer is recreated
    /// and filled in again on the next tick, and values set for individual
    /// particles are forgotten.
    pub fn rebuild_elements(&mut self, range_table: ParticleRangeTable) {
        self.elements.rebuild(range_table);
        for state in &mut self.states {
            if let StateBehavior::DynamicProperty(property) = state.behavior_mut() {
                property.clear_particle_values();
            }
        }
    }

    /// Uploads the vertex buffer and the constant registers if they changed
    /// since the last upload, and returns what changed in each.
    ///
    /// # Errors
    /// Returns an error if one of the uploaders fails.
    pub fn upload_if_dirty(
        &mut self,
        vertex_uploader: &mut impl VertexBufferUploader,
        constant_uploader: &mut impl ConstantBufferUploader,
    ) -> Result<(BufferChange, BufferChange)> {
        let vertex_change = self.elements.upload_if_dirty(vertex_uploader)?;
        let constant_change = self.constants.upload_if_dirty(constant_uploader)?;
        Ok((vertex_change, constant_change))
    }

    fn dynamic_property_state(
        &mut self,
        node: ParticleNodeID,
    ) -> Result<&mut DynamicPropertyState> {
        let state = self
            .state_mut(node)
            .ok_or(AnimationError::UnknownNode { node })?;
        let kind_name = state.kind_name();
        match state.behavior_mut() {
            StateBehavior::DynamicProperty(property) => Ok(property),
            _ => bail!("Node `{}` has a {} and no settable value", node, kind_name),
        }
    }
}
