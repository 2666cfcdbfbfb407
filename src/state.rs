//! Runtime counterparts of animation nodes.

mod billboard;
mod dynamic_property;
mod follow;
mod rotate_to_heading;
mod time;
mod uv;

pub use billboard::{BillboardState, billboard_rotation};
pub use dynamic_property::DynamicPropertyState;
pub use follow::FollowState;
pub use rotate_to_heading::{RotateToHeadingState, model_view_rotation};
pub use time::TimeState;
pub use uv::UVState;

use crate::{
    animator::TransformSource,
    elements::{AnimationElements, ParticleRange, VertexColumn},
    error::AnimationError,
    node::{
        BillboardNode, DynamicPropertyNode, NodeMode, ParticleNode, ParticleNodeID,
        RotateToHeadingNode, TimeNode, UVNode,
    },
    register::{Register, RegisterSlot},
    set::CompiledAnimationProgram,
    uniform::UniformRegisterWriter,
};
use anyhow::Result;
use std::fmt;

/// The phases an animation state goes through.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Unbound,
    Bound,
    Ticking,
    Disposed,
}

/// Where an animation state is in its life cycle, together with the
/// registers and vertex column it resolved when it was bound.
///
/// A state goes from unbound to bound once, alternates between bound and
/// ticking every frame, and ends disposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateLifecycle {
    Unbound,
    Bound(StateBinding),
    Ticking(StateBinding),
    Disposed,
}

/// The uniform register and vertex column a state writes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateBinding {
    node: ParticleNodeID,
    uniform: Option<(RegisterSlot, Register)>,
    column: Option<VertexColumn>,
}

/// Everything a state needs for one tick.
#[allow(missing_debug_implementations)]
pub struct TickContext<'a> {
    /// The clock time of this tick.
    pub clock: f32,
    /// Time since the previous tick, or [`None`] if there was none.
    pub delta_time: Option<f32>,
    pub elements: &'a mut AnimationElements,
    pub constants: &'a mut dyn UniformRegisterWriter,
    pub transforms: &'a dyn TransformSource,
}

/// The behavior-specific part of an animation state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateBehavior {
    Time(TimeState),
    Billboard(BillboardState),
    Follow(FollowState),
    UV(UVState),
    RotateToHeading(RotateToHeadingState),
    DynamicProperty(DynamicPropertyState),
}

/// Runtime state animating one node of a compiled program for one particle
/// system.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleAnimationState {
    node: ParticleNodeID,
    lifecycle: StateLifecycle,
    behavior: StateBehavior,
}

/// Which uniform register a state needs from the register index map.
#[derive(Copy, Clone, Debug)]
enum UniformRequirement {
    None,
    Required(RegisterSlot),
    IfAllocated(RegisterSlot),
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Bound => "bound",
            Self::Ticking => "ticking",
            Self::Disposed => "disposed",
        };
        write!(f, "{}", name)
    }
}

impl StateLifecycle {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            Self::Unbound => LifecyclePhase::Unbound,
            Self::Bound(_) => LifecyclePhase::Bound,
            Self::Ticking(_) => LifecyclePhase::Ticking,
            Self::Disposed => LifecyclePhase::Disposed,
        }
    }

    pub fn binding(&self) -> Option<&StateBinding> {
        match self {
            Self::Bound(binding) | Self::Ticking(binding) => Some(binding),
            Self::Unbound | Self::Disposed => None,
        }
    }
}

impl StateBinding {
    /// Returns the uniform register of the state.
    ///
    /// # Errors
    /// Returns [`AnimationError::MissingRegister`] if the node has no
    /// uniform register.
    pub fn uniform(&self) -> Result<Register, AnimationError> {
        match self.uniform {
            Some((_, register)) => Ok(register),
            None => Err(AnimationError::MissingRegister {
                node: self.node,
                slot: RegisterSlot("uniform"),
            }),
        }
    }

    /// Returns the uniform register of the state if the node has one.
    pub fn optional_uniform(&self) -> Option<Register> {
        self.uniform.map(|(_, register)| register)
    }

    /// Returns the vertex column of the state.
    ///
    /// # Errors
    /// Returns [`AnimationError::MissingColumn`] if the node has no column.
    pub fn column(&self) -> Result<VertexColumn, AnimationError> {
        self.column
            .ok_or(AnimationError::MissingColumn { node: self.node })
    }
}

impl<'a> TickContext<'a> {
    /// Creates the context for ticking states at the given clock time.
    pub fn new(
        clock: f32,
        elements: &'a mut AnimationElements,
        constants: &'a mut dyn UniformRegisterWriter,
        transforms: &'a dyn TransformSource,
    ) -> Self {
        Self {
            clock,
            delta_time: elements.delta_time(clock),
            elements,
            constants,
            transforms,
        }
    }

    /// Whether per-particle values may be written this tick. Nothing is
    /// written when no time has passed since the previous tick.
    pub fn writes_vertex_data(&self) -> bool {
        self.delta_time != Some(0.0)
    }

    /// If the given particle began its current cycle during this tick,
    /// returns how long ago it did so.
    ///
    /// On the first tick, and after the clock was moved backwards, every
    /// particle counts as having just begun.
    pub fn cycle_start_within_tick(&self, range: &ParticleRange) -> Option<f32> {
        let phase = range.cycle_phase(self.clock);
        match self.delta_time {
            Some(delta_time) if delta_time > 0.0 => (phase <= delta_time).then_some(phase),
            _ => Some(phase),
        }
    }

    /// Whether this is the first tick or the clock was moved backwards.
    pub fn is_restart(&self) -> bool {
        !matches!(self.delta_time, Some(delta_time) if delta_time >= 0.0)
    }
}

impl StateBehavior {
    fn for_node(node: &ParticleNode) -> Self {
        match node {
            ParticleNode::Time(_) => Self::Time(TimeState::new()),
            ParticleNode::Billboard(node) => Self::Billboard(BillboardState::new(node)),
            ParticleNode::Follow(node) => Self::Follow(FollowState::new(node)),
            ParticleNode::UV(node) => Self::UV(UVState::new(node)),
            ParticleNode::RotateToHeading(_) => Self::RotateToHeading(RotateToHeadingState::new()),
            ParticleNode::DynamicProperty(node) => {
                Self::DynamicProperty(DynamicPropertyState::new(node))
            }
        }
    }

    /// Name of the kind of state, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Time(_) => "TimeState",
            Self::Billboard(_) => "BillboardState",
            Self::Follow(_) => "FollowState",
            Self::UV(_) => "UVState",
            Self::RotateToHeading(_) => "RotateToHeadingState",
            Self::DynamicProperty(_) => "DynamicPropertyState",
        }
    }

    fn uniform_requirement(&self) -> UniformRequirement {
        match self {
            Self::Time(_) => UniformRequirement::Required(TimeNode::CLOCK),
            Self::Billboard(_) => UniformRequirement::Required(BillboardNode::MATRIX),
            Self::Follow(_) => UniformRequirement::None,
            Self::UV(_) => UniformRequirement::Required(UVNode::PARAMS),
            Self::RotateToHeading(_) => {
                UniformRequirement::IfAllocated(RotateToHeadingNode::MATRIX)
            }
            Self::DynamicProperty(state) => match state.mode() {
                NodeMode::Global => UniformRequirement::Required(DynamicPropertyNode::VALUE),
                NodeMode::PerParticle => UniformRequirement::None,
            },
        }
    }

    fn tick(&mut self, binding: &StateBinding, ctx: &mut TickContext<'_>) -> Result<(), AnimationError> {
        match self {
            Self::Time(state) => state.tick(binding, ctx),
            Self::Billboard(state) => state.tick(binding, ctx),
            Self::Follow(state) => state.tick(binding, ctx),
            Self::UV(state) => state.tick(binding, ctx),
            Self::RotateToHeading(state) => state.tick(binding, ctx),
            Self::DynamicProperty(state) => state.tick(binding, ctx),
        }
    }
}

impl ParticleAnimationState {
    /// Creates an unbound state for the given node.
    pub fn for_node(node: &ParticleNode) -> Self {
        Self {
            node: node.id(),
            lifecycle: StateLifecycle::Unbound,
            behavior: StateBehavior::for_node(node),
        }
    }

    pub fn node(&self) -> ParticleNodeID {
        self.node
    }

    pub fn lifecycle(&self) -> &StateLifecycle {
        &self.lifecycle
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    pub fn is_disposed(&self) -> bool {
        self.phase() == LifecyclePhase::Disposed
    }

    pub fn behavior(&self) -> &StateBehavior {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut StateBehavior {
        &mut self.behavior
    }

    pub fn kind_name(&self) -> &'static str {
        self.behavior.kind_name()
    }

    /// Resolves the registers and vertex column of the state's node from
    /// the given compiled program.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The state is not unbound ([`AnimationError::IllegalTransition`]).
    /// - The program has no node with the state's name.
    /// - A register or column the state needs is missing from the program.
    pub fn bind(&mut self, program: &CompiledAnimationProgram) -> Result<()> {
        self.check_transition(LifecyclePhase::Unbound, LifecyclePhase::Bound)?;

        let node = program
            .node(self.node)
            .ok_or(AnimationError::UnknownNode { node: self.node })?;

        let uniform = match self.behavior.uniform_requirement() {
            UniformRequirement::None => None,
            UniformRequirement::Required(slot) => {
                Some((slot, program.register_map().register(self.node, slot)?))
            }
            UniformRequirement::IfAllocated(slot) => program
                .register_map()
                .get(self.node, slot)
                .map(|register| (slot, register)),
        };

        let column = match node.mode() {
            NodeMode::Global => None,
            NodeMode::PerParticle => Some(
                program
                    .layout()
                    .column(self.node)
                    .ok_or(AnimationError::MissingColumn { node: self.node })?,
            ),
        };

        self.lifecycle = StateLifecycle::Bound(StateBinding {
            node: self.node,
            uniform,
            column,
        });
        log::debug!("Bound {} for node `{}`", self.kind_name(), self.node);
        Ok(())
    }

    /// Advances the state to the clock time of the given context, writing
    /// its uniform register or vertex column.
    ///
    /// # Errors
    /// Returns an error if the state is unbound or disposed.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<()> {
        let binding = match self.lifecycle {
            StateLifecycle::Bound(binding) => binding,
            StateLifecycle::Unbound => {
                return Err(AnimationError::UnboundState {
                    node: self.node,
                    state: self.kind_name(),
                }
                .into());
            }
            StateLifecycle::Disposed => {
                return Err(AnimationError::DisposedState {
                    node: self.node,
                    state: self.kind_name(),
                }
                .into());
            }
            StateLifecycle::Ticking(_) => {
                return Err(self
                    .illegal_transition(LifecyclePhase::Ticking, LifecyclePhase::Ticking)
                    .into());
            }
        };

        log::trace!(
            "Ticking {} for node `{}` at t = {}",
            self.kind_name(),
            self.node,
            ctx.clock
        );

        self.lifecycle = StateLifecycle::Ticking(binding);
        let result = self.behavior.tick(&binding, ctx);
        self.lifecycle = StateLifecycle::Bound(binding);

        result?;
        Ok(())
    }

    /// Detaches the state. A disposed state never writes again.
    ///
    /// # Errors
    /// Returns [`AnimationError::IllegalTransition`] if the state is already
    /// disposed.
    pub fn dispose(&mut self) -> Result<()> {
        match self.lifecycle {
            StateLifecycle::Disposed => {
                return Err(self
                    .illegal_transition(LifecyclePhase::Disposed, LifecyclePhase::Disposed)
                    .into());
            }
            StateLifecycle::Unbound => {
                log::warn!(
                    "Disposing {} for node `{}` that was never bound",
                    self.kind_name(),
                    self.node
                );
            }
            StateLifecycle::Bound(_) | StateLifecycle::Ticking(_) => {
                log::debug!("Disposing {} for node `{}`", self.kind_name(), self.node);
            }
        }
        self.lifecycle = StateLifecycle::Disposed;
        Ok(())
    }

    fn check_transition(
        &self,
        required: LifecyclePhase,
        to: LifecyclePhase,
    ) -> Result<(), AnimationError> {
        let from = self.phase();
        if from == required {
            Ok(())
        } else {
            Err(self.illegal_transition(from, to))
        }
    }

    fn illegal_transition(&self, from: LifecyclePhase, to: LifecyclePhase) -> AnimationError {
        AnimationError::IllegalTransition {
            node: self.node,
            state: self.kind_name(),
            from,
            to,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        animator::TransformSnapshot,
        elements::{ParticleDescriptor, ParticleRangeTable},
        node::{FollowNode, FollowPolicy, FollowProperty, FollowTargetID},
        register::{RegisterAllocator, RegisterLimits},
        set::ParticleAnimationSet,
        uniform::VertexConstantData,
    };

    /// Uniform writer recording every write.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingWriter {
        pub(crate) writes: Vec<(Register, [f32; 4])>,
    }

    impl UniformRegisterWriter for RecordingWriter {
        fn write_constant(&mut self, register: Register, values: [f32; 4]) {
            self.writes.push((register, values));
        }
    }

    pub(crate) fn quads(timings: &[(f32, f32)]) -> ParticleRangeTable {
        ParticleRangeTable::from_vertex_counts(timings.iter().map(|&(start_time, total_time)| {
            ParticleDescriptor {
                n_vertices: 4,
                start_time,
                total_time,
            }
        }))
        .unwrap()
    }

    fn follow_set() -> CompiledAnimationProgram {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(FollowNode::new(
            "follow",
            FollowTargetID::from_name("target"),
            FollowProperty::Position,
            FollowPolicy::Discrete,
        ))
        .unwrap();
        set.compile(RegisterAllocator::new(RegisterLimits::default()))
            .unwrap()
    }

    fn follow_state(program: &CompiledAnimationProgram) -> ParticleAnimationState {
        ParticleAnimationState::for_node(
            program
                .node(ParticleNodeID::from_name("follow"))
                .unwrap(),
        )
    }

    fn error_of(result: Result<()>) -> AnimationError {
        result
            .unwrap_err()
            .downcast::<AnimationError>()
            .unwrap()
    }

    #[test]
    fn binding_resolves_column_and_uniform() {
        let program = follow_set();

        let mut follow = follow_state(&program);
        follow.bind(&program).unwrap();
        let binding = follow.lifecycle().binding().unwrap();
        assert_eq!(binding.column().unwrap().range(), 2..5);
        assert!(binding.optional_uniform().is_none());

        let mut time = ParticleAnimationState::for_node(program.node(TimeNode::ID).unwrap());
        time.bind(&program).unwrap();
        let binding = time.lifecycle().binding().unwrap();
        assert_eq!(
            binding.uniform().unwrap(),
            program
                .register_map()
                .get(TimeNode::ID, TimeNode::CLOCK)
                .unwrap()
        );
    }

    #[test]
    fn binding_twice_is_an_illegal_transition() {
        let program = follow_set();
        let mut state = follow_state(&program);
        state.bind(&program).unwrap();
        assert_eq!(
            error_of(state.bind(&program)),
            AnimationError::IllegalTransition {
                node: ParticleNodeID::from_name("follow"),
                state: "FollowState",
                from: LifecyclePhase::Bound,
                to: LifecyclePhase::Bound,
            }
        );
    }

    #[test]
    fn binding_to_program_without_node_fails() {
        let program = follow_set();
        let other = ParticleAnimationSet::new(true)
            .compile(RegisterAllocator::new(RegisterLimits::default()))
            .unwrap();
        let mut state = follow_state(&program);
        assert!(matches!(
            error_of(state.bind(&other)),
            AnimationError::UnknownNode { .. }
        ));
        assert_eq!(state.phase(), LifecyclePhase::Unbound);
    }

    #[test]
    fn ticking_unbound_or_disposed_state_fails() {
        let program = follow_set();
        let mut elements = AnimationElements::for_layout(program.layout(), quads(&[(0.0, 1.0)]));
        let mut constants = VertexConstantData::new(program.usage(), program.reserved());
        let transforms = TransformSnapshot::new();

        let mut state = follow_state(&program);
        {
            let mut ctx = TickContext::new(0.5, &mut elements, &mut constants, &transforms);
            assert!(matches!(
                error_of(state.tick(&mut ctx)),
                AnimationError::UnboundState { state: "FollowState", .. }
            ));
        }

        state.bind(&program).unwrap();
        {
            let mut ctx = TickContext::new(0.5, &mut elements, &mut constants, &transforms);
            state.tick(&mut ctx).unwrap();
        }
        assert_eq!(state.phase(), LifecyclePhase::Bound);

        state.dispose().unwrap();
        let mut ctx = TickContext::new(1.0, &mut elements, &mut constants, &transforms);
        assert!(matches!(
            error_of(state.tick(&mut ctx)),
            AnimationError::DisposedState { .. }
        ));
    }

    #[test]
    fn disposing_twice_is_an_illegal_transition() {
        let program = follow_set();
        let mut state = follow_state(&program);
        state.dispose().unwrap();
        assert!(matches!(
            error_of(state.dispose()),
            AnimationError::IllegalTransition {
                from: LifecyclePhase::Disposed,
                ..
            }
        ));
    }

    #[test]
    fn disposed_state_cannot_be_bound() {
        let program = follow_set();
        let mut state = follow_state(&program);
        state.dispose().unwrap();
        assert!(matches!(
            error_of(state.bind(&program)),
            AnimationError::IllegalTransition {
                from: LifecyclePhase::Disposed,
                to: LifecyclePhase::Bound,
                ..
            }
        ));
    }

    #[test]
    fn particles_are_eligible_when_cycle_began_within_tick() {
        let table = quads(&[(0.0, 1.0), (0.5, 1.0)]);
        let mut elements = AnimationElements::new(3, table.clone());
        let mut constants = RecordingWriter::default();
        let transforms = TransformSnapshot::new();

        let ctx = TickContext::new(2.1, &mut elements, &mut constants, &transforms);
        assert!(ctx.is_restart());
        assert!(ctx.cycle_start_within_tick(&table.ranges()[1]).is_some());

        elements.advance_time(2.0);
        let ctx = TickContext::new(2.2, &mut elements, &mut constants, &transforms);
        let phase = ctx.cycle_start_within_tick(&table.ranges()[0]).unwrap();
        approx::assert_abs_diff_eq!(phase, 0.2, epsilon = 1e-5);
        assert!(ctx.cycle_start_within_tick(&table.ranges()[1]).is_none());
    }
}
