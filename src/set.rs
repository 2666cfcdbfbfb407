//! Animation sets and their compilation into vertex programs.

mod metadata;
mod shared;

pub use metadata::{AnimationSetMetadata, MetadataKey};
pub use shared::{COMMON_CONSTANTS, SharedRegisters};

use crate::{
    codegen::CodeFragment,
    elements::{VertexColumn, VertexLayout},
    error::AnimationError,
    node::{NodeCompileContext, NodeMode, ParticleNode, ParticleNodeID, STREAM, TimeNode},
    register::{Register, RegisterAllocator, RegisterIndexMap, RegisterUsage, ReservedRegisters},
    uniform::{UniformRegisterWriter, VertexConstantData},
};
use anyhow::Result;

/// The nodes animating one kind of particle system.
///
/// Nodes are kept in compile order: by priority, and in the order they were
/// added among nodes of equal priority. A time node is always present.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleAnimationSet {
    looping: bool,
    nodes: Vec<ParticleNode>,
}

/// Binding of a per-particle node's vertex column to the attribute register
/// the node reads it through.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexStream {
    pub node: ParticleNodeID,
    pub attribute: Register,
    pub column: VertexColumn,
}

/// Everything produced by compiling a [`ParticleAnimationSet`]: the vertex
/// program code, the registers assigned to every node and the layout of the
/// shared vertex buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledAnimationProgram {
    nodes: Vec<ParticleNode>,
    looping: bool,
    vertex_code: CodeFragment,
    node_fragments: Vec<(ParticleNodeID, CodeFragment)>,
    register_map: RegisterIndexMap,
    shared: SharedRegisters,
    metadata: AnimationSetMetadata,
    layout: VertexLayout,
    streams: Vec<VertexStream>,
    usage: RegisterUsage,
    reserved: ReservedRegisters,
}

impl ParticleAnimationSet {
    /// Identifies the set itself in errors about the shared registers.
    pub const PROGRAM_ID: ParticleNodeID = ParticleNodeID::literal("particle_program");

    /// Creates a set containing only the time node.
    pub fn new(looping: bool) -> Self {
        Self {
            looping,
            nodes: vec![ParticleNode::Time(TimeNode::new())],
        }
    }

    /// Whether particles restart when their cycle ends.
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Returns the nodes in compile order.
    pub fn nodes(&self) -> &[ParticleNode] {
        &self.nodes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: ParticleNodeID) -> Option<&ParticleNode> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn has_node(&self, id: ParticleNodeID) -> bool {
        self.node(id).is_some()
    }

    /// Adds the given node to the set, after every node whose priority is
    /// not higher.
    ///
    /// # Errors
    /// Returns [`AnimationError::DuplicateNode`] if the set already has a
    /// node with the same name.
    pub fn add_node(&mut self, node: impl Into<ParticleNode>) -> Result<()> {
        let node = node.into();
        let id = node.id();
        if self.has_node(id) {
            return Err(AnimationError::DuplicateNode { node: id }.into());
        }

        let priority = node.priority();
        let position = self
            .nodes
            .iter()
            .position(|existing| existing.priority() > priority)
            .unwrap_or(self.nodes.len());

        log::debug!(
            "Adding {} `{}` to particle animation set at position {}",
            node.kind_name(),
            id,
            position
        );
        self.nodes.insert(position, node);
        Ok(())
    }

    /// Compiles the set using the given allocator, which must not have
    /// served any requests yet. The allocator is consumed so that its
    /// registers cannot leak into another pass.
    ///
    /// Either the complete program is returned or nothing is.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The allocator has already been used ([`AnimationError::AllocatorAlreadyUsed`]).
    /// - A register pool is exhausted ([`AnimationError::PoolExhausted`]).
    pub fn compile(&self, mut allocator: RegisterAllocator) -> Result<CompiledAnimationProgram> {
        with_debug_logging!(
            "Compiling particle animation set with {} nodes", self.nodes.len();
            self.compile_with(&mut allocator)
        )
    }

    fn compile_with(&self, allocator: &mut RegisterAllocator) -> Result<CompiledAnimationProgram> {
        if !allocator.is_fresh() {
            return Err(AnimationError::AllocatorAlreadyUsed.into());
        }

        let mut metadata = AnimationSetMetadata::new();
        for node in &self.nodes {
            node.contribute_metadata(&mut metadata);
        }

        let shared = SharedRegisters::allocate(allocator, &metadata).map_err(|err| {
            AnimationError::PoolExhausted {
                node: Self::PROGRAM_ID,
                kind: err.kind,
                limit: err.limit,
            }
        })?;

        // Every node holds one usage of each shared temp
        let n_consumers = self.nodes.len() as u32;
        for temp in shared.temps() {
            allocator.add_usage(temp, n_consumers);
        }

        let mut register_map = RegisterIndexMap::new();
        let mut layout = VertexLayout::new();
        let mut vertex_code = shared.prologue()?;
        let mut node_fragments = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let id = node.id();
            let mut ctx = NodeCompileContext::new(
                id,
                &mut *allocator,
                &mut register_map,
                &shared,
                &metadata,
                self.looping,
            );
            let fragment = node.emit_vertex_code(&mut ctx)?;
            let n_registers = ctx.finish();

            if node.mode() == NodeMode::PerParticle {
                layout.push_column(id, node.data_length());
            }

            log::debug!(
                "{} `{}` emitted {} instructions using {} registers",
                node.kind_name(),
                id,
                fragment.n_instructions(),
                n_registers
            );

            vertex_code.append(&fragment);
            node_fragments.push((id, fragment));
        }

        vertex_code.append(&shared.epilogue()?);

        for temp in shared.temps() {
            allocator.release(temp);
        }

        let streams = layout
            .columns()
            .iter()
            .map(|&(node, column)| {
                register_map
                    .register(node, STREAM)
                    .map(|attribute| VertexStream {
                        node,
                        attribute,
                        column,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledAnimationProgram {
            nodes: self.nodes.clone(),
            looping: self.looping,
            vertex_code,
            node_fragments,
            register_map,
            shared,
            metadata,
            layout,
            streams,
            usage: allocator.usage(),
            reserved: *allocator.reserved(),
        })
    }
}

impl CompiledAnimationProgram {
    /// Returns the compiled nodes in compile order.
    pub fn nodes(&self) -> &[ParticleNode] {
        &self.nodes
    }

    pub fn node(&self, id: ParticleNodeID) -> Option<&ParticleNode> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// The complete vertex program: the prologue, every node's fragment in
    /// compile order and the epilogue.
    pub fn vertex_code(&self) -> &CodeFragment {
        &self.vertex_code
    }

    /// Returns the fragment emitted by the given node.
    pub fn node_fragment(&self, id: ParticleNodeID) -> Option<&CodeFragment> {
        self.node_fragments
            .iter()
            .find(|(node, _)| *node == id)
            .map(|(_, fragment)| fragment)
    }

    pub fn register_map(&self) -> &RegisterIndexMap {
        &self.register_map
    }

    pub fn shared(&self) -> &SharedRegisters {
        &self.shared
    }

    pub fn metadata(&self) -> &AnimationSetMetadata {
        &self.metadata
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Returns the attribute bindings of the per-particle columns.
    pub fn streams(&self) -> &[VertexStream] {
        &self.streams
    }

    pub fn usage(&self) -> &RegisterUsage {
        &self.usage
    }

    pub fn reserved(&self) -> &ReservedRegisters {
        &self.reserved
    }

    /// Creates the constant register data for the program, with the common
    /// constants filled in and everything else zeroed.
    pub fn initial_constant_data(&self) -> VertexConstantData {
        let mut constants = VertexConstantData::new(&self.usage, &self.reserved);
        constants.write_constant(self.shared.common_constants, COMMON_CONSTANTS);
        constants
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        node::{
            BillboardNode, DynamicProperty, DynamicPropertyNode, FollowNode, FollowPolicy,
            FollowProperty, FollowTargetID, RotateToHeadingNode, UVAxis, UVNode,
        },
        register::{RegisterKind, RegisterLimits},
    };
    use proptest::prelude::*;

    fn follow_node(name: &str, property: FollowProperty) -> FollowNode {
        FollowNode::new(
            name,
            FollowTargetID::from_name("target"),
            property,
            FollowPolicy::Discrete,
        )
    }

    fn allocator() -> RegisterAllocator {
        RegisterAllocator::new(RegisterLimits::default())
    }

    fn node_names(set: &ParticleAnimationSet) -> Vec<String> {
        set.nodes().iter().map(|node| node.id().to_string()).collect()
    }

    #[test]
    fn new_set_contains_only_time_node() {
        let set = ParticleAnimationSet::new(true);
        assert_eq!(set.n_nodes(), 1);
        assert!(set.has_node(TimeNode::ID));
    }

    #[test]
    fn nodes_are_ordered_by_priority_then_insertion() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(UVNode::new(UVAxis::U, 1.0, 0.1)).unwrap();
        set.add_node(BillboardNode::new()).unwrap();
        set.add_node(follow_node("follow_a", FollowProperty::Position))
            .unwrap();
        set.add_node(follow_node("follow_b", FollowProperty::Position))
            .unwrap();

        assert_eq!(
            node_names(&set),
            ["time", "follow_a", "follow_b", "billboard", "uv"]
        );
    }

    #[test]
    fn adding_node_with_existing_name_fails() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(BillboardNode::new()).unwrap();
        let error = set.add_node(BillboardNode::new()).unwrap_err();
        assert_eq!(
            error.downcast_ref::<AnimationError>(),
            Some(&AnimationError::DuplicateNode {
                node: ParticleNodeID::from_name("billboard")
            })
        );
        assert_eq!(set.n_nodes(), 2);
    }

    #[test]
    fn minimal_set_compiles_time_code() {
        let program = ParticleAnimationSet::new(true)
            .compile(allocator())
            .unwrap();

        assert_eq!(
            program.register_map().get(TimeNode::ID, TimeNode::CLOCK),
            Some(Register::new(RegisterKind::Constant, 1))
        );
        assert_eq!(
            program.node_fragment(TimeNode::ID).unwrap().lines(),
            [
                "sub vt2.x, vc1.x, va1.x",
                "sge vt3.x, vt2.x, vc0.x",
                "mul vt0.xyz, vt0.xyz, vt3.x",
                "div vt3.x, vt2.x, va1.y",
                "frc vt3.x, vt3.x",
                "mul vt2.x, vt3.x, va1.y",
                "div vt2.y, vt2.x, va1.y",
            ]
        );
        assert_eq!(program.layout().stride(), 2);
        assert_eq!(
            program.streams(),
            [VertexStream {
                node: TimeNode::ID,
                attribute: Register::new(RegisterKind::Attribute, 1),
                column: VertexColumn::new(0, 2),
            }]
        );

        let code = program.vertex_code().lines();
        assert_eq!(code.first().unwrap(), "mov vt0, va0");
        assert_eq!(code.last().unwrap(), "add vt0.xyz, vt0.xyz, vt1.xyz");
    }

    #[test]
    fn non_looping_set_hides_expired_particles() {
        let program = ParticleAnimationSet::new(false)
            .compile(allocator())
            .unwrap();
        let lines = program.node_fragment(TimeNode::ID).unwrap().lines();
        assert!(lines.iter().any(|line| line.starts_with("slt")));
        assert!(!lines.iter().any(|line| line.starts_with("frc")));
    }

    #[test]
    fn per_particle_columns_are_laid_out_in_compile_order() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(follow_node("follow", FollowProperty::Position))
            .unwrap();
        set.add_node(DynamicPropertyNode::new(
            "scale",
            DynamicProperty::Scale,
            NodeMode::PerParticle,
        ))
        .unwrap();
        set.add_node(BillboardNode::new()).unwrap();

        let program = set.compile(allocator()).unwrap();
        let layout = program.layout();

        assert_eq!(layout.stride(), 6);
        assert_eq!(layout.column(TimeNode::ID).unwrap().range(), 0..2);
        assert_eq!(
            layout
                .column(ParticleNodeID::from_name("scale"))
                .unwrap()
                .range(),
            2..3
        );
        assert_eq!(
            layout
                .column(ParticleNodeID::from_name("follow"))
                .unwrap()
                .range(),
            3..6
        );
        assert!(
            layout
                .column(ParticleNodeID::from_name("billboard"))
                .is_none()
        );
    }

    #[test]
    fn billboard_matrix_occupies_three_consecutive_constants() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(BillboardNode::new()).unwrap();
        let program = set.compile(allocator()).unwrap();

        let matrix = program
            .register_map()
            .get(ParticleNodeID::from_name("billboard"), BillboardNode::MATRIX)
            .unwrap();
        assert_eq!(matrix, Register::new(RegisterKind::Constant, 2));
        assert_eq!(program.usage().constants, 5);
        assert!(program.metadata().has(MetadataKey::HAS_BILLBOARD));
    }

    #[test]
    fn heading_matrix_is_only_allocated_with_billboard() {
        let heading = ParticleNodeID::from_name("rotate_to_heading");

        let mut set = ParticleAnimationSet::new(true);
        set.add_node(RotateToHeadingNode::new()).unwrap();
        let program = set.compile(allocator()).unwrap();
        assert!(
            program
                .register_map()
                .get(heading, RotateToHeadingNode::MATRIX)
                .is_none()
        );
        assert!(program.shared().velocity_target.is_some());
        assert!(
            program.node_fragment(heading).unwrap().lines()[0].starts_with("nrm")
        );

        set.add_node(BillboardNode::new()).unwrap();
        let program = set.compile(allocator()).unwrap();
        assert!(
            program
                .register_map()
                .get(heading, RotateToHeadingNode::MATRIX)
                .is_some()
        );
        assert!(
            program.node_fragment(heading).unwrap().lines()[0].starts_with("m33")
        );
    }

    #[test]
    fn uv_node_writes_uv_varying() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(UVNode::new(UVAxis::V, 2.0, 0.25)).unwrap();
        let program = set.compile(allocator()).unwrap();

        let uv_varying = program.shared().uv_varying.unwrap();
        assert_eq!(
            program.vertex_code().lines().last().unwrap(),
            &format!("mov {}, {}", uv_varying, program.shared().uv_target.unwrap())
        );
        let uv_lines = program
            .node_fragment(ParticleNodeID::from_name("uv"))
            .unwrap()
            .lines();
        assert!(uv_lines.last().unwrap().contains(".y"));
    }

    #[test]
    fn scratch_temps_are_reused_across_nodes_but_never_alias_shared_temps() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(follow_node("spin", FollowProperty::Rotation))
            .unwrap();
        let program = set.compile(allocator()).unwrap();

        let lines = program
            .node_fragment(ParticleNodeID::from_name("spin"))
            .unwrap()
            .lines();
        assert_eq!(lines[0], "sin vt3.xyz, va2.xyz");
        assert_eq!(lines[1], "cos vt4.xyz, va2.xyz");
        assert_eq!(lines[2], "mul vt5.x, vt0.y, vt4.x");
        assert_eq!(program.usage().peak_temps, 6);
    }

    #[test]
    fn every_temp_is_released_after_compiling() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(follow_node("spin", FollowProperty::Rotation))
            .unwrap();
        set.add_node(UVNode::new(UVAxis::U, 1.0, 1.0)).unwrap();

        let mut allocator = allocator();
        set.compile_with(&mut allocator).unwrap();
        assert_eq!(allocator.n_live_temps(), 0);
    }

    #[test]
    fn exhausted_pool_names_node_and_kind() {
        let mut set = ParticleAnimationSet::new(true);
        set.add_node(follow_node("spin", FollowProperty::Rotation))
            .unwrap();
        let limits = RegisterLimits {
            temps: 5,
            ..Default::default()
        };

        let error = set
            .compile(RegisterAllocator::new(limits))
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<AnimationError>(),
            Some(&AnimationError::PoolExhausted {
                node: ParticleNodeID::from_name("spin"),
                kind: RegisterKind::Temp,
                limit: 5,
            })
        );
        assert!(error.to_string().contains("spin"));
    }

    #[test]
    fn exhausted_pool_for_shared_registers_names_program() {
        let limits = RegisterLimits {
            attributes: 0,
            ..Default::default()
        };
        let error = ParticleAnimationSet::new(true)
            .compile(RegisterAllocator::new(limits))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<AnimationError>(),
            Some(AnimationError::PoolExhausted {
                kind: RegisterKind::Attribute,
                ..
            })
        ));
    }

    #[test]
    fn compiling_with_used_allocator_fails() {
        let mut allocator = allocator();
        allocator.allocate(RegisterKind::Constant).unwrap();
        let error = ParticleAnimationSet::new(true)
            .compile(allocator)
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<AnimationError>(),
            Some(&AnimationError::AllocatorAlreadyUsed)
        );
    }

    #[test]
    fn reserved_registers_are_skipped() {
        let allocator = RegisterAllocator::with_reserved(
            RegisterLimits::default(),
            ReservedRegisters {
                constants: 4,
                attributes: 1,
            },
        );
        let program = ParticleAnimationSet::new(true).compile(allocator).unwrap();
        assert_eq!(program.shared().position_source.index(), 1);
        assert_eq!(program.shared().common_constants.index(), 4);

        let constants = program.initial_constant_data();
        assert_eq!(constants.first_register(), 4);
        assert_eq!(
            constants.get(program.shared().common_constants),
            Some(COMMON_CONSTANTS)
        );
    }

    fn node_strategy() -> impl Strategy<Value = ParticleNode> {
        prop_oneof![
            Just(ParticleNode::from(BillboardNode::new())),
            Just(ParticleNode::from(UVNode::new(UVAxis::U, 1.0, 0.5))),
            Just(ParticleNode::from(RotateToHeadingNode::new())),
            Just(ParticleNode::from(follow_node("follow", FollowProperty::Position))),
            Just(ParticleNode::from(follow_node("spin", FollowProperty::Rotation))),
            Just(ParticleNode::from(DynamicPropertyNode::new(
                "velocity",
                DynamicProperty::Velocity,
                NodeMode::PerParticle
            ))),
            Just(ParticleNode::from(DynamicPropertyNode::new(
                "scale",
                DynamicProperty::Scale,
                NodeMode::Global
            ))),
        ]
    }

    proptest! {
        #[test]
        fn compiling_same_set_twice_gives_identical_programs(
            nodes in prop::collection::vec(node_strategy(), 0..8),
            looping in any::<bool>(),
        ) {
            let mut set = ParticleAnimationSet::new(looping);
            for node in nodes {
                // Repeated nodes are rejected, which is fine here
                let _ = set.add_node(node);
            }

            let first = set.compile(allocator());
            let second = set.compile(allocator());

            match (first, second) {
                (Ok(first), Ok(second)) => prop_assert_eq!(first, second),
                (Err(first), Err(second)) => {
                    prop_assert_eq!(first.to_string(), second.to_string());
                }
                _ => prop_assert!(false, "Compiling twice gave different outcomes"),
            }
        }
    }
}
