//! Compile-time descriptors of particle animation behaviors.

mod billboard;
mod context;
mod dynamic_property;
mod follow;
mod rotate_to_heading;
mod time;
mod uv;

pub use billboard::BillboardNode;
pub use context::NodeCompileContext;
pub use dynamic_property::{DynamicProperty, DynamicPropertyNode};
pub use follow::{FollowNode, FollowPolicy, FollowProperty, PreviousSampleTracking};
pub use rotate_to_heading::RotateToHeadingNode;
pub use time::TimeNode;
pub use uv::{UVAxis, UVNode};

use crate::{codegen::CodeFragment, register::RegisterSlot, set::AnimationSetMetadata};
use anyhow::Result;

stringhash_newtype!(
    /// Identifier for a node in a particle animation set. Wraps the hash of
    /// the node's name.
    [pub] ParticleNodeID
);

stringhash_newtype!(
    /// Identifier for an entity whose transform a follow node tracks.
    [pub] FollowTargetID
);

/// Slot of the attribute register bound to the vertex column of a
/// per-particle node.
pub const STREAM: RegisterSlot = RegisterSlot("stream");

/// Where a node keeps its data.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeMode {
    /// One uniform register shared by all particles, written once per tick.
    Global,
    /// A column of the shared vertex buffer, with a value for each particle.
    PerParticle,
}

/// A particle animation behavior.
#[derive(Clone, Debug, PartialEq)]
pub enum ParticleNode {
    Time(TimeNode),
    Billboard(BillboardNode),
    Follow(FollowNode),
    UV(UVNode),
    RotateToHeading(RotateToHeadingNode),
    DynamicProperty(DynamicPropertyNode),
}

impl ParticleNode {
    pub fn id(&self) -> ParticleNodeID {
        match self {
            Self::Time(_) => TimeNode::ID,
            Self::Billboard(node) => node.id(),
            Self::Follow(node) => node.id(),
            Self::UV(node) => node.id(),
            Self::RotateToHeading(node) => node.id(),
            Self::DynamicProperty(node) => node.id(),
        }
    }

    /// Name of the kind of node, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Time(_) => "TimeNode",
            Self::Billboard(_) => "BillboardNode",
            Self::Follow(_) => "FollowNode",
            Self::UV(_) => "UVNode",
            Self::RotateToHeading(_) => "RotateToHeadingNode",
            Self::DynamicProperty(_) => "DynamicPropertyNode",
        }
    }

    pub fn mode(&self) -> NodeMode {
        match self {
            Self::Time(_) | Self::Follow(_) => NodeMode::PerParticle,
            Self::Billboard(_) | Self::UV(_) | Self::RotateToHeading(_) => NodeMode::Global,
            Self::DynamicProperty(node) => node.mode(),
        }
    }

    /// Number of floats the node contributes to every vertex record. Zero
    /// for global nodes.
    pub fn data_length(&self) -> usize {
        match self {
            Self::Time(_) => TimeNode::DATA_LENGTH,
            Self::Follow(_) => FollowNode::DATA_LENGTH,
            Self::Billboard(_) | Self::UV(_) | Self::RotateToHeading(_) => 0,
            Self::DynamicProperty(node) => match node.mode() {
                NodeMode::Global => 0,
                NodeMode::PerParticle => node.property().n_components(),
            },
        }
    }

    /// Position of the node in the compile order. Nodes with lower priority
    /// are compiled first, and nodes of equal priority keep the order they
    /// were added in.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Time(_) => 0,
            Self::DynamicProperty(_) => 1,
            Self::Follow(_) => 2,
            Self::RotateToHeading(_) => 3,
            Self::Billboard(_) => 4,
            Self::UV(_) => 5,
        }
    }

    /// Announces the facts about this node that other nodes may depend on
    /// when emitting their code.
    pub fn contribute_metadata(&self, metadata: &mut AnimationSetMetadata) {
        match self {
            Self::Time(_) | Self::Follow(_) => {}
            Self::Billboard(node) => node.contribute_metadata(metadata),
            Self::UV(node) => node.contribute_metadata(metadata),
            Self::RotateToHeading(node) => node.contribute_metadata(metadata),
            Self::DynamicProperty(node) => node.contribute_metadata(metadata),
        }
    }

    /// Allocates the registers the node needs and emits its code fragment.
    ///
    /// # Errors
    /// Returns an error if a register pool is exhausted.
    pub fn emit_vertex_code(&self, ctx: &mut NodeCompileContext<'_>) -> Result<CodeFragment> {
        match self {
            Self::Time(node) => node.emit_vertex_code(ctx),
            Self::Billboard(node) => node.emit_vertex_code(ctx),
            Self::Follow(node) => node.emit_vertex_code(ctx),
            Self::UV(node) => node.emit_vertex_code(ctx),
            Self::RotateToHeading(node) => node.emit_vertex_code(ctx),
            Self::DynamicProperty(node) => node.emit_vertex_code(ctx),
        }
    }
}

impl From<TimeNode> for ParticleNode {
    fn from(node: TimeNode) -> Self {
        Self::Time(node)
    }
}

impl From<BillboardNode> for ParticleNode {
    fn from(node: BillboardNode) -> Self {
        Self::Billboard(node)
    }
}

impl From<FollowNode> for ParticleNode {
    fn from(node: FollowNode) -> Self {
        Self::Follow(node)
    }
}

impl From<UVNode> for ParticleNode {
    fn from(node: UVNode) -> Self {
        Self::UV(node)
    }
}

impl From<RotateToHeadingNode> for ParticleNode {
    fn from(node: RotateToHeadingNode) -> Self {
        Self::RotateToHeading(node)
    }
}

impl From<DynamicPropertyNode> for ParticleNode {
    fn from(node: DynamicPropertyNode) -> Self {
        Self::DynamicProperty(node)
    }
}
