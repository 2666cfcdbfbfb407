//! Configuration of register limits and declarative animation sets.

use crate::{
    node::{
        BillboardNode, DynamicProperty, DynamicPropertyNode, FollowNode, FollowPolicy,
        FollowProperty, FollowTargetID, NodeMode, ParticleNode, PreviousSampleTracking,
        RotateToHeadingNode, UVAxis, UVNode,
    },
    register::{RegisterAllocator, RegisterLimits, ReservedRegisters},
    set::ParticleAnimationSet,
};
use anyhow::Result;
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use std::path::Path;

/// Register budget of the program host.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticleAnimationConfig {
    pub register_limits: RegisterLimits,
    pub reserved_registers: ReservedRegisters,
}

/// Declarative description of an animation set. The time node is always
/// present and is not listed.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationSetConfig {
    pub looping: bool,
    pub nodes: Vec<ParticleNodeConfig>,
}

/// Declarative description of one animation node. Nodes without a name get
/// the default name of their kind.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum ParticleNodeConfig {
    Billboard {
        #[cfg_attr(feature = "serde", serde(default))]
        name: Option<String>,
        #[cfg_attr(feature = "serde", serde(default))]
        axis: Option<Vector3<f32>>,
    },
    Follow {
        name: String,
        target: String,
        property: FollowProperty,
        #[cfg_attr(feature = "serde", serde(default))]
        policy: FollowPolicy,
        #[cfg_attr(feature = "serde", serde(default))]
        tracking: PreviousSampleTracking,
    },
    UV {
        #[cfg_attr(feature = "serde", serde(default))]
        name: Option<String>,
        axis: UVAxis,
        cycle_duration: f32,
        scale: f32,
    },
    RotateToHeading {
        #[cfg_attr(feature = "serde", serde(default))]
        name: Option<String>,
    },
    DynamicProperty {
        name: String,
        property: DynamicProperty,
        mode: NodeMode,
    },
}

impl ParticleAnimationConfig {
    /// Creates a fresh register allocator with the configured limits and
    /// reserved registers.
    pub fn allocator(&self) -> RegisterAllocator {
        RegisterAllocator::with_reserved(self.register_limits, self.reserved_registers)
    }

    /// Parses the configuration from the RON file at the given path.
    #[cfg(feature = "serde")]
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        parse_ron_file(file_path)
    }
}

impl AnimationSetConfig {
    /// Builds the described animation set.
    ///
    /// # Errors
    /// Returns [`AnimationError::DuplicateNode`](crate::error::AnimationError::DuplicateNode)
    /// if two nodes have the same name.
    pub fn build(&self) -> Result<ParticleAnimationSet> {
        let mut set = ParticleAnimationSet::new(self.looping);
        for node in &self.nodes {
            set.add_node(node.to_node())?;
        }
        Ok(set)
    }

    /// Parses the description from the RON file at the given path.
    #[cfg(feature = "serde")]
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        parse_ron_file(file_path)
    }
}

impl Default for AnimationSetConfig {
    fn default() -> Self {
        Self {
            looping: true,
            nodes: Vec::new(),
        }
    }
}

impl ParticleNodeConfig {
    /// Creates the described node.
    pub fn to_node(&self) -> ParticleNode {
        match self {
            Self::Billboard { name, axis } => match name {
                Some(name) => BillboardNode::named(name, *axis),
                None => match axis {
                    Some(axis) => BillboardNode::with_axis(*axis),
                    None => BillboardNode::new(),
                },
            }
            .into(),
            Self::Follow {
                name,
                target,
                property,
                policy,
                tracking,
            } => FollowNode::new(name, FollowTargetID::from_name(target), *property, *policy)
                .with_tracking(*tracking)
                .into(),
            Self::UV {
                name,
                axis,
                cycle_duration,
                scale,
            } => match name {
                Some(name) => UVNode::named(name, *axis, *cycle_duration, *scale),
                None => UVNode::new(*axis, *cycle_duration, *scale),
            }
            .into(),
            Self::RotateToHeading { name } => match name {
                Some(name) => RotateToHeadingNode::named(name),
                None => RotateToHeadingNode::new(),
            }
            .into(),
            Self::DynamicProperty {
                name,
                property,
                mode,
            } => DynamicPropertyNode::new(name, *property, *mode).into(),
        }
    }
}

#[cfg(feature = "serde")]
fn parse_ron_file<T>(file_path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    use anyhow::Context;

    let file_path = file_path.as_ref();

    let text = std::fs::read_to_string(file_path)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    ron::from_str::<T>(&text)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        error::AnimationError,
        node::{ParticleNodeID, TimeNode},
    };

    fn trail_config() -> AnimationSetConfig {
        AnimationSetConfig {
            looping: false,
            nodes: vec![
                ParticleNodeConfig::UV {
                    name: None,
                    axis: UVAxis::V,
                    cycle_duration: 2.0,
                    scale: 0.1,
                },
                ParticleNodeConfig::Follow {
                    name: "trail".to_string(),
                    target: "emitter".to_string(),
                    property: FollowProperty::Position,
                    policy: FollowPolicy::Smoothed,
                    tracking: PreviousSampleTracking::PerTick,
                },
                ParticleNodeConfig::Billboard {
                    name: None,
                    axis: Some(Vector3::y()),
                },
            ],
        }
    }

    #[test]
    fn building_set_orders_nodes_after_time_node() {
        let set = trail_config().build().unwrap();
        let ids: Vec<_> = set.nodes().iter().map(ParticleNode::id).collect();
        assert_eq!(
            ids,
            [
                TimeNode::ID,
                ParticleNodeID::from_name("trail"),
                ParticleNodeID::from_name("billboard"),
                ParticleNodeID::from_name("uv"),
            ]
        );
        assert!(!set.looping());
    }

    #[test]
    fn building_set_with_duplicate_names_fails() {
        let config = AnimationSetConfig {
            looping: true,
            nodes: vec![
                ParticleNodeConfig::RotateToHeading { name: None },
                ParticleNodeConfig::RotateToHeading { name: None },
            ],
        };
        let error = config.build().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<AnimationError>(),
            Some(AnimationError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn configured_allocator_skips_reserved_registers() {
        let config = ParticleAnimationConfig {
            register_limits: RegisterLimits::default(),
            reserved_registers: ReservedRegisters {
                constants: 4,
                attributes: 1,
            },
        };
        let program = trail_config()
            .build()
            .unwrap()
            .compile(config.allocator())
            .unwrap();
        assert_eq!(program.reserved(), &config.reserved_registers);
        assert_eq!(program.shared().position_source.index(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn animation_set_config_parses_from_ron() {
        let config: AnimationSetConfig = ron::from_str(
            r#"(
                looping: true,
                nodes: [
                    Follow(name: "spin", target: "ship", property: Rotation),
                    DynamicProperty(name: "size", property: Scale, mode: PerParticle),
                    RotateToHeading(name: Some("heading")),
                ],
            )"#,
        )
        .unwrap();

        assert_eq!(
            config.nodes[0],
            ParticleNodeConfig::Follow {
                name: "spin".to_string(),
                target: "ship".to_string(),
                property: FollowProperty::Rotation,
                policy: FollowPolicy::Discrete,
                tracking: PreviousSampleTracking::PerTick,
            }
        );
        assert_eq!(config.build().unwrap().n_nodes(), 4);
    }

    #[test]
    fn configured_follow_tracking_reaches_the_node() {
        let config = ParticleNodeConfig::Follow {
            name: "spin".to_string(),
            target: "ship".to_string(),
            property: FollowProperty::Rotation,
            policy: FollowPolicy::Smoothed,
            tracking: PreviousSampleTracking::Frozen,
        };
        match config.to_node() {
            ParticleNode::Follow(node) => {
                assert_eq!(node.tracking(), PreviousSampleTracking::Frozen);
                assert_eq!(node.policy(), FollowPolicy::Smoothed);
            }
            node => panic!("Expected a follow node, got {:?}", node),
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn follow_tracking_parses_from_ron() {
        let config: ParticleNodeConfig = ron::from_str(
            r#"Follow(name: "spin", target: "ship", property: Rotation, policy: Smoothed, tracking: Frozen)"#,
        )
        .unwrap();
        assert!(matches!(
            config,
            ParticleNodeConfig::Follow {
                tracking: PreviousSampleTracking::Frozen,
                ..
            }
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn missing_fields_take_default_values() {
        let config: ParticleAnimationConfig =
            ron::from_str("(reserved_registers: (constants: 8))").unwrap();
        assert_eq!(config.register_limits, RegisterLimits::default());
        assert_eq!(config.reserved_registers.constants, 8);
        assert_eq!(config.reserved_registers.attributes, 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn configs_are_read_from_ron_files() {
        let directory = std::env::temp_dir().join(format!(
            "impact_particle_config_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&directory).unwrap();

        let set_path = directory.join("set.ron");
        std::fs::write(&set_path, ron::to_string(&trail_config()).unwrap()).unwrap();
        assert_eq!(
            AnimationSetConfig::from_ron_file(&set_path).unwrap(),
            trail_config()
        );

        let broken_path = directory.join("broken.ron");
        std::fs::write(&broken_path, "(register_limits: ").unwrap();
        let error = ParticleAnimationConfig::from_ron_file(&broken_path).unwrap_err();
        assert!(error.to_string().starts_with("Invalid syntax in"));

        assert!(ParticleAnimationConfig::from_ron_file(directory.join("missing.ron")).is_err());

        std::fs::remove_dir_all(&directory).unwrap();
    }
}
