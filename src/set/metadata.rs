//! Facts nodes announce to each other during a compile pass.

use std::collections::HashSet;

stringhash_newtype!(
    /// Name of a fact about an animation set that nodes can announce and
    /// query.
    [pub] MetadataKey
);

/// Record of the facts announced by the nodes of an animation set.
///
/// Every node announces its facts before any node emits code, so while
/// emitting, a node sees the complete record regardless of where it sits in
/// the compile order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnimationSetMetadata {
    facts: HashSet<MetadataKey>,
}

impl MetadataKey {
    /// A node orients particles towards the camera.
    pub const HAS_BILLBOARD: Self = Self::literal("has_billboard");
    /// A node animates texture coordinates.
    pub const HAS_UV: Self = Self::literal("has_uv");
    /// A node reads or writes the per-vertex velocity.
    pub const NEEDS_VELOCITY: Self = Self::literal("needs_velocity");
}

impl AnimationSetMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces the given fact. Announcing a fact more than once has no
    /// further effect.
    pub fn announce(&mut self, key: MetadataKey) {
        self.facts.insert(key);
    }

    /// Whether the given fact has been announced.
    pub fn has(&self, key: MetadataKey) -> bool {
        self.facts.contains(&key)
    }

    pub fn n_facts(&self) -> usize {
        self.facts.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn announced_facts_are_visible() {
        let mut metadata = AnimationSetMetadata::new();
        assert!(!metadata.has(MetadataKey::HAS_BILLBOARD));

        metadata.announce(MetadataKey::HAS_BILLBOARD);
        metadata.announce(MetadataKey::HAS_BILLBOARD);

        assert!(metadata.has(MetadataKey::HAS_BILLBOARD));
        assert!(!metadata.has(MetadataKey::HAS_UV));
        assert_eq!(metadata.n_facts(), 1);
    }

    #[test]
    fn keys_with_same_name_are_equal() {
        assert_eq!(
            MetadataKey::from_name("has_uv"),
            MetadataKey::HAS_UV
        );
    }
}
