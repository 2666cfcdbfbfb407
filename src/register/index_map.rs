//! Mapping from node slots to the registers allocated for them.

use crate::{
    error::AnimationError,
    node::ParticleNodeID,
    register::{Register, RegisterSlot},
};
use std::collections::HashMap;

/// The registers allocated for each (node, slot) pair during one compile pass.
///
/// The map is filled while the animation set compiles and is read-only
/// afterwards. Animation states consult it when they are bound to find the
/// uniform registers they must write every frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterIndexMap {
    registers: HashMap<(ParticleNodeID, RegisterSlot), Register>,
    entries_in_allocation_order: Vec<(ParticleNodeID, RegisterSlot, Register)>,
}

impl RegisterIndexMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records the register allocated for the given node slot.
    ///
    /// # Panics
    /// If a register was already recorded for the slot.
    pub(crate) fn record(&mut self, node: ParticleNodeID, slot: RegisterSlot, register: Register) {
        let existing = self.registers.insert((node, slot), register);
        assert!(
            existing.is_none(),
            "Recorded register for slot `{}` of node `{}` twice",
            slot,
            node
        );
        self.entries_in_allocation_order
            .push((node, slot, register));
    }

    /// Returns the register recorded for the given node slot, if any.
    pub fn get(&self, node: ParticleNodeID, slot: RegisterSlot) -> Option<Register> {
        self.registers.get(&(node, slot)).copied()
    }

    /// Returns the register recorded for the given node slot.
    ///
    /// # Errors
    /// Returns [`AnimationError::MissingRegister`] if the node never
    /// allocated a register for the slot.
    pub fn register(
        &self,
        node: ParticleNodeID,
        slot: RegisterSlot,
    ) -> Result<Register, AnimationError> {
        self.get(node, slot)
            .ok_or(AnimationError::MissingRegister { node, slot })
    }

    /// Returns an iterator over all recorded entries in the order the
    /// registers were allocated.
    pub fn entries(&self) -> impl Iterator<Item = (ParticleNodeID, RegisterSlot, Register)> + '_ {
        self.entries_in_allocation_order.iter().copied()
    }

    /// Returns an iterator over the slots and registers of the given node.
    pub fn registers_of_node(
        &self,
        node: ParticleNodeID,
    ) -> impl Iterator<Item = (RegisterSlot, Register)> + '_ {
        self.entries()
            .filter(move |&(entry_node, _, _)| entry_node == node)
            .map(|(_, slot, register)| (slot, register))
    }

    pub fn len(&self) -> usize {
        self.entries_in_allocation_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries_in_allocation_order.is_empty()
    }
}
