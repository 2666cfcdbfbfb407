//! Compile state handed to a node while it emits its code.

use crate::{
    error::AnimationError,
    node::{ParticleNodeID, STREAM},
    register::{Register, RegisterAllocator, RegisterIndexMap, RegisterKind, RegisterSlot},
    set::{AnimationSetMetadata, SharedRegisters},
};

/// Gives one node access to the register allocator, the shared registers
/// and the announced metadata while it emits its fragment.
///
/// Registers a node allocates for a named slot are recorded in the register
/// index map so the matching animation state can find them. Scratch temps
/// and the node's usage of the shared temps are released when the node is
/// done.
#[derive(Debug)]
pub struct NodeCompileContext<'a> {
    node: ParticleNodeID,
    allocator: &'a mut RegisterAllocator,
    register_map: &'a mut RegisterIndexMap,
    shared: &'a SharedRegisters,
    metadata: &'a AnimationSetMetadata,
    looping: bool,
    scratch_temps: Vec<Register>,
    n_allocated: usize,
}

impl<'a> NodeCompileContext<'a> {
    pub(crate) fn new(
        node: ParticleNodeID,
        allocator: &'a mut RegisterAllocator,
        register_map: &'a mut RegisterIndexMap,
        shared: &'a SharedRegisters,
        metadata: &'a AnimationSetMetadata,
        looping: bool,
    ) -> Self {
        Self {
            node,
            allocator,
            register_map,
            shared,
            metadata,
            looping,
            scratch_temps: Vec::new(),
            n_allocated: 0,
        }
    }

    /// The node being compiled.
    pub fn node(&self) -> ParticleNodeID {
        self.node
    }

    pub fn shared(&self) -> &SharedRegisters {
        self.shared
    }

    pub fn metadata(&self) -> &AnimationSetMetadata {
        self.metadata
    }

    /// Whether particle lifetimes repeat.
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Allocates a register of a monotonic kind for the given slot.
    ///
    /// # Errors
    /// Returns [`AnimationError::PoolExhausted`] if the pool is used up.
    pub fn allocate_slot(
        &mut self,
        kind: RegisterKind,
        slot: RegisterSlot,
    ) -> Result<Register, AnimationError> {
        self.allocate_slot_rows(kind, 1, slot)
    }

    /// Allocates `n_rows` consecutive registers of a monotonic kind for the
    /// given slot and returns the first.
    ///
    /// # Errors
    /// Returns [`AnimationError::PoolExhausted`] if the pool cannot hold all
    /// the rows.
    pub fn allocate_slot_rows(
        &mut self,
        kind: RegisterKind,
        n_rows: u32,
        slot: RegisterSlot,
    ) -> Result<Register, AnimationError> {
        let node = self.node;
        let register = self
            .allocator
            .allocate_consecutive(kind, n_rows)
            .map_err(|err| AnimationError::PoolExhausted {
                node,
                kind: err.kind,
                limit: err.limit,
            })?;
        self.register_map.record(node, slot, register);
        self.n_allocated += n_rows as usize;
        Ok(register)
    }

    /// Allocates the attribute register the host binds to the node's vertex
    /// column.
    ///
    /// # Errors
    /// Returns [`AnimationError::PoolExhausted`] if no attribute is left.
    pub fn allocate_stream(&mut self) -> Result<Register, AnimationError> {
        self.allocate_slot(RegisterKind::Attribute, STREAM)
    }

    /// Allocates a temp that is only used within the node's fragment.
    ///
    /// # Errors
    /// Returns [`AnimationError::PoolExhausted`] if every temp is live.
    pub fn allocate_scratch(&mut self) -> Result<Register, AnimationError> {
        let node = self.node;
        let register = self
            .allocator
            .allocate(RegisterKind::Temp)
            .map_err(|err| AnimationError::PoolExhausted {
                node,
                kind: err.kind,
                limit: err.limit,
            })?;
        self.scratch_temps.push(register);
        self.n_allocated += 1;
        Ok(register)
    }

    /// Releases the node's scratch temps and its usage of the shared temps,
    /// and returns how many registers the node allocated.
    pub(crate) fn finish(self) -> usize {
        for temp in self.scratch_temps {
            self.allocator.release(temp);
        }
        for temp in self.shared.temps() {
            self.allocator.release(temp);
        }
        self.n_allocated
    }
}
