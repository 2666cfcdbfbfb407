//! Host-side values of the constant registers used by a compiled program.

use crate::{
    elements::{BufferChange, BufferChangeTracker},
    register::{Register, RegisterKind, RegisterUsage, ReservedRegisters},
};
use anyhow::Result;

/// Destination for the values of constant registers written by global
/// animation states.
pub trait UniformRegisterWriter {
    /// Writes the four components of the given constant register.
    fn write_constant(&mut self, register: Register, values: [f32; 4]);

    /// Writes consecutive constant registers starting at `first_register`,
    /// one row per register.
    fn write_constant_rows(&mut self, first_register: Register, rows: &[[f32; 4]]) {
        for (offset, row) in rows.iter().enumerate() {
            self.write_constant(first_register.offset(offset as u32), *row);
        }
    }
}

/// Receiver of constant register data, such as a GPU uniform buffer.
pub trait ConstantBufferUploader {
    /// Uploads the values of the constant registers starting at index
    /// `first_register`, four floats per register.
    fn upload_constant_data(&mut self, first_register: u32, bytes: &[u8]) -> Result<()>;
}

/// The values of every constant register allocated by a compile pass.
///
/// Registers reserved for the program host are not held here. Writes that
/// change a value mark the data as needing upload.
#[derive(Clone, Debug)]
pub struct VertexConstantData {
    first_register: u32,
    registers: Vec<[f32; 4]>,
    change_tracker: BufferChangeTracker,
}

impl VertexConstantData {
    /// Creates zeroed data for the constants in use after a compile pass,
    /// skipping the reserved ones.
    pub fn new(usage: &RegisterUsage, reserved: &ReservedRegisters) -> Self {
        let first_register = reserved.constants;
        let n_registers = usage.constants.saturating_sub(first_register) as usize;
        let mut change_tracker = BufferChangeTracker::new();
        change_tracker.notify_layout_change();
        Self {
            first_register,
            registers: vec![[0.0; 4]; n_registers],
            change_tracker,
        }
    }

    /// Index of the first constant register held.
    pub fn first_register(&self) -> u32 {
        self.first_register
    }

    pub fn n_registers(&self) -> usize {
        self.registers.len()
    }

    /// Returns the values of the given constant register, or [`None`] if
    /// the register is not held.
    pub fn get(&self, register: Register) -> Option<[f32; 4]> {
        self.slot(register)
            .map(|slot| self.registers[slot])
    }

    pub fn registers(&self) -> &[[f32; 4]] {
        &self.registers
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.registers)
    }

    pub fn change(&self) -> BufferChange {
        self.change_tracker.change()
    }

    pub fn is_dirty(&self) -> bool {
        self.change_tracker.is_dirty()
    }

    /// Uploads the constants through the given uploader if they changed
    /// since the last upload, and returns the change that was uploaded.
    ///
    /// # Errors
    /// Returns an error if the uploader fails, in which case the data
    /// remains dirty.
    pub fn upload_if_dirty(
        &mut self,
        uploader: &mut impl ConstantBufferUploader,
    ) -> Result<BufferChange> {
        if !self.change_tracker.is_dirty() {
            return Ok(BufferChange::None);
        }
        uploader.upload_constant_data(self.first_register, self.bytes())?;
        Ok(self.change_tracker.take_change())
    }

    fn slot(&self, register: Register) -> Option<usize> {
        if register.kind() != RegisterKind::Constant {
            return None;
        }
        register
            .index()
            .checked_sub(self.first_register)
            .map(|slot| slot as usize)
            .filter(|&slot| slot < self.registers.len())
    }
}

impl UniformRegisterWriter for VertexConstantData {
    /// # Panics
    /// If the register is not one of the held constant registers.
    fn write_constant(&mut self, register: Register, values: [f32; 4]) {
        let slot = self
            .slot(register)
            .unwrap_or_else(|| panic!("Register {} is not an allocated constant", register));

        if self.registers[slot] != values {
            self.registers[slot] = values;
            self.change_tracker.notify_content_change();
        }
    }
}
