//! Allocation of virtual vertex program registers.

mod index_map;

pub use index_map::RegisterIndexMap;

use crate::error::RegisterPoolExhausted;
use std::fmt;

/// The kinds of virtual registers a vertex program can address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterKind {
    /// Uniform register, written by the host between draws.
    Constant,
    /// Per-vertex input read from a vertex buffer.
    Attribute,
    /// Scratch register, only valid within one program invocation.
    Temp,
    /// Output interpolated across the primitive for the fragment stage.
    Varying,
}

/// A virtual register of a specific kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register {
    kind: RegisterKind,
    index: u32,
}

/// Logical name of a register consumed by a node, such as `"clock"` or
/// `"follow_offset"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterSlot(pub &'static str);

/// The number of registers of each kind available on the target profile.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterLimits {
    pub constants: u32,
    pub attributes: u32,
    pub temps: u32,
    pub varyings: u32,
}

/// Registers at the start of the constant and attribute pools that the
/// program host binds itself and the allocator must never hand out.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservedRegisters {
    pub constants: u32,
    pub attributes: u32,
}

/// How much of each pool a finished compile pass consumed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterUsage {
    /// Number of constant registers in use, including reserved ones.
    pub constants: u32,
    /// Number of attribute registers in use, including reserved ones.
    pub attributes: u32,
    pub varyings: u32,
    /// Largest number of temps that were live at the same time.
    pub peak_temps: u32,
}

/// Hands out registers for a single compile pass.
///
/// Constants, attributes and varyings are statically bound by the program, so
/// they are allocated monotonically and never reused. Temps are reference
/// counted: a temp becomes available again once every consumer has released
/// it, which lets fragments generated independently by different nodes share
/// scratch space.
///
/// Allocation is fully deterministic, so replaying the same sequence of
/// requests yields the same registers.
#[derive(Clone, Debug)]
pub struct RegisterAllocator {
    limits: RegisterLimits,
    reserved: ReservedRegisters,
    next_constant: u32,
    next_attribute: u32,
    next_varying: u32,
    temp_usage_counts: Vec<u32>,
    peak_temps: u32,
    n_requests: usize,
}

impl RegisterKind {
    /// All register kinds, in pool order.
    pub const ALL: [Self; 4] = [
        Self::Constant,
        Self::Attribute,
        Self::Temp,
        Self::Varying,
    ];

    /// The prefix used when naming registers of this kind in emitted code.
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Constant => "vc",
            Self::Attribute => "va",
            Self::Temp => "vt",
            Self::Varying => "v",
        }
    }

    /// Whether registers of this kind can be handed out again within a pass.
    pub const fn is_reusable(&self) -> bool {
        matches!(self, Self::Temp)
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Constant => "constant",
            Self::Attribute => "attribute",
            Self::Temp => "temp",
            Self::Varying => "varying",
        };
        write!(f, "{}", name)
    }
}

impl Register {
    pub const fn new(kind: RegisterKind, index: u32) -> Self {
        Self { kind, index }
    }

    pub const fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the register of the same kind `offset` slots further along.
    /// Used for addressing the rows of a matrix held in consecutive
    /// registers.
    pub const fn offset(&self, offset: u32) -> Self {
        Self {
            kind: self.kind,
            index: self.index + offset,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.index)
    }
}

impl fmt::Display for RegisterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RegisterLimits {
    /// Returns the number of registers of the given kind.
    pub const fn limit(&self, kind: RegisterKind) -> u32 {
        match kind {
            RegisterKind::Constant => self.constants,
            RegisterKind::Attribute => self.attributes,
            RegisterKind::Temp => self.temps,
            RegisterKind::Varying => self.varyings,
        }
    }
}

impl Default for RegisterLimits {
    fn default() -> Self {
        Self {
            constants: 128,
            attributes: 8,
            temps: 8,
            varyings: 8,
        }
    }
}

impl RegisterAllocator {
    /// Creates an allocator for the given register limits with nothing
    /// reserved.
    pub fn new(limits: RegisterLimits) -> Self {
        Self::with_reserved(limits, ReservedRegisters::default())
    }

    /// Creates an allocator that starts handing out constants and attributes
    /// after the given reserved ones.
    pub fn with_reserved(limits: RegisterLimits, reserved: ReservedRegisters) -> Self {
        Self {
            limits,
            reserved,
            next_constant: reserved.constants,
            next_attribute: reserved.attributes,
            next_varying: 0,
            temp_usage_counts: vec![0; limits.temps as usize],
            peak_temps: 0,
            n_requests: 0,
        }
    }

    pub fn limits(&self) -> &RegisterLimits {
        &self.limits
    }

    pub fn reserved(&self) -> &ReservedRegisters {
        &self.reserved
    }

    /// Whether no register has been requested from this allocator yet.
    pub fn is_fresh(&self) -> bool {
        self.n_requests == 0
    }

    /// Allocates a register of the given kind.
    ///
    /// Monotonic kinds get the next unused index. A temp gets the
    /// lowest-indexed temp whose usage count is zero, and its usage count is
    /// set to one.
    ///
    /// # Errors
    /// Returns [`RegisterPoolExhausted`] if no register of the kind is left.
    pub fn allocate(&mut self, kind: RegisterKind) -> Result<Register, RegisterPoolExhausted> {
        self.n_requests += 1;
        match kind {
            RegisterKind::Temp => self.allocate_temp(),
            _ => self.allocate_monotonic(kind, 1),
        }
    }

    /// Allocates `count` consecutive registers of a monotonic kind and
    /// returns the first. Either all registers are granted or none.
    ///
    /// # Errors
    /// Returns [`RegisterPoolExhausted`] if fewer than `count` registers of
    /// the kind are left.
    ///
    /// # Panics
    /// If `kind` is [`RegisterKind::Temp`] or `count` is zero.
    pub fn allocate_consecutive(
        &mut self,
        kind: RegisterKind,
        count: u32,
    ) -> Result<Register, RegisterPoolExhausted> {
        assert!(
            !kind.is_reusable(),
            "Tried to allocate consecutive temp registers"
        );
        assert_ne!(count, 0, "Tried to allocate zero consecutive registers");
        self.n_requests += 1;
        self.allocate_monotonic(kind, count)
    }

    /// Registers `n_additional` more consumers of the given live temp.
    ///
    /// # Panics
    /// If the register is not a temp or is not currently allocated.
    pub fn add_usage(&mut self, register: Register, n_additional: u32) {
        let count = self.temp_usage_count_mut(register);
        assert!(*count > 0, "Tried to add usage to free temp {}", register);
        *count += n_additional;
    }

    /// Releases one usage of the given temp. The temp becomes available for
    /// reuse when its usage count reaches zero.
    ///
    /// # Panics
    /// If the register is not a temp or is not currently allocated.
    pub fn release(&mut self, register: Register) {
        let count = self.temp_usage_count_mut(register);
        assert!(*count > 0, "Tried to release free temp {}", register);
        *count -= 1;
    }

    /// Returns the current usage count of the given temp (zero for free
    /// temps and for registers of other kinds).
    pub fn usage_count(&self, register: Register) -> u32 {
        if register.kind() != RegisterKind::Temp {
            return 0;
        }
        self.temp_usage_counts
            .get(register.index() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of temps currently in use.
    pub fn n_live_temps(&self) -> u32 {
        self.temp_usage_counts
            .iter()
            .filter(|&&count| count > 0)
            .count() as u32
    }

    /// Summarizes how much of each pool has been consumed so far.
    pub fn usage(&self) -> RegisterUsage {
        RegisterUsage {
            constants: self.next_constant,
            attributes: self.next_attribute,
            varyings: self.next_varying,
            peak_temps: self.peak_temps,
        }
    }

    fn allocate_temp(&mut self) -> Result<Register, RegisterPoolExhausted> {
        let index = self
            .temp_usage_counts
            .iter()
            .position(|&count| count == 0)
            .ok_or(RegisterPoolExhausted {
                kind: RegisterKind::Temp,
                limit: self.limits.temps,
            })?;

        self.temp_usage_counts[index] = 1;
        self.peak_temps = self.peak_temps.max(self.n_live_temps());

        Ok(Register::new(RegisterKind::Temp, index as u32))
    }

    fn allocate_monotonic(
        &mut self,
        kind: RegisterKind,
        count: u32,
    ) -> Result<Register, RegisterPoolExhausted> {
        let limit = self.limits.limit(kind);
        let next = match kind {
            RegisterKind::Constant => &mut self.next_constant,
            RegisterKind::Attribute => &mut self.next_attribute,
            RegisterKind::Varying => &mut self.next_varying,
            RegisterKind::Temp => unreachable!("temps are not allocated monotonically"),
        };

        let end = next
            .checked_add(count)
            .filter(|&end| end <= limit)
            .ok_or(RegisterPoolExhausted { kind, limit })?;

        let register = Register::new(kind, *next);
        *next = end;
        Ok(register)
    }

    fn temp_usage_count_mut(&mut self, register: Register) -> &mut u32 {
        assert_eq!(
            register.kind(),
            RegisterKind::Temp,
            "Tried to track usage of non-temp register {}",
            register
        );
        self.temp_usage_counts
            .get_mut(register.index() as usize)
            .unwrap_or_else(|| panic!("Temp {} is outside the temp pool", register))
    }
}
