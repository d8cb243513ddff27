//! Warp architectural state: per-lane register files, activity mask and PC.

use super::mask::ActivityMask;
use crate::isa::NUM_REGS;

/// Register width in bits (1..=16). Values are stored in `u16` and kept
/// below `2^bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWidth(u32);

impl RegWidth {
    pub const MAX_BITS: u32 = 16;

    /// `None` outside 1..=16.
    pub fn new(bits: u32) -> Option<Self> {
        (1..=Self::MAX_BITS).contains(&bits).then_some(Self(bits))
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Largest representable register value.
    #[inline]
    pub fn max_value(&self) -> u16 {
        (((1u32 << self.0) - 1) & 0xFFFF) as u16
    }

    /// Truncate to the register width.
    #[inline]
    pub fn truncate(&self, value: u16) -> u16 {
        value & self.max_value()
    }

    #[inline]
    pub fn wrapping_add(&self, a: u16, b: u16) -> u16 {
        self.truncate(a.wrapping_add(b))
    }

    #[inline]
    pub fn wrapping_sub(&self, a: u16, b: u16) -> u16 {
        self.truncate(a.wrapping_sub(b))
    }
}

impl Default for RegWidth {
    fn default() -> Self {
        Self(Self::MAX_BITS)
    }
}

/// One lane's register file, r0..r15. No register is hard-wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegFile {
    regs: [u16; NUM_REGS],
}

impl RegFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self, reg: u8) -> u16 {
        self.regs[reg as usize]
    }

    #[inline]
    pub fn write(&mut self, reg: u8, value: u16) {
        self.regs[reg as usize] = value;
    }

    pub fn snapshot(&self) -> &[u16; NUM_REGS] {
        &self.regs
    }
}

/// Composite state advanced once per cycle.
///
/// Cloning gives a full snapshot; two runs are identical iff their
/// sequences of `WarpState` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarpState {
    pub pc: u16,
    pub regs: Vec<RegFile>,
    pub mask: ActivityMask,
}

impl WarpState {
    /// Reset state: PC 0, all registers 0, every lane active.
    pub fn reset(lanes: usize) -> Self {
        Self {
            pc: 0,
            regs: vec![RegFile::new(); lanes],
            mask: ActivityMask::all_active(lanes),
        }
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.regs.len()
    }

    #[inline]
    pub fn read(&self, lane: usize, reg: u8) -> u16 {
        self.regs[lane].read(reg)
    }

    /// Register `reg` across all lanes, lane 0 first.
    pub fn column(&self, reg: u8) -> Vec<u16> {
        self.regs.iter().map(|rf| rf.read(reg)).collect()
    }
}
