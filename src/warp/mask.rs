//! Activity mask: one bit per lane.

use std::fmt;

/// Upper bound on warp width, one bit per lane in a `u64`.
pub const MAX_LANES: usize = 64;

/// Set of lanes that take part in the current cycle's instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivityMask {
    bits: u64,
    lanes: usize,
}

impl ActivityMask {
    /// All `lanes` lanes active; the reset value.
    pub fn all_active(lanes: usize) -> Self {
        debug_assert!(lanes <= MAX_LANES);
        Self {
            bits: Self::full_bits(lanes),
            lanes,
        }
    }

    /// Bits above `lanes` are dropped.
    pub fn from_bits(lanes: usize, bits: u64) -> Self {
        debug_assert!(lanes <= MAX_LANES);
        Self {
            bits: bits & Self::full_bits(lanes),
            lanes,
        }
    }

    fn full_bits(lanes: usize) -> u64 {
        if lanes >= 64 { u64::MAX } else { (1u64 << lanes) - 1 }
    }

    #[inline]
    pub fn bits(&self) -> u64 {
        self.bits
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    #[inline]
    pub fn is_active(&self, lane: usize) -> bool {
        lane < self.lanes && (self.bits >> lane) & 1 == 1
    }

    pub fn active_count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_all_active(&self) -> bool {
        self.bits == Self::full_bits(self.lanes)
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Keep only the active lanes for which `keep` holds.
    ///
    /// Inactive lanes stay inactive whatever `keep` returns.
    pub fn narrow(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let mut bits = self.bits;
        for lane in self.iter_active() {
            if !keep(lane) {
                bits &= !(1u64 << lane);
            }
        }
        Self {
            bits,
            lanes: self.lanes,
        }
    }

    /// True when every active lane of `self` is active in `other`.
    pub fn is_subset_of(&self, other: &ActivityMask) -> bool {
        self.bits & !other.bits == 0
    }

    pub fn iter_active(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.lanes).filter(|&lane| self.is_active(lane))
    }

    pub fn to_vec(&self) -> Vec<bool> {
        (0..self.lanes).map(|lane| self.is_active(lane)).collect()
    }
}

impl fmt::Display for ActivityMask {
    /// Lane 0 first, e.g. `[0,1,0,0]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for lane in 0..self.lanes {
            if lane > 0 {
                f.write_str(",")?;
            }
            f.write_str(if self.is_active(lane) { "1" } else { "0" })?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for ActivityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivityMask{}", self)
    }
}
