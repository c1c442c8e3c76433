//! Per-cell / per-node ghost classification bits.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Why an entity is a ghost. Zero means a real, owned entity.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct GhostFlags(u8);

impl GhostFlags {
    pub const REAL: GhostFlags = GhostFlags(0);
    /// Owned by a neighbor at the same refinement level.
    pub const DUPLICATED: GhostFlags = GhostFlags(0x01);
    /// Filled across a coarse/fine interface.
    pub const LEVEL_INTERFACE: GhostFlags = GhostFlags(0x02);
    /// Added layer that no neighbor filled.
    pub const EXTERIOR: GhostFlags = GhostFlags(0x10);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        GhostFlags(bits)
    }

    #[inline]
    pub const fn is_real(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: GhostFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: GhostFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for GhostFlags {
    type Output = GhostFlags;
    fn bitor(self, rhs: Self) -> Self {
        GhostFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for GhostFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for GhostFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_real() {
            return f.write_str("REAL");
        }
        let mut first = true;
        for (bit, name) in [
            (GhostFlags::DUPLICATED, "DUPLICATED"),
            (GhostFlags::LEVEL_INTERFACE, "LEVEL_INTERFACE"),
            (GhostFlags::EXTERIOR, "EXTERIOR"),
        ] {
            if self.contains(bit) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let rest = self.0 & !0x13;
        if rest != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{rest:#04x}")?;
        }
        Ok(())
    }
}
