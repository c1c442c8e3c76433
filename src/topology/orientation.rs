//! Axis orientation between neighboring blocks: the signed permutation
//! group on three axes, with a compact match code.

use core::fmt::{Debug, Formatter};

use crate::mesh_error::HaloError;
use crate::topology::extents::AXES;

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Signed, 1-based axis map. Entry `a` names the neighbor axis that local
/// axis `a` runs along; a negative entry means the neighbor counts the
/// other way. `[1, 2, 3]` is the identity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Orientation([i8; AXES]);

impl Debug for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Orientation").field(&self.0).finish()
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation([1, 2, 3]);

    /// Validate a raw orientation triple.
    pub fn new(raw: [i8; AXES]) -> Result<Self, HaloError> {
        let mut seen = [false; AXES];
        for &o in &raw {
            let axis = o.unsigned_abs() as usize;
            if axis == 0 || axis > AXES || seen[axis - 1] {
                return Err(HaloError::InvalidOrientation(raw));
            }
            seen[axis - 1] = true;
        }
        Ok(Self(raw))
    }

    #[inline]
    pub fn raw(self) -> [i8; AXES] {
        self.0
    }

    /// Neighbor axis that local axis `a` maps onto.
    #[inline]
    pub fn axis(self, a: usize) -> usize {
        self.0[a].unsigned_abs() as usize - 1
    }

    /// `+1` when both sides count the same way along local axis `a`, else `-1`.
    #[inline]
    pub fn sign(self, a: usize) -> i64 {
        if self.0[a] < 0 { -1 } else { 1 }
    }

    #[inline]
    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }

    /// The map seen from the neighbor's side.
    pub fn inverse(self) -> Self {
        let mut inv = [0i8; AXES];
        for a in 0..AXES {
            inv[self.axis(a)] = (self.sign(a) as i8) * (a as i8 + 1);
        }
        Self(inv)
    }

    /// Compact code: zero iff the orientation is the identity.
    ///
    /// Bits 3.. hold the permutation index, bits 0..3 the reversed axes.
    pub fn match_code(self) -> u8 {
        let perm: [usize; 3] = std::array::from_fn(|a| self.axis(a));
        let idx = PERMUTATIONS
            .iter()
            .position(|p| *p == perm)
            .unwrap_or_default() as u8;
        let flips = (0..AXES).fold(0u8, |acc, a| {
            if self.sign(a) < 0 { acc | (1 << a) } else { acc }
        });
        (idx << 3) | flips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_permutations() {
        assert!(Orientation::new([1, 1, 3]).is_err());
        assert!(Orientation::new([0, 2, 3]).is_err());
        assert!(Orientation::new([1, 2, 4]).is_err());
        assert!(Orientation::new([-2, 1, 3]).is_ok());
    }

    #[test]
    fn identity_has_match_code_zero() {
        assert_eq!(Orientation::IDENTITY.match_code(), 0);
        let swapped = Orientation::new([2, 1, 3]).unwrap();
        assert_ne!(swapped.match_code(), 0);
        let flipped = Orientation::new([-1, 2, 3]).unwrap();
        assert_ne!(flipped.match_code(), 0);
        assert_ne!(flipped.match_code(), swapped.match_code());
    }

    #[test]
    fn inverse_maps_each_axis_back() {
        for raw in [[2, -1, 3], [-3, 1, -2], [1, -2, 3], [3, 2, 1]] {
            let o = Orientation::new(raw).unwrap();
            let inv = o.inverse();
            for a in 0..AXES {
                assert_eq!(inv.axis(o.axis(a)), a, "{raw:?}");
                assert_eq!(inv.sign(o.axis(a)), o.sign(a), "{raw:?}");
            }
            assert_eq!(inv.inverse(), o);
            assert_eq!(inv.is_identity(), o.is_identity());
        }
    }

    #[test]
    fn axis_and_sign_accessors() {
        let o = Orientation::new([-2, 3, 1]).unwrap();
        assert_eq!(o.axis(0), 1);
        assert_eq!(o.sign(0), -1);
        assert_eq!(o.axis(1), 2);
        assert_eq!(o.sign(2), 1);
        assert_eq!(o.inverse().raw(), [3, -1, 2]);
    }
}
