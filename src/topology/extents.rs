//! Logical index boxes, faces and centering.
//!
//! Extents follow the structured-mesh convention of six integers
//! `[imin, imax, jmin, jmax, kmin, kmax]`, all inclusive. Point extents
//! are what callers register; cell extents are derived from them. An axis
//! whose point range collapses to a single index is *flat*: a 2-D block
//! has one cell layer along its flat axis.
//!
//! Linear offsets run i-fastest, then j, then k, matching the layout of
//! every per-domain array the engine consumes or produces.

use itertools::iproduct;
use std::fmt;

/// Number of logical axes.
pub const AXES: usize = 3;

/// Which entity an array is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Centering {
    /// Point (node) data.
    Nodes,
    /// Cell (zone) data.
    Zones,
}

/// Low or high end of an axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Side {
    Low,
    High,
}

impl Side {
    /// The other end of the axis.
    #[inline]
    pub fn flip(self) -> Side {
        match self {
            Side::Low => Side::High,
            Side::High => Side::Low,
        }
    }
}

/// One of the six faces of a logical box.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Face {
    pub axis: usize,
    pub side: Side,
}

impl Face {
    pub const fn new(axis: usize, side: Side) -> Self {
        Self { axis, side }
    }

    /// Position in `expand[6]` order: i-min, i-max, j-min, j-max, k-min, k-max.
    #[inline]
    pub fn index(self) -> usize {
        self.axis * 2
            + match self.side {
                Side::Low => 0,
                Side::High => 1,
            }
    }

    /// Inverse of [`Face::index`].
    #[inline]
    pub fn from_index(idx: usize) -> Self {
        let side = if idx % 2 == 0 { Side::Low } else { Side::High };
        Self::new(idx / 2, side)
    }

    /// All six faces in `expand[6]` order.
    pub fn all() -> impl Iterator<Item = Face> {
        (0..2 * AXES).map(Face::from_index)
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis = ['i', 'j', 'k'][self.axis.min(2)];
        let side = match self.side {
            Side::Low => "min",
            Side::High => "max",
        };
        write!(f, "{axis}-{side}")
    }
}

/// An inclusive box of logical indices.
///
/// A box with `lo > hi` on any axis is empty; [`IndexBox::EMPTY`] is the
/// canonical empty value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct IndexBox {
    pub lo: [i64; AXES],
    pub hi: [i64; AXES],
}

impl fmt::Debug for IndexBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("IndexBox(empty)");
        }
        write!(
            f,
            "IndexBox([{}..={}, {}..={}, {}..={}])",
            self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2]
        )
    }
}

impl IndexBox {
    pub const EMPTY: IndexBox = IndexBox {
        lo: [0; AXES],
        hi: [-1; AXES],
    };

    #[inline]
    pub const fn new(lo: [i64; AXES], hi: [i64; AXES]) -> Self {
        Self { lo, hi }
    }

    /// Build from `[imin, imax, jmin, jmax, kmin, kmax]`.
    #[inline]
    pub fn from_extents(e: [i64; 6]) -> Self {
        Self {
            lo: [e[0], e[2], e[4]],
            hi: [e[1], e[3], e[5]],
        }
    }

    /// Back to `[imin, imax, jmin, jmax, kmin, kmax]`.
    #[inline]
    pub fn to_extents(&self) -> [i64; 6] {
        [
            self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2],
        ]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..AXES).any(|a| self.lo[a] > self.hi[a])
    }

    /// Whether the box collapses to a single index along `axis`.
    #[inline]
    pub fn is_flat(&self, axis: usize) -> bool {
        self.lo[axis] == self.hi[axis]
    }

    /// Number of indices per axis (zero for an empty box).
    pub fn dims(&self) -> [usize; AXES] {
        if self.is_empty() {
            return [0; AXES];
        }
        std::array::from_fn(|a| (self.hi[a] - self.lo[a] + 1) as usize)
    }

    /// Total number of indices.
    #[inline]
    pub fn count(&self) -> usize {
        self.dims().iter().product()
    }

    #[inline]
    pub fn contains(&self, p: [i64; AXES]) -> bool {
        (0..AXES).all(|a| self.lo[a] <= p[a] && p[a] <= self.hi[a])
    }

    /// Whether `other` lies entirely inside `self`. Empty boxes are contained everywhere.
    pub fn contains_box(&self, other: &IndexBox) -> bool {
        other.is_empty() || (self.contains(other.lo) && self.contains(other.hi))
    }

    pub fn intersect(&self, other: &IndexBox) -> IndexBox {
        let b = IndexBox {
            lo: std::array::from_fn(|a| self.lo[a].max(other.lo[a])),
            hi: std::array::from_fn(|a| self.hi[a].min(other.hi[a])),
        };
        if b.is_empty() { IndexBox::EMPTY } else { b }
    }

    /// Grow each axis by `lo_by` below and `hi_by` above.
    pub fn grow(&self, lo_by: [i64; AXES], hi_by: [i64; AXES]) -> IndexBox {
        IndexBox {
            lo: std::array::from_fn(|a| self.lo[a] - lo_by[a]),
            hi: std::array::from_fn(|a| self.hi[a] + hi_by[a]),
        }
    }

    /// Scale every index by a per-axis factor.
    pub fn scale(&self, ratio: [i64; AXES]) -> IndexBox {
        IndexBox {
            lo: std::array::from_fn(|a| self.lo[a] * ratio[a]),
            hi: std::array::from_fn(|a| self.hi[a] * ratio[a]),
        }
    }

    /// Replace the range along `axis`.
    pub fn with_axis(&self, axis: usize, lo: i64, hi: i64) -> IndexBox {
        let mut b = *self;
        b.lo[axis] = lo;
        b.hi[axis] = hi;
        b
    }

    /// Linear offset of `p` inside this box, i-fastest.
    ///
    /// The caller guarantees `self.contains(p)`.
    #[inline]
    pub fn offset_of(&self, p: [i64; AXES]) -> usize {
        debug_assert!(self.contains(p), "{p:?} outside {self:?}");
        let d = self.dims();
        let i = (p[0] - self.lo[0]) as usize;
        let j = (p[1] - self.lo[1]) as usize;
        let k = (p[2] - self.lo[2]) as usize;
        i + d[0] * (j + d[1] * k)
    }

    /// Iterate all indices in linear-offset order.
    pub fn iter(&self) -> impl Iterator<Item = [i64; AXES]> + use<> {
        let b = if self.is_empty() { IndexBox::EMPTY } else { *self };
        iproduct!(b.lo[2]..=b.hi[2], b.lo[1]..=b.hi[1], b.lo[0]..=b.hi[0])
            .map(|(k, j, i)| [i, j, k])
    }

    /// Cell extents of a point box: `[lo, hi-1]` per axis, `[lo, lo]` on flat axes.
    pub fn cells_of_points(&self) -> IndexBox {
        if self.is_empty() {
            return IndexBox::EMPTY;
        }
        IndexBox {
            lo: self.lo,
            hi: std::array::from_fn(|a| {
                if self.is_flat(a) { self.lo[a] } else { self.hi[a] - 1 }
            }),
        }
    }

    /// The box for the given centering when `self` holds point extents.
    #[inline]
    pub fn for_centering(&self, centering: Centering) -> IndexBox {
        match centering {
            Centering::Nodes => *self,
            Centering::Zones => self.cells_of_points(),
        }
    }
}

/// `floor(a / b)` for `b > 0`.
#[inline]
pub(crate) fn div_floor(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

/// `ceil(a / b)` for `b > 0`.
#[inline]
pub(crate) fn div_ceil(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}
