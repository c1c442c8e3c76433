//! One domain's record of a face it shares with another domain.

use crate::topology::DomainId;
use crate::topology::extents::{AXES, Face, IndexBox};
use crate::topology::orientation::Orientation;

/// Resolution of a neighbor relative to the domain holding the record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LevelRelation {
    /// Same refinement level.
    Same,
    /// The neighbor is finer by the given per-axis ratio.
    Finer([i64; AXES]),
    /// The neighbor is coarser by the given per-axis ratio.
    Coarser([i64; AXES]),
}

impl LevelRelation {
    /// Relation seen from the neighbor's side.
    pub fn inverse(self) -> Self {
        match self {
            LevelRelation::Same => LevelRelation::Same,
            LevelRelation::Finer(r) => LevelRelation::Coarser(r),
            LevelRelation::Coarser(r) => LevelRelation::Finer(r),
        }
    }

    #[inline]
    pub fn is_same(self) -> bool {
        matches!(self, LevelRelation::Same)
    }

    /// Convert a neighbor-side cell count along local axis `axis` into local cells.
    pub fn to_local_cells(self, axis: usize, cells: i64) -> i64 {
        match self {
            LevelRelation::Same => cells,
            LevelRelation::Finer(r) => cells / r[axis],
            LevelRelation::Coarser(r) => cells * r[axis],
        }
    }
}

/// A directed "domain A has neighbor B" relation across one face of A.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Neighbor {
    /// Id of the neighboring domain.
    pub domain: DomainId,
    /// Zero iff `orientation` is the identity.
    pub match_code: u8,
    pub orientation: Orientation,
    /// Face of the owning domain the shared region lies on.
    pub face: Face,
    /// Shared point region in the owner's index space; flat along `face.axis`.
    pub overlap: IndexBox,
    /// Neighbor point dimensions, refreshed by `finish`.
    pub point_dims: [usize; AXES],
    /// Neighbor cell dimensions, refreshed by `finish`.
    pub cell_dims: [usize; AXES],
    /// Refreshed by `finish`.
    pub level: LevelRelation,
}

impl Neighbor {
    /// Face of the neighbor that should carry the reciprocal record.
    pub fn reciprocal_face(&self) -> Face {
        let axis = self.orientation.axis(self.face.axis);
        let side = if self.orientation.sign(self.face.axis) > 0 {
            self.face.side.flip()
        } else {
            self.face.side
        };
        Face::new(axis, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::extents::Side;

    fn record(face: Face, overlap: IndexBox, orientation: Orientation) -> Neighbor {
        Neighbor {
            domain: 1,
            match_code: orientation.match_code(),
            orientation,
            face,
            overlap,
            point_dims: [0; 3],
            cell_dims: [0; 3],
            level: LevelRelation::Same,
        }
    }

    #[test]
    fn reciprocal_face_follows_orientation() {
        let n = record(
            Face::new(0, Side::High),
            IndexBox::new([4, 0, 0], [4, 4, 0]),
            Orientation::IDENTITY,
        );
        assert_eq!(n.reciprocal_face(), Face::new(0, Side::Low));
        let swapped = record(
            Face::new(0, Side::High),
            IndexBox::new([4, 0, 0], [4, 4, 0]),
            Orientation::new([-2, 1, 3]).unwrap(),
        );
        assert_eq!(swapped.reciprocal_face(), Face::new(1, Side::High));
    }

    #[test]
    fn level_conversion() {
        assert_eq!(LevelRelation::Finer([2, 2, 1]).to_local_cells(0, 8), 4);
        assert_eq!(LevelRelation::Coarser([2, 2, 1]).to_local_cells(1, 3), 6);
        assert_eq!(LevelRelation::Finer([2, 2, 1]).inverse(), LevelRelation::Coarser([2, 2, 1]));
    }
}
