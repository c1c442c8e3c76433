//! Per-domain boundary record.
//!
//! A [`Boundary`] owns a domain's registered neighbors, its per-face ghost
//! request and two pairs of extents: the native ("old") point/cell boxes
//! and the ghosted ("new") boxes committed by `finish`. Fields are private;
//! the rest of the crate reads them through the accessors below.

use crate::topology::extents::{AXES, Centering, Face, IndexBox, Side};
use crate::topology::neighbor::Neighbor;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Boundary {
    old_points: Option<IndexBox>,
    new_points: Option<IndexBox>,
    expand: [usize; 2 * AXES],
    neighbors: Vec<Neighbor>,
    level: usize,
}

impl Boundary {
    pub(crate) fn with_expand(expand: [usize; 2 * AXES]) -> Self {
        Self {
            expand,
            ..Self::default()
        }
    }

    /// Native point extents, if set.
    #[inline]
    pub fn old_points(&self) -> Option<IndexBox> {
        self.old_points
    }

    /// Native cell extents, if set.
    #[inline]
    pub fn old_cells(&self) -> Option<IndexBox> {
        self.old_points.map(|b| b.cells_of_points())
    }

    /// Ghosted point extents; `None` until `finish`.
    #[inline]
    pub fn new_points(&self) -> Option<IndexBox> {
        self.new_points
    }

    /// Ghosted cell extents; `None` until `finish`.
    #[inline]
    pub fn new_cells(&self) -> Option<IndexBox> {
        self.new_points.map(|b| b.cells_of_points())
    }

    /// Native extents for `centering`.
    pub fn old_extents(&self, centering: Centering) -> Option<IndexBox> {
        self.old_points.map(|b| b.for_centering(centering))
    }

    /// Ghosted extents for `centering`, falling back to native extents
    /// for an unfinished domain.
    pub fn new_extents(&self, centering: Centering) -> Option<IndexBox> {
        self.new_points
            .or(self.old_points)
            .map(|b| b.for_centering(centering))
    }

    /// Requested ghost width per face, `expand[6]` order.
    #[inline]
    pub fn expand(&self) -> [usize; 2 * AXES] {
        self.expand
    }

    /// Ghost width actually granted on `face` (zero before `finish`).
    pub fn granted(&self, face: Face) -> usize {
        match (self.old_points, self.new_points) {
            (Some(old), Some(new)) => {
                let a = face.axis;
                let g = match face.side {
                    Side::Low => old.lo[a] - new.lo[a],
                    Side::High => new.hi[a] - old.hi[a],
                };
                g.max(0) as usize
            }
            _ => 0,
        }
    }

    #[inline]
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.new_points.is_some()
    }

    pub(crate) fn set_old_points(&mut self, points: IndexBox, level: usize) {
        self.old_points = Some(points);
        self.level = level;
        self.new_points = None;
    }

    pub(crate) fn set_expand(&mut self, expand: [usize; 2 * AXES]) {
        self.expand = expand;
        self.new_points = None;
    }

    pub(crate) fn push_neighbor(&mut self, n: Neighbor) {
        self.neighbors.push(n);
        self.new_points = None;
    }

    pub(crate) fn neighbors_mut(&mut self) -> &mut [Neighbor] {
        &mut self.neighbors
    }

    pub(crate) fn retain_neighbors(&mut self, keep: impl FnMut(&Neighbor) -> bool) {
        self.neighbors.retain(keep);
        self.new_points = None;
    }

    /// Commit ghosted extents: `old` grown on each face by the widest
    /// width granted by any neighbor on that face.
    ///
    /// `supply(n)` is how many cells, in this domain's resolution, neighbor
    /// `n` holds along the face normal.
    pub(crate) fn commit(&mut self, supply: impl Fn(&Neighbor) -> i64) -> Option<IndexBox> {
        let old = self.old_points?;
        let mut lo_by = [0i64; AXES];
        let mut hi_by = [0i64; AXES];
        for n in &self.neighbors {
            let req = self.expand[n.face.index()] as i64;
            if req == 0 {
                continue;
            }
            let g = req.min(supply(n).max(0));
            let slot = match n.face.side {
                Side::Low => &mut lo_by[n.face.axis],
                Side::High => &mut hi_by[n.face.axis],
            };
            *slot = (*slot).max(g);
        }
        let new = old.grow(lo_by, hi_by);
        self.new_points = Some(new);
        Some(new)
    }
}
