//! Boundary registry: the durable per-timestep topology of a decomposed mesh.
//!
//! The registry is caller-owned. It is populated once per topology change
//! (`set_num_domains` → extents → neighbors → `finish`), read by every
//! exchange, and emptied with [`BoundaryRegistry::reset_cached_members`]
//! when the decomposition changes. Every process registers *all* domains,
//! not just the ones it owns, so all ranks derive the same exchange plan.
//!
//! # Invariants
//!
//! - If A lists B on face F with orientation O, B lists A on the
//!   reciprocal face with orientation O⁻¹ (checked by
//!   [`validate_invariants`](DebugInvariants::validate_invariants), never
//!   repaired).
//! - Ghosted extents are only valid after `finish`; any mutation of a
//!   domain's extents, request or neighbors clears them.

use once_cell::sync::OnceCell;

use crate::algs::plan::ExchangePlan;
use crate::config::ExchangeOptions;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::boundary::Boundary;
use crate::topology::cache::InvalidateCache;
use crate::topology::extents::{AXES, Face, IndexBox, Side};
use crate::topology::neighbor::{LevelRelation, Neighbor};
use crate::topology::orientation::Orientation;

#[derive(Debug, Default)]
pub struct BoundaryRegistry {
    boundaries: Vec<Boundary>,
    ratios: Vec<[i64; AXES]>,
    default_expand: usize,
    initialized: bool,
    /// Monotonic version that changes on any structural modification.
    version: u64,
    plan: OnceCell<ExchangePlan>,
}

impl InvalidateCache for BoundaryRegistry {
    fn invalidate_cache(&mut self) {
        self.plan = OnceCell::new();
        self.version = self.version.wrapping_add(1);
    }
}

impl BoundaryRegistry {
    /// Registry requesting one ghost layer per face.
    pub fn new() -> Self {
        Self::with_options(&ExchangeOptions::default())
    }

    pub fn with_options(options: &ExchangeOptions) -> Self {
        Self {
            default_expand: options.ghost_layers,
            ..Self::default()
        }
    }

    /// Allocate `n` empty boundary records.
    ///
    /// # Errors
    /// `AlreadyInitialized` if called twice without an intervening
    /// [`reset_cached_members`](Self::reset_cached_members).
    pub fn set_num_domains(&mut self, n: usize) -> Result<(), HaloError> {
        if self.initialized {
            return Err(HaloError::AlreadyInitialized);
        }
        let expand = [self.default_expand; 2 * AXES];
        self.boundaries = (0..n).map(|_| Boundary::with_expand(expand)).collect();
        self.initialized = true;
        self.invalidate_cache();
        Ok(())
    }

    #[inline]
    pub fn num_domains(&self) -> usize {
        self.boundaries.len()
    }

    /// Monotonic version that changes whenever the registry changes.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    fn check(&self, domain: DomainId) -> Result<(), HaloError> {
        if domain < self.boundaries.len() {
            Ok(())
        } else {
            Err(HaloError::InvalidDomain {
                domain,
                count: self.boundaries.len(),
            })
        }
    }

    fn set_indices(
        &mut self,
        domain: DomainId,
        level: usize,
        extents: [i64; 6],
    ) -> Result<(), HaloError> {
        self.check(domain)?;
        let points = IndexBox::from_extents(extents);
        if points.is_empty() {
            return Err(HaloError::InvalidExtents(extents));
        }
        self.boundaries[domain].set_old_points(points, level);
        self.invalidate_cache();
        Ok(())
    }

    /// Record the native point extents of `domain`.
    pub fn set_extents(&mut self, domain: DomainId, extents: [i64; 6]) -> Result<(), HaloError> {
        self.set_indices(domain, 0, extents)
    }

    /// Record the native point extents of a rectilinear `domain`.
    ///
    /// Same as [`set_extents`](Self::set_extents): the registry only sees
    /// index boxes, and the mesh shape is checked when geometry is exchanged.
    pub fn set_indices_for_rect_grid(
        &mut self,
        domain: DomainId,
        extents: [i64; 6],
    ) -> Result<(), HaloError> {
        self.set_indices(domain, 0, extents)
    }

    /// Record an AMR patch: `extents` live in `level`'s global index space.
    pub fn set_indices_for_amr_patch(
        &mut self,
        domain: DomainId,
        level: usize,
        extents: [i64; 6],
    ) -> Result<(), HaloError> {
        self.set_indices(domain, level, extents)
    }

    /// Per-axis refinement ratio between level `l` and `l + 1`, for each `l`.
    pub fn set_refinement_ratios(&mut self, ratios: Vec<[i64; AXES]>) -> Result<(), HaloError> {
        if let Some(bad) = ratios.iter().find(|r| r.iter().any(|&x| x < 1)) {
            return Err(HaloError::InvalidRefinementRatio(*bad));
        }
        self.ratios = ratios;
        for b in &mut self.boundaries {
            b.set_expand(b.expand());
        }
        self.invalidate_cache();
        Ok(())
    }

    #[inline]
    pub fn refinement_ratios(&self) -> &[[i64; AXES]] {
        &self.ratios
    }

    /// Per-face ghost width request, `expand[6]` order.
    pub fn set_ghost_request(
        &mut self,
        domain: DomainId,
        expand: [usize; 2 * AXES],
    ) -> Result<(), HaloError> {
        self.check(domain)?;
        self.boundaries[domain].set_expand(expand);
        self.invalidate_cache();
        Ok(())
    }

    /// Append a neighbor record to `domain`.
    ///
    /// `overlap` is the shared point region in `domain`'s index space. It
    /// must be flat on exactly one axis along which `domain` is not flat,
    /// on `domain`'s min or max plane; that picks the face. Records are
    /// never deduplicated: two distinct touching regions between the same
    /// pair are legitimate.
    pub fn add_neighbor(
        &mut self,
        domain: DomainId,
        other: DomainId,
        match_code: u8,
        orientation: [i8; AXES],
        overlap: [i64; 6],
    ) -> Result<(), HaloError> {
        self.check(domain)?;
        self.check(other)?;
        let orient = Orientation::new(orientation)?;
        let expected = orient.match_code();
        if match_code != expected {
            return Err(HaloError::MatchCodeMismatch {
                given: match_code,
                expected,
                orientation,
            });
        }
        let region = IndexBox::from_extents(overlap);
        if region.is_empty() {
            return Err(HaloError::InvalidExtents(overlap));
        }
        let old = self.boundaries[domain]
            .old_points()
            .ok_or(HaloError::ExtentsNotSet(domain))?;
        let face = face_of(&old, &region)
            .filter(|_| old.contains_box(&region))
            .ok_or(HaloError::NotAFace { domain, overlap })?;
        self.boundaries[domain].push_neighbor(Neighbor {
            domain: other,
            match_code,
            orientation: orient,
            face,
            overlap: region,
            point_dims: [0; AXES],
            cell_dims: [0; AXES],
            level: LevelRelation::Same,
        });
        self.invalidate_cache();
        Ok(())
    }

    /// Commit the ghosted extents of `domain`.
    ///
    /// Each face with at least one neighbor grows by the requested width,
    /// capped by how many cells that neighbor can supply. Recomputed from
    /// scratch every call, so repeated calls agree.
    pub fn finish(&mut self, domain: DomainId) -> Result<IndexBox, HaloError> {
        self.check(domain)?;
        let b = &self.boundaries[domain];
        if b.old_points().is_none() {
            return Err(HaloError::ExtentsNotSet(domain));
        }
        let mut refreshed = Vec::with_capacity(b.neighbors().len());
        for n in b.neighbors() {
            let nb = self.boundary(n.domain)?;
            let pts = nb.old_points().ok_or(HaloError::ExtentsNotSet(n.domain))?;
            let level = self.level_relation(b.level(), nb.level())?;
            refreshed.push((pts.dims(), pts.cells_of_points().dims(), level));
        }
        let b = &mut self.boundaries[domain];
        for (n, (pd, cd, level)) in b.neighbors_mut().iter_mut().zip(refreshed) {
            n.point_dims = pd;
            n.cell_dims = cd;
            n.level = level;
        }
        let new = b
            .commit(|n| {
                let axis = n.orientation.axis(n.face.axis);
                n.level
                    .to_local_cells(n.face.axis, n.cell_dims[axis] as i64)
            })
            .ok_or(HaloError::ExtentsNotSet(domain))?;
        self.invalidate_cache();
        log::trace!("finished domain {domain}: {new:?}");
        Ok(new)
    }

    /// Finish every domain that has extents; failures are returned, not fatal.
    pub fn finish_all(&mut self) -> Vec<HaloError> {
        let mut errors = Vec::new();
        for d in 0..self.boundaries.len() {
            if self.boundaries[d].old_points().is_none() {
                continue;
            }
            if let Err(e) = self.finish(d) {
                log::warn!("finish({d}) failed: {e}");
                errors.push(e);
            }
        }
        errors
    }

    /// Boundary record of `domain`.
    pub fn boundary(&self, domain: DomainId) -> Result<&Boundary, HaloError> {
        self.check(domain)?;
        Ok(&self.boundaries[domain])
    }

    #[inline]
    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub(crate) fn remove_neighbors(
        &mut self,
        domain: DomainId,
        drop: impl Fn(&Neighbor) -> bool,
    ) -> Result<(), HaloError> {
        self.check(domain)?;
        self.boundaries[domain].retain_neighbors(|n| !drop(n));
        self.invalidate_cache();
        Ok(())
    }

    /// Cumulative per-axis ratio from level `coarse` up to level `fine`.
    pub fn ratio_between(&self, coarse: usize, fine: usize) -> Result<[i64; AXES], HaloError> {
        let mut r = [1i64; AXES];
        for l in coarse..fine {
            let step = self
                .ratios
                .get(l)
                .ok_or(HaloError::MissingRefinementRatio(l))?;
            for a in 0..AXES {
                r[a] *= step[a];
            }
        }
        Ok(r)
    }

    /// How a domain at level `other` looks from a domain at level `own`.
    pub fn level_relation(&self, own: usize, other: usize) -> Result<LevelRelation, HaloError> {
        use std::cmp::Ordering;
        match own.cmp(&other) {
            Ordering::Equal => Ok(LevelRelation::Same),
            Ordering::Less => Ok(LevelRelation::Finer(self.ratio_between(own, other)?)),
            Ordering::Greater => Ok(LevelRelation::Coarser(self.ratio_between(other, own)?)),
        }
    }

    /// Drop every domain and cached derivation; the next timestep starts
    /// again at [`set_num_domains`](Self::set_num_domains).
    pub fn reset_cached_members(&mut self) {
        self.boundaries.clear();
        self.ratios.clear();
        self.initialized = false;
        self.invalidate_cache();
    }

    /// The exchange plan derived from the current topology.
    ///
    /// Built on first use and cached until the registry changes.
    pub fn plan(&self) -> &ExchangePlan {
        self.plan.get_or_init(|| ExchangePlan::build(self))
    }

    /// Index of the record in `owner.neighbors[slot].domain` that describes
    /// the same shared region from the other side.
    pub(crate) fn find_reciprocal(&self, owner: DomainId, slot: usize) -> Result<usize, HaloError> {
        let n = &self.boundary(owner)?.neighbors()[slot];
        let other = self.boundary(n.domain)?;
        let face = n.reciprocal_face();
        let candidates: Vec<usize> = if n.level.is_same() {
            let inv = n.orientation.inverse();
            let shape = n.overlap.dims();
            other
                .neighbors()
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    m.domain == owner
                        && m.face == face
                        && m.orientation == inv
                        && (0..AXES).all(|a| m.overlap.dims()[n.orientation.axis(a)] == shape[a])
                })
                .map(|(i, _)| i)
                .collect()
        } else {
            other
                .neighbors()
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    m.domain == owner
                        && m.face == face
                        && m.orientation.is_identity()
                        && overlaps_across_levels(n, m)
                })
                .map(|(i, _)| i)
                .collect()
        };
        match candidates.as_slice() {
            [] => Err(HaloError::MissingReciprocal {
                domain: owner,
                neighbor: n.domain,
            }),
            [only] => Ok(*only),
            many => {
                let exact: Vec<usize> = many
                    .iter()
                    .copied()
                    .filter(|&i| other.neighbors()[i].overlap == n.overlap)
                    .collect();
                if exact.len() == 1 {
                    Ok(exact[0])
                } else {
                    Err(HaloError::AmbiguousReciprocal {
                        domain: owner,
                        neighbor: n.domain,
                        candidates: many.len(),
                    })
                }
            }
        }
    }
}

impl DebugInvariants for BoundaryRegistry {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BoundaryRegistry");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        for (d, b) in self.boundaries.iter().enumerate() {
            for slot in 0..b.neighbors().len() {
                self.find_reciprocal(d, slot)?;
            }
        }
        Ok(())
    }
}

/// Face of `domain` that `overlap` lies on, if exactly one fits.
fn face_of(domain: &IndexBox, overlap: &IndexBox) -> Option<Face> {
    let mut found = None;
    for a in 0..AXES {
        if domain.is_flat(a) || !overlap.is_flat(a) {
            continue;
        }
        let side = if overlap.lo[a] == domain.lo[a] {
            Side::Low
        } else if overlap.lo[a] == domain.hi[a] {
            Side::High
        } else {
            continue;
        };
        if found.is_some() {
            return None;
        }
        found = Some(Face::new(a, side));
    }
    found
}

fn overlaps_across_levels(n: &Neighbor, m: &Neighbor) -> bool {
    let (mine, theirs) = match n.level {
        LevelRelation::Finer(r) => (n.overlap.scale(r), m.overlap),
        LevelRelation::Coarser(r) => (n.overlap, m.overlap.scale(r)),
        LevelRelation::Same => (n.overlap, m.overlap),
    };
    !mine.intersect(&theirs).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blocks() -> BoundaryRegistry {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
        reg.add_neighbor(0, 1, 0, [1, 2, 3], [4, 4, 0, 4, 0, 0]).unwrap();
        reg.add_neighbor(1, 0, 0, [1, 2, 3], [4, 4, 0, 4, 0, 0]).unwrap();
        reg
    }

    #[test]
    fn set_num_domains_only_once_per_timestep() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(3).unwrap();
        assert_eq!(reg.set_num_domains(3), Err(HaloError::AlreadyInitialized));
        reg.reset_cached_members();
        assert!(reg.set_num_domains(5).is_ok());
        assert_eq!(reg.num_domains(), 5);
    }

    #[test]
    fn out_of_range_domain_is_reported() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(1).unwrap();
        assert_eq!(
            reg.set_extents(3, [0, 1, 0, 1, 0, 0]),
            Err(HaloError::InvalidDomain { domain: 3, count: 1 })
        );
        assert!(matches!(
            reg.add_neighbor(0, 9, 0, [1, 2, 3], [0, 0, 0, 1, 0, 0]),
            Err(HaloError::InvalidDomain { domain: 9, .. })
        ));
    }

    #[test]
    fn finish_without_extents_fails() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(1).unwrap();
        assert_eq!(reg.finish(0), Err(HaloError::ExtentsNotSet(0)));
    }

    #[test]
    fn finish_grows_only_faces_with_neighbors() {
        let mut reg = two_blocks();
        let new0 = reg.finish(0).unwrap();
        let new1 = reg.finish(1).unwrap();
        assert_eq!(new0, IndexBox::from_extents([0, 5, 0, 4, 0, 0]));
        assert_eq!(new1, IndexBox::from_extents([3, 8, 0, 4, 0, 0]));
        let b0 = reg.boundary(0).unwrap();
        assert_eq!(b0.new_cells().unwrap().dims(), [5, 4, 1]);
        assert_eq!(b0.granted(Face::new(0, Side::High)), 1);
        assert_eq!(b0.granted(Face::new(1, Side::Low)), 0);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut reg = two_blocks();
        let first = reg.finish(0).unwrap();
        let second = reg.finish(0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn margin_is_capped_by_neighbor_supply() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 6, 0, 4, 0, 0]).unwrap();
        reg.set_ghost_request(0, [3; 6]).unwrap();
        reg.add_neighbor(0, 1, 0, [1, 2, 3], [4, 4, 0, 4, 0, 0]).unwrap();
        let new0 = reg.finish(0).unwrap();
        assert_eq!(new0.hi[0], 6);
    }

    #[test]
    fn neighbor_face_is_derived_from_overlap() {
        let reg = two_blocks();
        assert_eq!(
            reg.boundary(0).unwrap().neighbors()[0].face,
            Face::new(0, Side::High)
        );
        assert_eq!(
            reg.boundary(1).unwrap().neighbors()[0].face,
            Face::new(0, Side::Low)
        );
    }

    #[test]
    fn interior_or_edge_overlaps_are_not_faces() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 4]).unwrap();
        reg.set_extents(1, [4, 8, 4, 8, 0, 4]).unwrap();
        let edge = reg.add_neighbor(0, 1, 0, [1, 2, 3], [4, 4, 4, 4, 0, 4]);
        assert!(matches!(edge, Err(HaloError::NotAFace { domain: 0, .. })));
        let interior = reg.add_neighbor(0, 1, 0, [1, 2, 3], [2, 2, 0, 4, 0, 4]);
        assert!(matches!(interior, Err(HaloError::NotAFace { .. })));
    }

    #[test]
    fn match_code_must_agree_with_orientation() {
        let mut reg = two_blocks();
        let err = reg.add_neighbor(0, 1, 0, [2, 1, 3], [4, 4, 0, 4, 0, 0]).unwrap_err();
        assert!(matches!(err, HaloError::MatchCodeMismatch { given: 0, .. }));
    }

    #[test]
    fn symmetric_records_validate() {
        let reg = two_blocks();
        assert!(reg.validate_invariants().is_ok());
    }

    #[test]
    fn one_sided_record_is_a_defect() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
        reg.add_neighbor(0, 1, 0, [1, 2, 3], [4, 4, 0, 4, 0, 0]).unwrap();
        assert_eq!(
            reg.validate_invariants(),
            Err(HaloError::MissingReciprocal { domain: 0, neighbor: 1 })
        );
    }

    #[test]
    fn level_relations_multiply_ratios() {
        let mut reg = BoundaryRegistry::new();
        reg.set_refinement_ratios(vec![[2, 2, 1], [4, 4, 1]]).unwrap();
        assert_eq!(reg.level_relation(0, 0).unwrap(), LevelRelation::Same);
        assert_eq!(reg.level_relation(0, 2).unwrap(), LevelRelation::Finer([8, 8, 1]));
        assert_eq!(reg.level_relation(1, 0).unwrap(), LevelRelation::Coarser([2, 2, 1]));
        assert_eq!(
            reg.level_relation(0, 3),
            Err(HaloError::MissingRefinementRatio(2))
        );
        assert!(reg.set_refinement_ratios(vec![[0, 1, 1]]).is_err());
        assert_eq!(reg.refinement_ratios().to_vec(), vec![[2, 2, 1], [4, 4, 1]]);
    }

    #[test]
    fn mutation_invalidates_cached_plan() {
        let mut reg = two_blocks();
        reg.finish_all();
        let v = reg.version();
        let _ = reg.plan();
        reg.set_ghost_request(0, [2; 6]).unwrap();
        assert!(reg.version() > v);
        assert!(!reg.boundary(0).unwrap().is_finished());
    }
}
