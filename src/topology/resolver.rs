//! Automatic neighbor discovery from extents alone.
//!
//! Two domains are neighbors when their point boxes, expressed in the
//! finer of their two level index spaces, touch on exactly one non-flat
//! axis and overlap with positive length on every other non-flat axis.
//! Discovered relations always use the identity orientation; blocks with
//! rotated index spaces must be registered explicitly.
//!
//! The pairwise test is quadratic in the number of domains.

use std::collections::BTreeSet;

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::extents::{AXES, Face, IndexBox, Side, div_ceil, div_floor};
use crate::topology::orientation::Orientation;
use crate::topology::registry::BoundaryRegistry;

/// Outcome of [`resolve_neighbors`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolveReport {
    /// Neighbor records added (two per discovered pair).
    pub added: usize,
    /// Candidate pairs dropped because their shared regions collide.
    pub ambiguous: Vec<HaloError>,
    /// Domains that could not be finished afterwards.
    pub finish_errors: Vec<HaloError>,
}

/// One side of a discovered pair.
#[derive(Clone, Debug)]
struct Candidate {
    domain: DomainId,
    other: DomainId,
    face: Face,
    region: IndexBox,
    same_level: bool,
}

/// Rebuild every neighbor list from the registered extents, then finish
/// every domain.
///
/// Existing neighbor records of domains with extents are replaced.
///
/// # Errors
/// `MissingRefinementRatio` when two domains on different levels have no
/// ratio registered between them.
pub fn resolve_neighbors(registry: &mut BoundaryRegistry) -> Result<ResolveReport, HaloError> {
    let domains: Vec<(DomainId, usize, IndexBox)> = registry
        .boundaries()
        .iter()
        .enumerate()
        .filter_map(|(d, b)| b.old_points().map(|p| (d, b.level(), p)))
        .collect();

    let mut candidates = Vec::new();
    for (x, &(a, level_a, box_a)) in domains.iter().enumerate() {
        for &(b, level_b, box_b) in &domains[x + 1..] {
            let (fa, fb, ra, rb) = if level_a == level_b {
                (box_a, box_b, [1; AXES], [1; AXES])
            } else if level_a < level_b {
                let r = registry.ratio_between(level_a, level_b)?;
                (box_a.scale(r), box_b, r, [1; AXES])
            } else {
                let r = registry.ratio_between(level_b, level_a)?;
                (box_a, box_b.scale(r), [1; AXES], r)
            };
            let Some((axis, side, shared)) = touch(&fa, &fb) else {
                continue;
            };
            let same_level = level_a == level_b;
            candidates.push(Candidate {
                domain: a,
                other: b,
                face: Face::new(axis, side),
                region: unscale(&shared, ra).intersect(&box_a),
                same_level,
            });
            candidates.push(Candidate {
                domain: b,
                other: a,
                face: Face::new(axis, side.flip()),
                region: unscale(&shared, rb).intersect(&box_b),
                same_level,
            });
        }
    }

    let mut report = ResolveReport::default();
    let dropped = ambiguous_pairs(registry, &candidates, &mut report.ambiguous);

    for &(d, _, _) in &domains {
        registry.remove_neighbors(d, |_| true)?;
    }
    let identity = Orientation::IDENTITY;
    for c in &candidates {
        if dropped.contains(&pair(c.domain, c.other)) {
            continue;
        }
        registry.add_neighbor(
            c.domain,
            c.other,
            identity.match_code(),
            identity.raw(),
            c.region.to_extents(),
        )?;
        report.added += 1;
    }
    registry.debug_assert_invariants();
    log::debug!(
        "resolved {} neighbor records across {} domains",
        report.added,
        domains.len()
    );

    report.finish_errors = registry.finish_all();
    Ok(report)
}

/// Touch axis, side of `a` it lies on, and shared point region.
fn touch(a: &IndexBox, b: &IndexBox) -> Option<(usize, Side, IndexBox)> {
    let mut found = None;
    for axis in 0..AXES {
        if a.is_flat(axis) || b.is_flat(axis) {
            if a.lo[axis] != b.lo[axis] || a.hi[axis] != b.hi[axis] {
                return None;
            }
            continue;
        }
        let overlap = a.hi[axis].min(b.hi[axis]) - a.lo[axis].max(b.lo[axis]);
        if overlap > 0 {
            continue;
        }
        if overlap < 0 || found.is_some() {
            return None;
        }
        let side = if a.hi[axis] == b.lo[axis] {
            Side::High
        } else {
            Side::Low
        };
        found = Some((axis, side));
    }
    let (axis, side) = found?;
    Some((axis, side, a.intersect(b)))
}

/// Fine-frame region back to a coarse frame, widened to whole coarse indices.
fn unscale(region: &IndexBox, ratio: [i64; AXES]) -> IndexBox {
    IndexBox {
        lo: std::array::from_fn(|a| div_floor(region.lo[a], ratio[a])),
        hi: std::array::from_fn(|a| div_ceil(region.hi[a], ratio[a])),
    }
}

#[inline]
fn pair(a: DomainId, b: DomainId) -> (DomainId, DomainId) {
    (a.min(b), a.max(b))
}

/// Same-level candidates of one domain face whose regions share cells.
fn ambiguous_pairs(
    registry: &BoundaryRegistry,
    candidates: &[Candidate],
    issues: &mut Vec<HaloError>,
) -> BTreeSet<(DomainId, DomainId)> {
    let mut dropped = BTreeSet::new();
    for (x, c1) in candidates.iter().enumerate() {
        if !c1.same_level {
            continue;
        }
        for c2 in &candidates[x + 1..] {
            if !c2.same_level || c2.domain != c1.domain || c2.face != c1.face {
                continue;
            }
            let Ok(b) = registry.boundary(c1.domain) else {
                continue;
            };
            let Some(own) = b.old_points() else { continue };
            let shares_cells = (0..AXES)
                .filter(|&t| t != c1.face.axis && !own.is_flat(t))
                .all(|t| {
                    c1.region.hi[t].min(c2.region.hi[t]) - c1.region.lo[t].max(c2.region.lo[t]) > 0
                });
            if shares_cells {
                log::warn!(
                    "domains {} and {} both claim face {} of domain {}; dropping both",
                    c1.other,
                    c2.other,
                    c1.face,
                    c1.domain
                );
                issues.push(HaloError::AmbiguousFace {
                    domain: c1.domain,
                    face: c1.face,
                    first: c1.other,
                    second: c2.other,
                });
                dropped.insert(pair(c1.domain, c1.other));
                dropped.insert(pair(c2.domain, c2.other));
            }
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::neighbor::LevelRelation;

    #[test]
    fn two_blocks_share_a_face() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
        let report = resolve_neighbors(&mut reg).unwrap();
        assert_eq!(report.added, 2);
        assert!(report.ambiguous.is_empty());
        let n = &reg.boundary(0).unwrap().neighbors()[0];
        assert_eq!(n.domain, 1);
        assert_eq!(n.face, Face::new(0, Side::High));
        assert_eq!(n.overlap, IndexBox::from_extents([4, 4, 0, 4, 0, 0]));
        assert!(reg.validate_invariants().is_ok());
        assert!(reg.boundary(1).unwrap().is_finished());
    }

    #[test]
    fn edge_and_corner_contacts_are_not_neighbors() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 4, 8, 0, 0]).unwrap();
        let report = resolve_neighbors(&mut reg).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(
            reg.boundary(0).unwrap().new_points(),
            reg.boundary(0).unwrap().old_points()
        );
    }

    #[test]
    fn coarse_fine_pair_stores_native_regions() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_refinement_ratios(vec![[2, 2, 1]]).unwrap();
        reg.set_indices_for_amr_patch(0, 0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_indices_for_amr_patch(1, 1, [8, 16, 0, 8, 0, 0]).unwrap();
        let report = resolve_neighbors(&mut reg).unwrap();
        assert_eq!(report.added, 2);
        let coarse = &reg.boundary(0).unwrap().neighbors()[0];
        assert_eq!(coarse.overlap, IndexBox::from_extents([4, 4, 0, 4, 0, 0]));
        assert_eq!(coarse.level, LevelRelation::Finer([2, 2, 1]));
        let fine = &reg.boundary(1).unwrap().neighbors()[0];
        assert_eq!(fine.overlap, IndexBox::from_extents([8, 8, 0, 8, 0, 0]));
        assert_eq!(fine.level, LevelRelation::Coarser([2, 2, 1]));
        assert!(reg.validate_invariants().is_ok());
    }

    #[test]
    fn overlapping_candidates_on_one_face_are_dropped() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(3).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 0, 3, 0, 0]).unwrap();
        reg.set_extents(2, [4, 8, 2, 4, 0, 0]).unwrap();
        let report = resolve_neighbors(&mut reg).unwrap();
        assert_eq!(report.ambiguous.len(), 1);
        assert!(reg.boundary(0).unwrap().neighbors().is_empty());
    }

    #[test]
    fn missing_ratio_is_an_error() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_indices_for_amr_patch(0, 0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_indices_for_amr_patch(1, 1, [8, 16, 0, 8, 0, 0]).unwrap();
        assert_eq!(
            resolve_neighbors(&mut reg),
            Err(HaloError::MissingRefinementRatio(0))
        );
    }

    #[test]
    fn resolving_twice_does_not_duplicate() {
        let mut reg = BoundaryRegistry::new();
        reg.set_num_domains(2).unwrap();
        reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
        reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
        resolve_neighbors(&mut reg).unwrap();
        resolve_neighbors(&mut reg).unwrap();
        assert_eq!(reg.boundary(0).unwrap().neighbors().len(), 1);
    }
}
