//! Exchange plan: every ghost-layer transfer the registry implies.
//!
//! The plan is derived from the registry alone (never from ownership), so
//! every rank computes the same transfers in the same order. Transfer ids
//! are positions in that order and double as write priorities: a ghost
//! slot covered by several transfers keeps the value of the lowest id.
//!
//! Ordering key: level gap first (same-level neighbors win), then the
//! target face in `expand[6]` order, then source id, then neighbor slot.

use std::collections::BTreeMap;

use crate::data::ghost_flags::GhostFlags;
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::extents::{AXES, Centering, Face, IndexBox, Side, div_ceil, div_floor};
use crate::topology::neighbor::{LevelRelation, Neighbor};
use crate::topology::registry::BoundaryRegistry;

/// How source values are combined into one target entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gather {
    /// A single source entity.
    Copy([i64; AXES]),
    /// Mean of the inclusive source block (coarse target, fine source).
    Mean { lo: [i64; AXES], hi: [i64; AXES] },
    /// Multilinear interpolation from `base` towards `base + 1` on every
    /// axis with `num > 0`, at fraction `num / den`.
    Lerp {
        base: [i64; AXES],
        num: [i64; AXES],
        den: [i64; AXES],
    },
}

impl Gather {
    /// Smallest box holding every source entity the stencil reads.
    pub fn footprint(&self) -> IndexBox {
        match *self {
            Gather::Copy(p) => IndexBox::new(p, p),
            Gather::Mean { lo, hi } => IndexBox::new(lo, hi),
            Gather::Lerp { base, num, .. } => IndexBox::new(
                base,
                std::array::from_fn(|a| base[a] + i64::from(num[a] > 0)),
            ),
        }
    }
}

/// Target index → source stencil.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexMap {
    /// Same level: `source[perm[a]] = offset[a] + sign[a] * target[a]` on
    /// points. Cells along non-flat reversed axes shift by one.
    Oriented {
        perm: [usize; AXES],
        sign: [i64; AXES],
        offset: [i64; AXES],
        flat: [bool; AXES],
    },
    /// Identity orientation across levels.
    Refined(LevelRelation),
}

impl IndexMap {
    /// Per-axis affine constant for `centering`: source = k + sign * target.
    fn affine(&self, centering: Centering, a: usize) -> (usize, i64, i64) {
        match *self {
            IndexMap::Oriented {
                perm,
                sign,
                offset,
                flat,
            } => {
                let k = if centering == Centering::Zones && !flat[a] && sign[a] < 0 {
                    offset[a] - 1
                } else {
                    offset[a]
                };
                (perm[a], sign[a], k)
            }
            IndexMap::Refined(_) => (a, 1, 0),
        }
    }

    /// Source stencil for target entity `t`.
    pub fn gather(&self, t: [i64; AXES], centering: Centering) -> Gather {
        match (*self, centering) {
            (IndexMap::Oriented { .. }, _) | (IndexMap::Refined(LevelRelation::Same), _) => {
                let mut s = [0i64; AXES];
                for (a, &ta) in t.iter().enumerate() {
                    let (pa, sign, k) = self.affine(centering, a);
                    s[pa] = k + sign * ta;
                }
                Gather::Copy(s)
            }
            (IndexMap::Refined(LevelRelation::Finer(r)), Centering::Zones) => Gather::Mean {
                lo: std::array::from_fn(|a| t[a] * r[a]),
                hi: std::array::from_fn(|a| t[a] * r[a] + r[a] - 1),
            },
            (IndexMap::Refined(LevelRelation::Finer(r)), Centering::Nodes) => {
                Gather::Copy(std::array::from_fn(|a| t[a] * r[a]))
            }
            (IndexMap::Refined(LevelRelation::Coarser(r)), Centering::Zones) => {
                Gather::Copy(std::array::from_fn(|a| div_floor(t[a], r[a])))
            }
            (IndexMap::Refined(LevelRelation::Coarser(r)), Centering::Nodes) => Gather::Lerp {
                base: std::array::from_fn(|a| div_floor(t[a], r[a])),
                num: std::array::from_fn(|a| t[a].rem_euclid(r[a])),
                den: r,
            },
        }
    }

    /// Target entities whose whole stencil lies inside `source`.
    pub fn pull_back(&self, source: &IndexBox, centering: Centering) -> IndexBox {
        if source.is_empty() {
            return IndexBox::EMPTY;
        }
        let mut out = IndexBox::EMPTY;
        for a in 0..AXES {
            let (lo, hi) = match (*self, centering) {
                (IndexMap::Oriented { .. }, _) | (IndexMap::Refined(LevelRelation::Same), _) => {
                    let (pa, sign, k) = self.affine(centering, a);
                    let (slo, shi) = (source.lo[pa], source.hi[pa]);
                    if sign > 0 {
                        (slo - k, shi - k)
                    } else {
                        (k - shi, k - slo)
                    }
                }
                (IndexMap::Refined(LevelRelation::Finer(r)), Centering::Zones) => (
                    div_ceil(source.lo[a], r[a]),
                    div_floor(source.hi[a] + 1, r[a]) - 1,
                ),
                (IndexMap::Refined(LevelRelation::Finer(r)), Centering::Nodes) => {
                    (div_ceil(source.lo[a], r[a]), div_floor(source.hi[a], r[a]))
                }
                (IndexMap::Refined(LevelRelation::Coarser(r)), Centering::Zones) => {
                    (source.lo[a] * r[a], source.hi[a] * r[a] + r[a] - 1)
                }
                (IndexMap::Refined(LevelRelation::Coarser(r)), Centering::Nodes) => {
                    (source.lo[a] * r[a], source.hi[a] * r[a])
                }
            };
            out.lo[a] = lo;
            out.hi[a] = hi;
        }
        if out.is_empty() { IndexBox::EMPTY } else { out }
    }
}

/// One directed fill: part of `target`'s ghost layer on `face`, read from `source`.
#[derive(Clone, Debug, PartialEq)]
pub struct Transfer {
    /// Position in plan order; lower ids win contested slots.
    pub id: u32,
    pub source: DomainId,
    pub target: DomainId,
    /// Face of the target the ghost layer grows from.
    pub face: Face,
    /// Index of the record in the target's neighbor list.
    pub slot: usize,
    pub map: IndexMap,
    /// Ghost cells filled, in target coordinates.
    pub zone_region: IndexBox,
    /// Ghost nodes filled, in target coordinates.
    pub node_region: IndexBox,
    /// Target nodes on the shared face (same level only).
    pub shared_nodes: IndexBox,
    /// Flag stamped on every slot this transfer fills.
    pub reason: GhostFlags,
    pub level_gap: usize,
}

impl Transfer {
    #[inline]
    pub fn region(&self, centering: Centering) -> IndexBox {
        match centering {
            Centering::Nodes => self.node_region,
            Centering::Zones => self.zone_region,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangePlan {
    transfers: Vec<Transfer>,
    by_target: BTreeMap<DomainId, Vec<usize>>,
    by_source: BTreeMap<DomainId, Vec<usize>>,
    issues: Vec<(DomainId, HaloError)>,
}

impl ExchangePlan {
    /// Derive all transfers from a registry. Records that cannot be mapped
    /// become issues of their owning domain; the face is left unfilled.
    pub fn build(registry: &BoundaryRegistry) -> Self {
        let mut transfers = Vec::new();
        let mut issues = Vec::new();
        for (target, b) in registry.boundaries().iter().enumerate() {
            if !b.is_finished() {
                if !b.neighbors().is_empty() {
                    issues.push((target, HaloError::NotFinished(target)));
                }
                continue;
            }
            for (slot, n) in b.neighbors().iter().enumerate() {
                match transfer_for(registry, target, slot, n) {
                    Ok(t) => transfers.push(t),
                    Err(e) => {
                        log::warn!("domain {target}: skipping face {} ({e})", n.face);
                        issues.push((target, e));
                    }
                }
            }
        }
        transfers.sort_by_key(|t| (t.level_gap, t.face.index(), t.source, t.target, t.slot));
        let mut by_target: BTreeMap<DomainId, Vec<usize>> = BTreeMap::new();
        let mut by_source: BTreeMap<DomainId, Vec<usize>> = BTreeMap::new();
        for (i, t) in transfers.iter_mut().enumerate() {
            t.id = i as u32;
            by_target.entry(t.target).or_default().push(i);
            by_source.entry(t.source).or_default().push(i);
            log::trace!(
                "transfer {}: {} -> {} on {} zones {:?} nodes {:?}",
                t.id,
                t.source,
                t.target,
                t.face,
                t.zone_region,
                t.node_region
            );
        }
        log::debug!(
            "exchange plan: {} transfers, {} issues",
            transfers.len(),
            issues.len()
        );
        Self {
            transfers,
            by_target,
            by_source,
            issues,
        }
    }

    #[inline]
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    #[inline]
    pub fn transfer(&self, id: u32) -> Option<&Transfer> {
        self.transfers.get(id as usize)
    }

    /// Transfers filling `domain`, in priority order.
    pub fn into_domain(&self, domain: DomainId) -> impl Iterator<Item = &Transfer> + '_ {
        self.by_target
            .get(&domain)
            .into_iter()
            .flatten()
            .map(|&i| &self.transfers[i])
    }

    /// Transfers reading from `domain`.
    pub fn from_domain(&self, domain: DomainId) -> impl Iterator<Item = &Transfer> + '_ {
        self.by_source
            .get(&domain)
            .into_iter()
            .flatten()
            .map(|&i| &self.transfers[i])
    }

    /// Problems found while planning, by owning domain.
    #[inline]
    pub fn issues(&self) -> &[(DomainId, HaloError)] {
        &self.issues
    }

    pub fn issues_of(&self, domain: DomainId) -> impl Iterator<Item = &HaloError> + '_ {
        self.issues
            .iter()
            .filter(move |(d, _)| *d == domain)
            .map(|(_, e)| e)
    }
}

/// Ghost layer of `width` beyond `face` of `old`, spanning `new`
/// tangentially (so corners are included).
fn ghost_layer(old: &IndexBox, new: &IndexBox, face: Face, width: i64) -> IndexBox {
    if width <= 0 || old.is_empty() {
        return IndexBox::EMPTY;
    }
    let a = face.axis;
    match face.side {
        Side::Low => new.with_axis(a, old.lo[a] - width, old.lo[a] - 1),
        Side::High => new.with_axis(a, old.hi[a] + 1, old.hi[a] + width),
    }
}

fn transfer_for(
    registry: &BoundaryRegistry,
    target: DomainId,
    slot: usize,
    n: &Neighbor,
) -> Result<Transfer, HaloError> {
    let tb = registry.boundary(target)?;
    let sb = registry.boundary(n.domain)?;
    let source_points = sb.old_points().ok_or(HaloError::ExtentsNotSet(n.domain))?;
    let (old_pts, new_pts) = match (tb.old_points(), tb.new_points()) {
        (Some(o), Some(w)) => (o, w),
        _ => return Err(HaloError::NotFinished(target)),
    };
    let (old_cells, new_cells) = (old_pts.cells_of_points(), new_pts.cells_of_points());

    let map = if n.level.is_same() {
        let m = &sb.neighbors()[registry.find_reciprocal(target, slot)?];
        let (r_t, r_s) = (n.overlap, m.overlap);
        let mut perm = [0usize; AXES];
        let mut sign = [1i64; AXES];
        let mut offset = [0i64; AXES];
        for a in 0..AXES {
            let pa = n.orientation.axis(a);
            perm[a] = pa;
            sign[a] = n.orientation.sign(a);
            offset[a] = if sign[a] > 0 {
                r_s.lo[pa] - r_t.lo[a]
            } else {
                r_s.hi[pa] + r_t.lo[a]
            };
        }
        IndexMap::Oriented {
            perm,
            sign,
            offset,
            flat: std::array::from_fn(|a| old_pts.is_flat(a)),
        }
    } else {
        if !n.orientation.is_identity() {
            return Err(HaloError::UnsupportedOrientation {
                domain: target,
                neighbor: n.domain,
                orientation: n.orientation.raw(),
            });
        }
        IndexMap::Refined(n.level)
    };

    let width = tb.granted(n.face) as i64;
    let zone_layer = ghost_layer(&old_cells, &new_cells, n.face, width);
    let node_layer = ghost_layer(&old_pts, &new_pts, n.face, width);
    let source_cells = source_points.cells_of_points();
    let zone_region = zone_layer.intersect(&map.pull_back(&source_cells, Centering::Zones));
    let node_region = node_layer.intersect(&map.pull_back(&source_points, Centering::Nodes));

    let (reason, shared_nodes) = if n.level.is_same() {
        (GhostFlags::DUPLICATED, n.overlap.intersect(&old_pts))
    } else {
        (GhostFlags::LEVEL_INTERFACE, IndexBox::EMPTY)
    };
    Ok(Transfer {
        id: 0,
        source: n.domain,
        target,
        face: n.face,
        slot,
        map,
        zone_region,
        node_region,
        shared_nodes,
        reason,
        level_gap: tb.level().abs_diff(sb.level()),
    })
}
