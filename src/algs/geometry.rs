//! Mesh geometry exchange.
//!
//! Curvilinear meshes carry one 3-component point per node and exchange
//! like any node field. Rectilinear meshes carry one coordinate array per
//! axis; a ghost layer on face `axis` only extends the coordinates along
//! that axis, so each transfer ships a single run of coordinates.

use std::collections::BTreeMap;

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{Exchangeable, GatherCtx, GhostExchanger, Made, MixedMode};
use crate::algs::plan::{Gather, IndexMap, Transfer};
use crate::algs::synthesize::{Fill, Placement};
use crate::data::field::{Field, Ghosted};
use crate::data::segment::{PayloadKind, Segment, SegmentData, SegmentHeader, SegmentStatus};
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::extents::{AXES, Centering, IndexBox};

/// A mesh whose point layout can be checked against the registry.
pub trait StructuredMesh {
    /// Number of points along each axis.
    fn point_dims(&self) -> [usize; AXES];
}

/// Explicit node coordinates, i-fastest, three components per node.
#[derive(Clone, Debug, PartialEq)]
pub struct CurvilinearMesh {
    dims: [usize; AXES],
    points: Field<f64>,
}

impl CurvilinearMesh {
    pub fn new(dims: [usize; AXES], coords: Vec<f64>) -> Result<Self, HaloError> {
        let points = Field::new(3, coords)?;
        let expected = dims.iter().product::<usize>();
        if points.len() != expected {
            return Err(HaloError::InvalidComponentCount {
                ncomps: 3,
                len: points.values().len(),
            });
        }
        Ok(Self { dims, points })
    }

    #[inline]
    pub fn points(&self) -> &Field<f64> {
        &self.points
    }

    /// Coordinates of node `i` (linear, i-fastest).
    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] {
        let t = self.points.tuple(i);
        [t[0], t[1], t[2]]
    }
}

impl StructuredMesh for CurvilinearMesh {
    fn point_dims(&self) -> [usize; AXES] {
        self.dims
    }
}

/// Points travel as a 3-component node field.
impl Exchangeable for CurvilinearMesh {
    const KIND: PayloadKind = PayloadKind::Floating;
    type Unpacked = Vec<f64>;

    fn tuples(&self) -> usize {
        self.points.len()
    }

    fn ncomps(&self) -> usize {
        3
    }

    fn gather(
        &self,
        source: &IndexBox,
        transfer: &Transfer,
        region: &IndexBox,
        ctx: &GatherCtx<'_>,
    ) -> Result<SegmentData, HaloError> {
        self.points.gather(source, transfer, region, ctx)
    }

    fn unpack(
        data: SegmentData,
        tuples: usize,
        ncomps: usize,
        transfer: u32,
    ) -> Result<Vec<f64>, HaloError> {
        <Field<f64> as Exchangeable>::unpack(data, tuples, ncomps, transfer)
    }

    fn assemble(
        native: Option<&Self>,
        ncomps: usize,
        placement: &Placement,
        received: &[Option<Vec<f64>>],
    ) -> Self {
        let native = native.map(|m| &m.points);
        Self {
            dims: placement.extents.dims(),
            points: Field::assemble(native, ncomps, placement, received),
        }
    }
}

/// Per-axis coordinate arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RectilinearMesh {
    coords: [Vec<f64>; AXES],
}

impl RectilinearMesh {
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        Self { coords: [x, y, z] }
    }

    #[inline]
    pub fn coords(&self, axis: usize) -> &[f64] {
        &self.coords[axis]
    }
}

impl StructuredMesh for RectilinearMesh {
    fn point_dims(&self) -> [usize; AXES] {
        std::array::from_fn(|a| self.coords[a].len())
    }
}

/// Coordinate along target axis `a` of the node `p` addresses.
fn coordinate(
    mesh: &RectilinearMesh,
    source: &IndexBox,
    t: &Transfer,
    a: usize,
    p: [i64; AXES],
) -> Result<f64, HaloError> {
    let sa = match t.map {
        IndexMap::Oriented { perm, .. } => perm[a],
        IndexMap::Refined(_) => a,
    };
    let at = |i: i64| -> Result<f64, HaloError> {
        let off = i - source.lo[sa];
        usize::try_from(off)
            .ok()
            .and_then(|o| mesh.coords[sa].get(o).copied())
            .ok_or(HaloError::GatherOutOfBounds {
                transfer: t.id,
                domain: t.source,
            })
    };
    match t.map.gather(p, Centering::Nodes) {
        Gather::Copy(s) => at(s[sa]),
        Gather::Mean { lo, .. } => at(lo[sa]),
        Gather::Lerp { base, num, den } => {
            let c0 = at(base[sa])?;
            if num[sa] == 0 {
                return Ok(c0);
            }
            let c1 = at(base[sa] + 1)?;
            Ok(c0 + (c1 - c0) * num[sa] as f64 / den[sa] as f64)
        }
    }
}

/// Fill every `None` outside the native range by extending the spacing
/// of the nearest two known coordinates.
fn extrapolate(values: &mut [Option<f64>], native: std::ops::Range<usize>) {
    if native.is_empty() {
        return;
    }
    for i in (0..native.start).rev() {
        if values[i].is_none() {
            let c1 = values[i + 1].unwrap_or(0.0);
            let c2 = values.get(i + 2).copied().flatten().unwrap_or(c1);
            values[i] = Some(c1 - (c2 - c1));
        }
    }
    for i in native.end..values.len() {
        if values[i].is_none() {
            let c1 = values[i - 1].unwrap_or(0.0);
            let c2 = if i >= 2 { values[i - 2].unwrap_or(c1) } else { c1 };
            values[i] = Some(c1 + (c1 - c2));
        }
    }
}

impl<C: Communicator> GhostExchanger<'_, C> {
    /// Check each mesh's point dimensions against the registry.
    ///
    /// Mismatched domains are quarantined: no transfer reads from or writes
    /// into them until a later call confirms a matching mesh. Returns the
    /// mismatches found.
    pub fn confirm_mesh<M: StructuredMesh>(
        &mut self,
        domains: &[DomainId],
        meshes: &[M],
    ) -> Result<Vec<HaloError>, HaloError> {
        self.check_call(domains, meshes.len())?;
        let mut mismatches = Vec::new();
        for (&d, mesh) in domains.iter().zip(meshes) {
            let expected = self
                .registry()
                .boundary(d)?
                .old_points()
                .map_or([0; AXES], |b| b.dims());
            let found = mesh.point_dims();
            if found == expected {
                self.release(d);
                continue;
            }
            let err = HaloError::MeshMismatch {
                domain: d,
                expected,
                found,
            };
            log::error!("{err}; domain quarantined from exchange");
            self.quarantine(d, err.clone());
            mismatches.push(err);
        }
        Ok(mismatches)
    }

    /// Ghosted node coordinates of curvilinear meshes.
    pub fn exchange_curvilinear(
        &self,
        domains: &[DomainId],
        meshes: &[CurvilinearMesh],
    ) -> Result<Vec<Ghosted<CurvilinearMesh>>, HaloError> {
        self.exchange_with(domains, Centering::Nodes, meshes, MixedMode::Material)
    }

    /// Ghosted coordinate arrays of rectilinear meshes.
    ///
    /// Ghost coordinates no neighbor supplies are extrapolated from the
    /// spacing at the domain edge.
    pub fn exchange_rectilinear(
        &self,
        domains: &[DomainId],
        meshes: &[RectilinearMesh],
    ) -> Result<Vec<Ghosted<RectilinearMesh>>, HaloError> {
        self.check_call(domains, meshes.len())?;
        let registry = self.registry();
        let plan = registry.plan();

        let mut issues: BTreeMap<DomainId, Vec<HaloError>> = BTreeMap::new();
        let mut usable: BTreeMap<DomainId, (&RectilinearMesh, IndexBox)> = BTreeMap::new();
        for (&d, mesh) in domains.iter().zip(meshes) {
            let entry = issues.entry(d).or_default();
            entry.extend(plan.issues_of(d).cloned());
            let Some(old) = registry.boundary(d)?.old_points() else {
                entry.push(HaloError::ExtentsNotSet(d));
                continue;
            };
            if mesh.point_dims() != old.dims() {
                entry.push(HaloError::MeshMismatch {
                    domain: d,
                    expected: old.dims(),
                    found: mesh.point_dims(),
                });
                continue;
            }
            usable.insert(d, (mesh, old));
        }

        let held: Vec<DomainId> = self.quarantined().map(|(d, _)| d).collect();
        let active = |t: &Transfer| !t.node_region.is_empty();
        let make = |t: &Transfer| {
            let region = t.node_region;
            let header = SegmentHeader {
                source: t.source,
                target: t.target,
                transfer: t.id,
                region,
                ncomps: 1,
                status: SegmentStatus::Filled,
            };
            let source = match usable.get(&t.source) {
                Some(s) if !held.contains(&t.source) => s,
                _ => {
                    return Made {
                        segment: Segment::skipped(header, PayloadKind::Floating),
                        issue: None,
                    };
                }
            };
            let (mesh, old) = *source;
            let a = t.face.axis;
            let run: Result<Vec<f64>, HaloError> = (region.lo[a]..=region.hi[a])
                .map(|k| {
                    let mut p = region.lo;
                    p[a] = k;
                    coordinate(mesh, &old, t, a, p)
                })
                .collect();
            match run {
                Ok(v) => Made {
                    segment: Segment {
                        header,
                        data: SegmentData::Floating(v),
                    },
                    issue: None,
                },
                Err(e) => Made {
                    segment: Segment::skipped(header, PayloadKind::Floating),
                    issue: Some((t.source, e)),
                },
            }
        };
        let (mut delivered, gather_issues) = self.route(plan, &active, make)?;
        for (d, e) in gather_issues {
            log::warn!("domain {d}: {e}");
            issues.entry(d).or_default().push(e);
        }

        let mut out = Vec::with_capacity(domains.len());
        for (&d, mesh) in domains.iter().zip(meshes) {
            let mut domain_issues = issues.remove(&d).unwrap_or_default();
            let b = registry.boundary(d)?;
            let old = b.old_points().unwrap_or(IndexBox::EMPTY);
            let new = b.new_extents(Centering::Nodes).unwrap_or(old);
            let native = usable.get(&d).map(|(m, _)| *m);

            let mut axes: [Vec<Option<f64>>; AXES] =
                std::array::from_fn(|a| vec![None; new.dims()[a]]);
            if let Some(m) = native {
                for a in 0..AXES {
                    let start = (old.lo[a] - new.lo[a]).max(0) as usize;
                    for (i, &c) in m.coords[a].iter().enumerate() {
                        axes[a][start + i] = Some(c);
                    }
                }
            }

            let mut fills = Vec::new();
            let held_here = self.is_quarantined(d);
            if let Some((_, reason)) = self.quarantined().find(|(q, _)| *q == d) {
                domain_issues.push(reason.clone());
            }
            for (si, seg) in delivered.take(d).into_iter().enumerate() {
                if held_here || seg.header.status == SegmentStatus::Skipped {
                    continue;
                }
                let Some(t) = plan.transfer(seg.header.transfer) else {
                    domain_issues.push(HaloError::MalformedSegment {
                        transfer: seg.header.transfer,
                        reason: "unknown transfer id".into(),
                    });
                    continue;
                };
                let a = t.face.axis;
                let expected = t.node_region.dims()[a];
                if t.target != d || seg.header.region != t.node_region {
                    domain_issues.push(HaloError::MalformedSegment {
                        transfer: t.id,
                        reason: "region does not match the plan".into(),
                    });
                    continue;
                }
                let values = match seg.data {
                    SegmentData::Floating(v) if v.len() == expected => v,
                    SegmentData::Floating(v) => {
                        domain_issues.push(HaloError::MalformedSegment {
                            transfer: t.id,
                            reason: format!("expected {expected} coordinates, found {}", v.len()),
                        });
                        continue;
                    }
                    other => {
                        return Err(HaloError::KindMismatch {
                            expected: PayloadKind::Floating,
                            found: other.kind(),
                        });
                    }
                };
                for (k, c) in (t.node_region.lo[a]..=t.node_region.hi[a]).zip(values) {
                    if old.lo[a] <= k && k <= old.hi[a] {
                        continue;
                    }
                    let slot = &mut axes[a][(k - new.lo[a]) as usize];
                    if slot.is_none() {
                        *slot = Some(c);
                    }
                }
                fills.push(Fill {
                    region: t.node_region,
                    reason: t.reason,
                    segment: Some(si),
                });
            }

            let coords = std::array::from_fn(|a| {
                let start = (old.lo[a] - new.lo[a]).max(0) as usize;
                let native_range = start..start + old.dims()[a];
                let mut v = std::mem::take(&mut axes[a]);
                if native.is_some() {
                    extrapolate(&mut v, native_range);
                }
                v.into_iter().map(|c| c.unwrap_or(0.0)).collect()
            });
            let mut placement = Placement::build(&old, &new, fills);
            placement.mark_shared_nodes(d, plan);
            if native.is_none() {
                log::debug!("domain {d}: mesh {:?} not usable", mesh.point_dims());
            }
            out.push(Ghosted {
                domain: d,
                extents: new,
                data: RectilinearMesh { coords },
                flags: placement.flags,
                issues: domain_issues,
            });
        }
        Ok(out)
    }
}
