//! Slab extraction and assembly for every exchangeable array type.
//!
//! The source side evaluates each target entity's stencil
//! ([`Gather`](crate::algs::plan::Gather)) against its native array, so a
//! segment already holds target-ordered values and the receiver only
//! places them.

use crate::algs::plan::{Gather, Transfer};
use crate::algs::synthesize::{Placement, Slot};
use crate::config::{ExchangeOptions, NodeRefinement, ZoneCoarsening};
use crate::data::element::Element;
use crate::data::field::{Field, MixedCells};
use crate::data::segment::{PayloadKind, SegmentData};
use crate::mesh_error::HaloError;
use crate::topology::extents::{AXES, Centering, IndexBox};

/// How mixed-cell values combine when several children collapse into one cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MixedMode {
    /// Volume fractions: averaged over all children.
    #[default]
    Material,
    /// Per-material values: averaged over the children holding the material.
    MixVar,
}

/// Everything a gather needs besides the data.
#[derive(Clone, Copy, Debug)]
pub struct GatherCtx<'a> {
    pub centering: Centering,
    pub options: &'a ExchangeOptions,
    pub mixed: MixedMode,
}

/// An array type the engine can move between domains.
pub trait Exchangeable: Sized + Sync {
    /// Payload kind of this array type's segments.
    const KIND: PayloadKind;
    /// Decoded segment payload, ready for placement.
    type Unpacked;

    /// Number of tuples (entities) in the array.
    fn tuples(&self) -> usize;

    fn ncomps(&self) -> usize;

    /// Values for `region` (target coordinates) of `transfer`, read from
    /// this array laid out over the source's native box `source`.
    fn gather(
        &self,
        source: &IndexBox,
        transfer: &Transfer,
        region: &IndexBox,
        ctx: &GatherCtx<'_>,
    ) -> Result<SegmentData, HaloError>;

    /// Decode and size-check a delivered payload holding `tuples` tuples.
    fn unpack(data: SegmentData, tuples: usize, ncomps: usize, transfer: u32)
    -> Result<Self::Unpacked, HaloError>;

    /// Ghosted array from the native array (if usable) and the delivered segments.
    fn assemble(
        native: Option<&Self>,
        ncomps: usize,
        placement: &Placement,
        received: &[Option<Self::Unpacked>],
    ) -> Self;
}

fn check_footprint(source: &IndexBox, g: &Gather, transfer: &Transfer) -> Result<(), HaloError> {
    if source.contains_box(&g.footprint()) {
        Ok(())
    } else {
        Err(HaloError::GatherOutOfBounds {
            transfer: transfer.id,
            domain: transfer.source,
        })
    }
}

/// Corners of a multilinear stencil with their weights, `base` first.
fn lerp_terms(base: [i64; AXES], num: [i64; AXES], den: [i64; AXES]) -> Vec<([i64; AXES], f64)> {
    let mut terms = vec![(base, 1.0f64)];
    for a in 0..AXES {
        if num[a] == 0 {
            continue;
        }
        let t = num[a] as f64 / den[a] as f64;
        let mut next = Vec::with_capacity(terms.len() * 2);
        for &(p, w) in &terms {
            next.push((p, w * (1.0 - t)));
            let mut q = p;
            q[a] += 1;
            next.push((q, w * t));
        }
        terms = next;
    }
    terms
}

fn tuple_mismatch(transfer: u32, expected: usize, found: usize) -> HaloError {
    HaloError::MalformedSegment {
        transfer,
        reason: format!("expected {expected} values, found {found}"),
    }
}

fn tuple_of<T>(values: &[T], nc: usize, i: usize) -> &[T] {
    &values[i * nc..(i + 1) * nc]
}

/// Gather over a flat array of `nc`-wide tuples.
fn gather_tuples<T: Element>(
    values: &[T],
    nc: usize,
    source: &IndexBox,
    transfer: &Transfer,
    region: &IndexBox,
    ctx: &GatherCtx<'_>,
) -> Result<SegmentData, HaloError> {
    let replicate = ctx.options.node_refinement == NodeRefinement::Replicate;
    let at = |q: [i64; AXES]| tuple_of(values, nc, source.offset_of(q));
    let mut out = Vec::with_capacity(region.count() * nc);
    let mut scratch: Vec<T> = Vec::new();
    let mut terms: Vec<(T, f64)> = Vec::new();
    for p in region.iter() {
        let g = transfer.map.gather(p, ctx.centering);
        check_footprint(source, &g, transfer)?;
        match g {
            Gather::Copy(s) => out.extend_from_slice(at(s)),
            Gather::Mean { lo, hi } => {
                let block = IndexBox::new(lo, hi);
                for c in 0..nc {
                    scratch.clear();
                    scratch.extend(block.iter().map(|q| at(q)[c]));
                    out.push(T::coarsen(&scratch, ctx.options.zone_coarsening));
                }
            }
            Gather::Lerp { base, .. } if replicate => out.extend_from_slice(at(base)),
            Gather::Lerp { base, num, den } => {
                let corners = lerp_terms(base, num, den);
                for c in 0..nc {
                    terms.clear();
                    terms.extend(corners.iter().map(|&(q, w)| (at(q)[c], w)));
                    out.push(T::blend(&terms));
                }
            }
        }
    }
    Ok(T::into_payload(out))
}

fn unpack_tuples<T: Element>(
    data: SegmentData,
    tuples: usize,
    ncomps: usize,
    transfer: u32,
) -> Result<Vec<T>, HaloError> {
    let values = T::from_payload(data)?;
    if values.len() != tuples * ncomps {
        return Err(tuple_mismatch(transfer, tuples * ncomps, values.len()));
    }
    Ok(values)
}

/// Flat ghosted values; slots with nothing to place get `T::default()`.
fn assemble_tuples<T: Element>(
    native: Option<&[T]>,
    ncomps: usize,
    placement: &Placement,
    received: &[Option<Vec<T>>],
) -> Vec<T> {
    let fill = vec![T::default(); ncomps];
    let mut values = Vec::with_capacity(placement.slots.len() * ncomps);
    for slot in &placement.slots {
        let tuple: &[T] = match *slot {
            Slot::Native(i) => native.map_or(&fill[..], |v| tuple_of(v, ncomps, i)),
            Slot::Received { segment, tuple } => received
                .get(segment)
                .and_then(Option::as_ref)
                .map_or(&fill[..], |v| tuple_of(v, ncomps, tuple)),
            Slot::Empty => &fill[..],
        };
        values.extend_from_slice(tuple);
    }
    values
}

impl<T: Element> Exchangeable for Field<T> {
    const KIND: PayloadKind = T::KIND;
    type Unpacked = Vec<T>;

    fn tuples(&self) -> usize {
        self.len()
    }

    fn ncomps(&self) -> usize {
        Field::ncomps(self)
    }

    fn gather(
        &self,
        source: &IndexBox,
        transfer: &Transfer,
        region: &IndexBox,
        ctx: &GatherCtx<'_>,
    ) -> Result<SegmentData, HaloError> {
        gather_tuples(self.values(), Field::ncomps(self), source, transfer, region, ctx)
    }

    fn unpack(
        data: SegmentData,
        tuples: usize,
        ncomps: usize,
        transfer: u32,
    ) -> Result<Vec<T>, HaloError> {
        unpack_tuples(data, tuples, ncomps, transfer)
    }

    fn assemble(
        native: Option<&Self>,
        ncomps: usize,
        placement: &Placement,
        received: &[Option<Vec<T>>],
    ) -> Self {
        let values = assemble_tuples(native.map(Field::values), ncomps, placement, received);
        Field::from_parts(ncomps, values)
    }
}

/// A plain `Vec` is a one-component array.
impl<T: Element> Exchangeable for Vec<T> {
    const KIND: PayloadKind = T::KIND;
    type Unpacked = Vec<T>;

    fn tuples(&self) -> usize {
        self.len()
    }

    fn ncomps(&self) -> usize {
        1
    }

    fn gather(
        &self,
        source: &IndexBox,
        transfer: &Transfer,
        region: &IndexBox,
        ctx: &GatherCtx<'_>,
    ) -> Result<SegmentData, HaloError> {
        gather_tuples(self, 1, source, transfer, region, ctx)
    }

    fn unpack(
        data: SegmentData,
        tuples: usize,
        _ncomps: usize,
        transfer: u32,
    ) -> Result<Vec<T>, HaloError> {
        unpack_tuples(data, tuples, 1, transfer)
    }

    fn assemble(
        native: Option<&Self>,
        _ncomps: usize,
        placement: &Placement,
        received: &[Option<Vec<T>>],
    ) -> Self {
        assemble_tuples(native.map(Vec::as_slice), 1, placement, received)
    }
}

impl MixedCells {
    /// Collapse child cells into one.
    fn coarsen_cells(
        children: impl Iterator<Item = Vec<(i32, f64)>>,
        mode: MixedMode,
        coarsening: ZoneCoarsening,
    ) -> Vec<(i32, f64)> {
        let children: Vec<Vec<(i32, f64)>> = children.collect();
        if coarsening == ZoneCoarsening::Inject {
            return children.into_iter().next().unwrap_or_default();
        }
        // material -> (sum, children holding it); first-seen order
        let mut acc: Vec<(i32, f64, usize)> = Vec::new();
        for child in &children {
            for &(m, v) in child {
                match acc.iter_mut().find(|(am, _, _)| *am == m) {
                    Some(entry) => {
                        entry.1 += v;
                        entry.2 += 1;
                    }
                    None => acc.push((m, v, 1)),
                }
            }
        }
        let n = children.len().max(1) as f64;
        acc.into_iter()
            .map(|(m, sum, holders)| match mode {
                MixedMode::Material => (m, sum / n),
                MixedMode::MixVar => (m, sum / holders as f64),
            })
            .collect()
    }
}

impl Exchangeable for MixedCells {
    const KIND: PayloadKind = PayloadKind::Mixed;
    type Unpacked = MixedCells;

    fn tuples(&self) -> usize {
        self.len()
    }

    fn ncomps(&self) -> usize {
        1
    }

    fn gather(
        &self,
        source: &IndexBox,
        transfer: &Transfer,
        region: &IndexBox,
        ctx: &GatherCtx<'_>,
    ) -> Result<SegmentData, HaloError> {
        let offsets = self.offsets();
        let mut out = MixedCells::default();
        for p in region.iter() {
            let g = transfer.map.gather(p, Centering::Zones);
            check_footprint(source, &g, transfer)?;
            match g {
                Gather::Copy(s) | Gather::Lerp { base: s, .. } => {
                    out.push_cell(self.cell(&offsets, source.offset_of(s)));
                }
                Gather::Mean { lo, hi } => {
                    let children = IndexBox::new(lo, hi)
                        .iter()
                        .map(|q| self.cell(&offsets, source.offset_of(q)).collect());
                    out.push_cell(MixedCells::coarsen_cells(
                        children,
                        ctx.mixed,
                        ctx.options.zone_coarsening,
                    ));
                }
            }
        }
        Ok(SegmentData::Mixed(out))
    }

    fn unpack(
        data: SegmentData,
        tuples: usize,
        _ncomps: usize,
        transfer: u32,
    ) -> Result<MixedCells, HaloError> {
        match data {
            SegmentData::Mixed(m) if m.len() == tuples => Ok(m),
            SegmentData::Mixed(m) => Err(tuple_mismatch(transfer, tuples, m.len())),
            other => Err(HaloError::KindMismatch {
                expected: PayloadKind::Mixed,
                found: other.kind(),
            }),
        }
    }

    fn assemble(
        native: Option<&Self>,
        _ncomps: usize,
        placement: &Placement,
        received: &[Option<MixedCells>],
    ) -> Self {
        let native_offsets = native.map(MixedCells::offsets);
        let received_offsets: Vec<Option<Vec<usize>>> = received
            .iter()
            .map(|r| r.as_ref().map(MixedCells::offsets))
            .collect();
        let mut out = MixedCells::default();
        for slot in &placement.slots {
            match *slot {
                Slot::Native(i) => match (native, &native_offsets) {
                    (Some(m), Some(off)) => out.push_cell(m.cell(off, i)),
                    _ => out.push_empty(),
                },
                Slot::Received { segment, tuple } => {
                    match (received.get(segment), received_offsets.get(segment)) {
                        (Some(Some(m)), Some(Some(off))) => out.push_cell(m.cell(off, tuple)),
                        _ => out.push_empty(),
                    }
                }
                Slot::Empty => out.push_empty(),
            }
        }
        out
    }
}
