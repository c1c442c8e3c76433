//! Ghost exchange engine.
//!
//! A [`GhostExchanger`] binds a finished [`BoundaryRegistry`], the
//! domain-to-rank map and a [`Communicator`]. Each exchange call:
//!
//! 1. validates the call (list lengths, duplicate or unknown domains,
//!    domains this rank does not own) before touching the network;
//! 2. gathers one segment for every planned transfer whose source this
//!    rank owns (a `Skipped` segment when the source cannot supply data);
//! 3. keeps same-rank segments local and moves the rest in one two-stage
//!    collective exchange with the peer ranks;
//! 4. writes every domain's ghosted array in transfer priority order.
//!
//! Every rank owning a domain on either side of a cross-rank transfer
//! must enter the same exchange call, otherwise the call deadlocks.

pub mod extract;
pub mod transport;

use std::collections::{BTreeMap, BTreeSet};

use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::plan::{ExchangePlan, Transfer};
use crate::algs::synthesize::{Fill, Placement};
use crate::algs::wire::{decode_segments, encode_segments};
use crate::config::ExchangeOptions;
use crate::data::element::Element;
use crate::data::field::{Field, Ghosted, MixedCells};
use crate::data::segment::{Segment, SegmentHeader, SegmentMap, SegmentStatus};
use crate::mesh_error::HaloError;
use crate::topology::DomainId;
use crate::topology::extents::{Centering, IndexBox};
use crate::topology::ownership::DomainOwnership;
use crate::topology::registry::BoundaryRegistry;

pub use extract::{Exchangeable, GatherCtx, MixedMode};

/// Which entities a ghost classification is asked for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GhostKind {
    Nodes,
    Zones,
}

/// Outcome of gathering one outgoing segment.
pub(crate) struct Made {
    pub segment: Segment,
    pub issue: Option<(DomainId, HaloError)>,
}

pub struct GhostExchanger<'a, C: Communicator> {
    registry: &'a BoundaryRegistry,
    ownership: DomainOwnership,
    comm: &'a C,
    options: ExchangeOptions,
    quarantined: BTreeMap<DomainId, HaloError>,
}

impl<'a, C: Communicator> GhostExchanger<'a, C> {
    pub fn new(registry: &'a BoundaryRegistry, ownership: DomainOwnership, comm: &'a C) -> Self {
        Self {
            registry,
            ownership,
            comm,
            options: ExchangeOptions::default(),
            quarantined: BTreeMap::new(),
        }
    }

    pub fn with_options(mut self, options: ExchangeOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn registry(&self) -> &BoundaryRegistry {
        self.registry
    }

    #[inline]
    pub fn ownership(&self) -> &DomainOwnership {
        &self.ownership
    }

    #[inline]
    pub fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Domains whose outgoing and incoming transfers are suppressed.
    pub fn quarantined(&self) -> impl Iterator<Item = (DomainId, &HaloError)> + '_ {
        self.quarantined.iter().map(|(d, e)| (*d, e))
    }

    pub(crate) fn quarantine(&mut self, domain: DomainId, reason: HaloError) {
        self.quarantined.insert(domain, reason);
    }

    pub(crate) fn release(&mut self, domain: DomainId) {
        self.quarantined.remove(&domain);
    }

    pub(crate) fn is_quarantined(&self, domain: DomainId) -> bool {
        self.quarantined.contains_key(&domain)
    }

    // --- public exchange surface ---

    /// One value per entity. The arrays are read in place.
    pub fn exchange_scalar<T: Element>(
        &self,
        domains: &[DomainId],
        centering: Centering,
        arrays: &[Vec<T>],
    ) -> Result<Vec<Ghosted<Vec<T>>>, HaloError> {
        self.exchange_with(domains, centering, arrays, MixedMode::Material)
    }

    /// Tuples of any width; component order is preserved.
    pub fn exchange_field<T: Element>(
        &self,
        domains: &[DomainId],
        centering: Centering,
        arrays: &[Field<T>],
    ) -> Result<Vec<Ghosted<Field<T>>>, HaloError> {
        self.exchange_with(domains, centering, arrays, MixedMode::Material)
    }

    pub fn exchange_float_vector(
        &self,
        domains: &[DomainId],
        centering: Centering,
        arrays: &[Field<f64>],
    ) -> Result<Vec<Ghosted<Field<f64>>>, HaloError> {
        self.exchange_field(domains, centering, arrays)
    }

    pub fn exchange_int_vector(
        &self,
        domains: &[DomainId],
        centering: Centering,
        arrays: &[Field<i32>],
    ) -> Result<Vec<Ghosted<Field<i32>>>, HaloError> {
        self.exchange_field(domains, centering, arrays)
    }

    /// Per-cell material composition (zone-centered).
    pub fn exchange_material(
        &self,
        domains: &[DomainId],
        materials: &[MixedCells],
    ) -> Result<Vec<Ghosted<MixedCells>>, HaloError> {
        self.exchange_with(domains, Centering::Zones, materials, MixedMode::Material)
    }

    /// Per-cell, per-material values of a mixed variable (zone-centered).
    pub fn exchange_mix_var(
        &self,
        domains: &[DomainId],
        mixvars: &[MixedCells],
    ) -> Result<Vec<Ghosted<MixedCells>>, HaloError> {
        self.exchange_with(domains, Centering::Zones, mixvars, MixedMode::MixVar)
    }

    /// Ghost-zone flags of each domain, from the plan alone.
    pub fn create_ghost_zones(&self, domains: &[DomainId]) -> Result<Vec<Ghosted<()>>, HaloError> {
        self.classify(domains, Centering::Zones)
    }

    /// Ghost-node flags of each domain, from the plan alone.
    pub fn create_ghost_nodes(&self, domains: &[DomainId]) -> Result<Vec<Ghosted<()>>, HaloError> {
        self.classify(domains, Centering::Nodes)
    }

    /// Whether classifying `kind` on this rank depends on other ranks.
    ///
    /// Node classification is always local. Zones need communication iff
    /// some planned zone transfer links a domain of this rank with a
    /// domain of another rank.
    pub fn requires_communication(&self, kind: GhostKind) -> bool {
        let rank = self.rank();
        match kind {
            GhostKind::Nodes => false,
            GhostKind::Zones => self.registry.plan().transfers().iter().any(|t| {
                !t.zone_region.is_empty()
                    && matches!(
                        (self.ownership.owner(t.source), self.ownership.owner(t.target)),
                        (Some(s), Some(r)) if s != r && (s == rank || r == rank)
                    )
            }),
        }
    }

    // --- internals ---

    /// Reject a call whose domain list is unusable, before any communication.
    pub(crate) fn check_call(&self, domains: &[DomainId], arrays: usize) -> Result<(), HaloError> {
        if domains.len() != arrays {
            return Err(HaloError::InputLengthMismatch {
                domains: domains.len(),
                arrays,
            });
        }
        let rank = self.rank();
        let count = self.registry.num_domains();
        let mut seen = BTreeSet::new();
        for &d in domains {
            if d >= count {
                return Err(HaloError::InvalidDomain { domain: d, count });
            }
            if !seen.insert(d) {
                return Err(HaloError::DuplicateDomain(d));
            }
            if !self.ownership.is_local(d, rank) {
                return Err(HaloError::NotLocal {
                    domain: d,
                    owner: self.ownership.owner(d),
                    rank,
                });
            }
        }
        Ok(())
    }

    fn tags(&self) -> ExchangeTags {
        ExchangeTags::from_base(CommTag::new(self.options.tag_base))
    }

    /// Ranks this rank trades segments with for the `active` transfers.
    fn peers(&self, plan: &ExchangePlan, active: &dyn Fn(&Transfer) -> bool) -> BTreeSet<usize> {
        let rank = self.rank();
        plan.transfers()
            .iter()
            .filter(|t| active(t))
            .filter_map(|t| {
                match (self.ownership.owner(t.source), self.ownership.owner(t.target)) {
                    (Some(s), Some(r)) if s == rank && r != rank => Some(r),
                    (Some(s), Some(r)) if r == rank && s != rank => Some(s),
                    _ => None,
                }
            })
            .collect()
    }

    /// Gather every outgoing segment of the `active` transfers, deliver
    /// local ones directly and the rest through the transport.
    ///
    /// Issues raised while gathering are returned alongside the segments.
    pub(crate) fn route<F>(
        &self,
        plan: &ExchangePlan,
        active: &(dyn Fn(&Transfer) -> bool + Sync),
        make: F,
    ) -> Result<(SegmentMap, Vec<(DomainId, HaloError)>), HaloError>
    where
        F: Fn(&Transfer) -> Made + Sync + Send,
    {
        let rank = self.rank();
        let mut jobs = Vec::new();
        for t in plan.transfers().iter().filter(|t| active(t)) {
            if !self.ownership.is_local(t.source, rank) {
                continue;
            }
            match self.ownership.owner(t.target) {
                Some(r) => jobs.push((t, r)),
                None => log::warn!(
                    "transfer {}: target domain {} has no owner; not sent",
                    t.id,
                    t.target
                ),
            }
        }

        #[cfg(feature = "rayon")]
        let made: Vec<(usize, Made)> = {
            use rayon::prelude::*;
            jobs.par_iter().map(|&(t, r)| (r, make(t))).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let made: Vec<(usize, Made)> = jobs.iter().map(|&(t, r)| (r, make(t))).collect();

        let mut delivered = SegmentMap::new();
        let mut issues = Vec::new();
        let mut remote: BTreeMap<usize, Vec<Segment>> = BTreeMap::new();
        for (r, m) in made {
            issues.extend(m.issue);
            if r == rank {
                delivered.push(m.segment);
            } else {
                remote.entry(r).or_default().push(m.segment);
            }
        }

        let peers = self.peers(plan, active);
        if !peers.is_empty() {
            let outgoing: BTreeMap<usize, Vec<u8>> = remote
                .iter()
                .map(|(&r, segs)| (r, encode_segments(segs)))
                .collect();
            let received = transport::exchange_bytes(self.comm, self.tags(), &peers, &outgoing)?;
            for (from, bytes) in received {
                let segs = decode_segments(&bytes)?;
                log::debug!("rank {rank}: {} segments from rank {from}", segs.len());
                delivered.extend(segs);
            }
        }
        Ok((delivered, issues))
    }

    /// The generic exchange behind every array type.
    pub(crate) fn exchange_with<X: Exchangeable>(
        &self,
        domains: &[DomainId],
        centering: Centering,
        inputs: &[X],
        mixed: MixedMode,
    ) -> Result<Vec<Ghosted<X>>, HaloError> {
        self.check_call(domains, inputs.len())?;
        let plan = self.registry.plan();

        let mut issues: BTreeMap<DomainId, Vec<HaloError>> = BTreeMap::new();
        // domain -> (input, native box) for inputs whose shape matches the registry
        let mut usable: BTreeMap<DomainId, (&X, IndexBox)> = BTreeMap::new();
        for (&d, input) in domains.iter().zip(inputs) {
            let entry = issues.entry(d).or_default();
            entry.extend(plan.issues_of(d).cloned());
            let Some(native) = self.registry.boundary(d)?.old_extents(centering) else {
                entry.push(HaloError::ExtentsNotSet(d));
                continue;
            };
            if input.tuples() != native.count() {
                log::warn!(
                    "domain {d}: array holds {} tuples, extents need {}",
                    input.tuples(),
                    native.count()
                );
                entry.push(HaloError::ArrayLengthMismatch {
                    domain: d,
                    expected: native.count(),
                    found: input.tuples(),
                });
                continue;
            }
            usable.insert(d, (input, native));
        }

        let ctx = GatherCtx {
            centering,
            options: &self.options,
            mixed,
        };
        let quarantined = &self.quarantined;
        let active = move |t: &Transfer| !t.region(centering).is_empty();
        let make = |t: &Transfer| {
            let region = t.region(centering);
            let mut header = SegmentHeader {
                source: t.source,
                target: t.target,
                transfer: t.id,
                region,
                ncomps: 0,
                status: SegmentStatus::Filled,
            };
            let source = match usable.get(&t.source) {
                Some(s) if !quarantined.contains_key(&t.source) => s,
                _ => {
                    return Made {
                        segment: Segment::skipped(header, X::KIND),
                        issue: None,
                    };
                }
            };
            let (input, native) = *source;
            header.ncomps = input.ncomps() as u32;
            match input.gather(&native, t, &region, &ctx) {
                Ok(data) => Made {
                    segment: Segment { header, data },
                    issue: None,
                },
                Err(e) => Made {
                    segment: Segment::skipped(header, X::KIND),
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
        for (&d, input) in domains.iter().zip(inputs) {
            let segments = delivered.take(d);
            let mut domain_issues = issues.remove(&d).unwrap_or_default();
            if let Some(reason) = self.quarantined.get(&d) {
                domain_issues.push(reason.clone());
            }
            let b = self.registry.boundary(d)?;
            let old = b.old_extents(centering).unwrap_or(IndexBox::EMPTY);
            let new = b.new_extents(centering).unwrap_or(IndexBox::EMPTY);
            let ncomps = input.ncomps();

            let mut received: Vec<Option<X::Unpacked>> = Vec::with_capacity(segments.len());
            let mut fills = Vec::with_capacity(segments.len());
            for (si, seg) in segments.into_iter().enumerate() {
                received.push(None);
                if self.is_quarantined(d) || seg.header.status == SegmentStatus::Skipped {
                    continue;
                }
                let Some(t) = plan.transfer(seg.header.transfer) else {
                    domain_issues.push(HaloError::MalformedSegment {
                        transfer: seg.header.transfer,
                        reason: "unknown transfer id".into(),
                    });
                    continue;
                };
                let region = t.region(centering);
                if t.target != d || t.source != seg.header.source || region != seg.header.region {
                    domain_issues.push(HaloError::MalformedSegment {
                        transfer: t.id,
                        reason: format!(
                            "header {} -> {} over {:?} does not match the plan",
                            seg.header.source, seg.header.target, seg.header.region
                        ),
                    });
                    continue;
                }
                match X::unpack(seg.data, region.count(), ncomps, t.id) {
                    Ok(u) => {
                        received[si] = Some(u);
                        fills.push(Fill {
                            region,
                            reason: t.reason,
                            segment: Some(si),
                        });
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => domain_issues.push(e),
                }
            }

            let filled = fills.len();
            let mut placement = Placement::build(&old, &new, fills);
            if centering == Centering::Nodes {
                placement.mark_shared_nodes(d, plan);
            }
            let native = usable.get(&d).map(|(x, _)| *x);
            let data = X::assemble(native, ncomps, &placement, &received);
            log::trace!(
                "domain {d}: {} ghost slots filled from {filled} segments",
                placement.received()
            );
            out.push(Ghosted {
                domain: d,
                extents: new,
                data,
                flags: placement.flags,
                issues: domain_issues,
            });
        }
        Ok(out)
    }

    fn classify(
        &self,
        domains: &[DomainId],
        centering: Centering,
    ) -> Result<Vec<Ghosted<()>>, HaloError> {
        self.check_call(domains, domains.len())?;
        let plan = self.registry.plan();
        let mut out = Vec::with_capacity(domains.len());
        for &d in domains {
            let b = self.registry.boundary(d)?;
            let old = b.old_extents(centering).unwrap_or(IndexBox::EMPTY);
            let new = b.new_extents(centering).unwrap_or(IndexBox::EMPTY);
            let fills = plan.into_domain(d).map(|t| Fill {
                region: t.region(centering),
                reason: t.reason,
                segment: None,
            });
            let mut placement = Placement::build(&old, &new, fills);
            if centering == Centering::Nodes {
                placement.mark_shared_nodes(d, plan);
            }
            out.push(Ghosted {
                domain: d,
                extents: new,
                data: (),
                flags: placement.flags,
                issues: plan.issues_of(d).cloned().collect(),
            });
        }
        Ok(out)
    }
}
