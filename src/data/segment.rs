//! Boundary slabs in flight between domains.
//!
//! A [`Segment`] is one transfer's worth of boundary data: a header naming
//! source, target and the target-side region it fills, and a tagged
//! payload. Segments are owned values; a [`SegmentMap`] collects them by
//! target domain and hands each domain's list out exactly once.

use std::collections::BTreeMap;

use crate::data::field::MixedCells;
use crate::topology::DomainId;
use crate::topology::extents::IndexBox;

/// Element type carried by a payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PayloadKind {
    Integer,
    Floating,
    Byte,
    Mixed,
}

impl PayloadKind {
    /// Stable wire code.
    pub fn code(self) -> u16 {
        match self {
            PayloadKind::Integer => 1,
            PayloadKind::Floating => 2,
            PayloadKind::Byte => 3,
            PayloadKind::Mixed => 4,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(PayloadKind::Integer),
            2 => Some(PayloadKind::Floating),
            3 => Some(PayloadKind::Byte),
            4 => Some(PayloadKind::Mixed),
            _ => None,
        }
    }
}

/// Tagged, type-erased segment payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentData {
    Integer(Vec<i32>),
    Floating(Vec<f64>),
    Byte(Vec<u8>),
    Mixed(MixedCells),
}

impl SegmentData {
    /// An empty payload of the given kind.
    pub fn empty(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Integer => SegmentData::Integer(Vec::new()),
            PayloadKind::Floating => SegmentData::Floating(Vec::new()),
            PayloadKind::Byte => SegmentData::Byte(Vec::new()),
            PayloadKind::Mixed => SegmentData::Mixed(MixedCells::default()),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            SegmentData::Integer(_) => PayloadKind::Integer,
            SegmentData::Floating(_) => PayloadKind::Floating,
            SegmentData::Byte(_) => PayloadKind::Byte,
            SegmentData::Mixed(_) => PayloadKind::Mixed,
        }
    }

    /// Scalar values, or cells for a mixed payload.
    pub fn len(&self) -> usize {
        match self {
            SegmentData::Integer(v) => v.len(),
            SegmentData::Floating(v) => v.len(),
            SegmentData::Byte(v) => v.len(),
            SegmentData::Mixed(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether the sender produced data for this transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SegmentStatus {
    Filled,
    /// The source could not supply data (bad input or quarantined mesh).
    Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentHeader {
    pub source: DomainId,
    pub target: DomainId,
    /// Transfer id in the exchange plan; also the write priority.
    pub transfer: u32,
    /// Target-side region, laid out i-fastest in the payload.
    pub region: IndexBox,
    pub ncomps: u32,
    pub status: SegmentStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub data: SegmentData,
}

impl Segment {
    /// A segment with no data; the target leaves its region unfilled.
    pub fn skipped(mut header: SegmentHeader, kind: PayloadKind) -> Self {
        header.status = SegmentStatus::Skipped;
        Self {
            header,
            data: SegmentData::empty(kind),
        }
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.header.status == SegmentStatus::Filled
    }
}

/// Segments keyed by target domain.
#[derive(Debug, Default)]
pub struct SegmentMap {
    by_target: BTreeMap<DomainId, Vec<Segment>>,
}

impl SegmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.by_target
            .entry(segment.header.target)
            .or_default()
            .push(segment);
    }

    /// Remove and return every segment addressed to `domain`, in transfer order.
    pub fn take(&mut self, domain: DomainId) -> Vec<Segment> {
        let mut segs = self.by_target.remove(&domain).unwrap_or_default();
        segs.sort_by_key(|s| s.header.transfer);
        segs
    }

    /// Total number of segments still held.
    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.values().all(Vec::is_empty)
    }

    /// Target domains that still have segments waiting.
    pub fn targets(&self) -> impl Iterator<Item = DomainId> + '_ {
        self.by_target.keys().copied()
    }
}

impl Extend<Segment> for SegmentMap {
    fn extend<I: IntoIterator<Item = Segment>>(&mut self, iter: I) {
        for s in iter {
            self.push(s);
        }
    }
}
