//! Fixed, versioned wire types for segment messages.
//!
//! One message per peer and exchange: a [`WireMsgHdr`], then for each
//! segment a [`WireSegmentHdr`] followed by its payload. Header integers
//! are **little-endian**; payload values travel in native byte order, so
//! a run must be homogeneous in endianness.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::data::field::MixedCells;
use crate::data::segment::{PayloadKind, Segment, SegmentData, SegmentHeader, SegmentStatus};
use crate::mesh_error::HaloError;
use crate::topology::extents::IndexBox;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

const STATUS_FILLED: u16 = 0;
const STATUS_SKIPPED: u16 = 1;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireMsgHdr {
    pub version_le: u16,
    pub _pad: u16,
    pub segments_le: u32,
}

impl WireMsgHdr {
    pub fn new(segments: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            _pad: 0,
            segments_le: (segments as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn segments(&self) -> usize {
        u32::from_le(self.segments_le) as usize
    }
}

/// Per-segment record. `primary_len`/`secondary_len` count elements, not
/// bytes: values for scalar payloads; cells and material pairs for mixed.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireSegmentHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub status_le: u16,
    pub _pad: u16,
    pub transfer_le: u32,
    pub ncomps_le: u32,
    pub source_le: u64,
    pub target_le: u64,
    pub region_le: [i64; 6],
    pub primary_len_le: u64,
    pub secondary_len_le: u64,
}

/// Byte length of the stage-two message a peer should expect.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireLen {
    pub len_le: u64,
}

impl WireLen {
    pub fn new(len: usize) -> Self {
        Self {
            len_le: (len as u64).to_le(),
        }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.len_le)
    }
}

const_assert_eq!(size_of::<WireLen>(), 8);
const_assert_eq!(size_of::<WireMsgHdr>(), 8);
const_assert_eq!(size_of::<WireSegmentHdr>(), 96);

impl WireSegmentHdr {
    fn of(seg: &Segment) -> Self {
        let h = &seg.header;
        let (primary, secondary) = match &seg.data {
            SegmentData::Mixed(m) => (m.len(), m.materials().len()),
            d => (d.len(), 0),
        };
        let status = match h.status {
            SegmentStatus::Filled => STATUS_FILLED,
            SegmentStatus::Skipped => STATUS_SKIPPED,
        };
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: seg.data.kind().code().to_le(),
            status_le: status.to_le(),
            _pad: 0,
            transfer_le: h.transfer.to_le(),
            ncomps_le: h.ncomps.to_le(),
            source_le: (h.source as u64).to_le(),
            target_le: (h.target as u64).to_le(),
            region_le: h.region.to_extents().map(i64::to_le),
            primary_len_le: (primary as u64).to_le(),
            secondary_len_le: (secondary as u64).to_le(),
        }
    }

    fn header(&self) -> Result<(SegmentHeader, PayloadKind), HaloError> {
        let version = u16::from_le(self.version_le);
        if version != WIRE_VERSION {
            return Err(HaloError::Wire(format!(
                "segment version {version}, expected {WIRE_VERSION}"
            )));
        }
        let code = u16::from_le(self.kind_le);
        let kind = PayloadKind::from_code(code)
            .ok_or_else(|| HaloError::Wire(format!("unknown payload kind {code}")))?;
        let status = match u16::from_le(self.status_le) {
            STATUS_FILLED => SegmentStatus::Filled,
            STATUS_SKIPPED => SegmentStatus::Skipped,
            s => return Err(HaloError::Wire(format!("unknown segment status {s}"))),
        };
        let header = SegmentHeader {
            source: u64::from_le(self.source_le) as usize,
            target: u64::from_le(self.target_le) as usize,
            transfer: u32::from_le(self.transfer_le),
            region: IndexBox::from_extents(self.region_le.map(i64::from_le)),
            ncomps: u32::from_le(self.ncomps_le),
            status,
        };
        Ok((header, kind))
    }
}

fn put<T: Pod>(out: &mut Vec<u8>, values: &[T]) {
    out.extend_from_slice(bytemuck::cast_slice(values));
}

/// Serialize `segments` into one message.
pub fn encode_segments(segments: &[Segment]) -> Vec<u8> {
    let payload: usize = segments
        .iter()
        .map(|s| {
            size_of::<WireSegmentHdr>()
                + match &s.data {
                    SegmentData::Integer(v) => v.len() * 4,
                    SegmentData::Floating(v) => v.len() * 8,
                    SegmentData::Byte(v) => v.len(),
                    SegmentData::Mixed(m) => m.len() * 4 + m.materials().len() * 12,
                }
        })
        .sum();
    let mut out = Vec::with_capacity(size_of::<WireMsgHdr>() + payload);
    put(&mut out, &[WireMsgHdr::new(segments.len())]);
    for seg in segments {
        put(&mut out, &[WireSegmentHdr::of(seg)]);
        match &seg.data {
            SegmentData::Integer(v) => put(&mut out, v),
            SegmentData::Floating(v) => put(&mut out, v),
            SegmentData::Byte(v) => out.extend_from_slice(v),
            SegmentData::Mixed(m) => {
                put(&mut out, m.counts());
                put(&mut out, m.materials());
                put(&mut out, m.values());
            }
        }
    }
    out
}

/// Cursor over a received message.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], HaloError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or_else(|| {
                HaloError::Wire(format!(
                    "truncated message: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.buf.len() - self.pos
                ))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn one<T: Pod>(&mut self) -> Result<T, HaloError> {
        Ok(bytemuck::pod_read_unaligned(self.bytes(size_of::<T>())?))
    }

    fn many<T: Pod>(&mut self, count: u64) -> Result<Vec<T>, HaloError> {
        let n = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(size_of::<T>()))
            .ok_or_else(|| HaloError::Wire(format!("element count {count} overflows")))?;
        Ok(self
            .bytes(n)?
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }
}

/// Parse a message produced by [`encode_segments`].
pub fn decode_segments(buf: &[u8]) -> Result<Vec<Segment>, HaloError> {
    let mut r = Reader { buf, pos: 0 };
    let hdr: WireMsgHdr = r.one()?;
    if hdr.version() != WIRE_VERSION {
        return Err(HaloError::Wire(format!(
            "message version {}, expected {WIRE_VERSION}",
            hdr.version()
        )));
    }
    let mut out = Vec::with_capacity(hdr.segments().min(buf.len() / size_of::<WireSegmentHdr>()));
    for _ in 0..hdr.segments() {
        let sh: WireSegmentHdr = r.one()?;
        let (header, kind) = sh.header()?;
        let primary = u64::from_le(sh.primary_len_le);
        let secondary = u64::from_le(sh.secondary_len_le);
        let data = match kind {
            PayloadKind::Integer => SegmentData::Integer(r.many(primary)?),
            PayloadKind::Floating => SegmentData::Floating(r.many(primary)?),
            PayloadKind::Byte => SegmentData::Byte(r.many(primary)?),
            PayloadKind::Mixed => {
                let counts: Vec<u32> = r.many(primary)?;
                let materials: Vec<i32> = r.many(secondary)?;
                let values: Vec<f64> = r.many(secondary)?;
                SegmentData::Mixed(
                    MixedCells::new(counts, materials, values)
                        .map_err(|e| HaloError::Wire(e.to_string()))?,
                )
            }
        };
        out.push(Segment { header, data });
    }
    if r.pos != buf.len() {
        return Err(HaloError::Wire(format!(
            "{} trailing bytes after {} segments",
            buf.len() - r.pos,
            hdr.segments()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(transfer: u32, status: SegmentStatus) -> SegmentHeader {
        SegmentHeader {
            source: 3,
            target: 11,
            transfer,
            region: IndexBox::from_extents([4, 4, -1, 2, 0, 0]),
            ncomps: 2,
            status,
        }
    }

    #[test]
    fn mixed_message_roundtrip() {
        let segs = vec![
            Segment {
                header: header(0, SegmentStatus::Filled),
                data: SegmentData::Floating(vec![0.5, -1.25, 3.0, 4.0]),
            },
            Segment::skipped(header(1, SegmentStatus::Filled), PayloadKind::Integer),
            Segment {
                header: header(2, SegmentStatus::Filled),
                data: SegmentData::Mixed(MixedCells::from_cells([
                    vec![(1, 0.5), (2, 0.5)],
                    vec![],
                ])),
            },
            Segment {
                header: header(3, SegmentStatus::Filled),
                data: SegmentData::Byte(vec![1, 2, 3]),
            },
        ];
        let bytes = encode_segments(&segs);
        assert_eq!(decode_segments(&bytes).unwrap(), segs);
    }

    #[test]
    fn truncated_and_trailing_bytes_are_rejected() {
        let segs = vec![Segment {
            header: header(0, SegmentStatus::Filled),
            data: SegmentData::Integer(vec![1, 2, 3]),
        }];
        let mut bytes = encode_segments(&segs);
        assert!(matches!(
            decode_segments(&bytes[..bytes.len() - 1]),
            Err(HaloError::Wire(_))
        ));
        bytes.push(0);
        assert!(matches!(decode_segments(&bytes), Err(HaloError::Wire(_))));
    }

    #[test]
    fn version_guard() {
        let mut bytes = encode_segments(&[]);
        assert_eq!(bytes.len(), size_of::<WireMsgHdr>());
        bytes[0] = 0xFF;
        assert!(matches!(decode_segments(&bytes), Err(HaloError::Wire(_))));
    }
}
