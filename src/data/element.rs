//! Scalar element types an exchange can carry.
//!
//! Every array is dispatched once on its element type; the per-value
//! work (copy, child averaging, interpolation) is monomorphized through
//! [`Element`].

use bytemuck::Pod;
use core::fmt::Debug;

use crate::config::ZoneCoarsening;
use crate::data::segment::{PayloadKind, SegmentData};
use crate::mesh_error::HaloError;

pub trait Element: Pod + Default + PartialEq + Debug + Send + Sync + 'static {
    const KIND: PayloadKind;

    /// Value of a coarse cell built from its children, lowest index first.
    fn coarsen(children: &[Self], mode: ZoneCoarsening) -> Self;

    /// Weighted combination; `terms[0]` is the lowest stencil corner and
    /// the weights sum to one.
    fn blend(terms: &[(Self, f64)]) -> Self;

    fn into_payload(values: Vec<Self>) -> SegmentData;

    fn from_payload(data: SegmentData) -> Result<Vec<Self>, HaloError>;
}

impl Element for f64 {
    const KIND: PayloadKind = PayloadKind::Floating;

    fn coarsen(children: &[Self], mode: ZoneCoarsening) -> Self {
        match (mode, children.first()) {
            (_, None) => 0.0,
            (ZoneCoarsening::Inject, Some(&first)) => first,
            (ZoneCoarsening::Average, Some(_)) => {
                children.iter().sum::<f64>() / children.len() as f64
            }
        }
    }

    fn blend(terms: &[(Self, f64)]) -> Self {
        terms.iter().map(|&(v, w)| v * w).sum()
    }

    fn into_payload(values: Vec<Self>) -> SegmentData {
        SegmentData::Floating(values)
    }

    fn from_payload(data: SegmentData) -> Result<Vec<Self>, HaloError> {
        match data {
            SegmentData::Floating(v) => Ok(v),
            other => Err(HaloError::KindMismatch {
                expected: Self::KIND,
                found: other.kind(),
            }),
        }
    }
}

/// Discrete elements never average: the first child or the lowest corner wins.
macro_rules! discrete_element {
    ($t:ty, $kind:ident) => {
        impl Element for $t {
            const KIND: PayloadKind = PayloadKind::$kind;

            fn coarsen(children: &[Self], _mode: ZoneCoarsening) -> Self {
                children.first().copied().unwrap_or_default()
            }

            fn blend(terms: &[(Self, f64)]) -> Self {
                terms.first().map(|&(v, _)| v).unwrap_or_default()
            }

            fn into_payload(values: Vec<Self>) -> SegmentData {
                SegmentData::$kind(values)
            }

            fn from_payload(data: SegmentData) -> Result<Vec<Self>, HaloError> {
                match data {
                    SegmentData::$kind(v) => Ok(v),
                    other => Err(HaloError::KindMismatch {
                        expected: Self::KIND,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

discrete_element!(i32, Integer);
discrete_element!(u8, Byte);
