//! Data module: per-domain arrays, element types, ghost flags and segments.

pub mod element;
pub mod field;
pub mod ghost_flags;
pub mod segment;

pub use element::Element;
pub use field::{Field, Ghosted, MixedCells};
pub use ghost_flags::GhostFlags;
pub use segment::{PayloadKind, Segment, SegmentData, SegmentHeader, SegmentMap, SegmentStatus};
