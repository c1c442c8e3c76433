//! HaloError: Unified error type for block-halo public APIs
//!
//! Every fallible operation in the crate returns this type. Errors fall in
//! two classes (see [`HaloError::is_fatal`]): per-domain/per-face problems
//! that an exchange tolerates and reports alongside its results, and
//! problems that invalidate a whole exchange call.

use crate::data::segment::PayloadKind;
use crate::topology::extents::Face;
use crate::topology::DomainId;
use thiserror::Error;

/// Unified error type for block-halo operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HaloError {
    /// A domain id outside `0..num_domains` was used.
    #[error("domain {domain} is out of range (registry holds {count} domains)")]
    InvalidDomain { domain: DomainId, count: usize },
    /// `set_num_domains` was called twice for one timestep.
    #[error("domain count already set; call reset_cached_members before re-initializing")]
    AlreadyInitialized,
    /// Extents with a min greater than the matching max.
    #[error("invalid extents {0:?}: min exceeds max")]
    InvalidExtents([i64; 6]),
    /// An operation needed the extents of a domain that were never set.
    #[error("extents for domain {0} have not been set")]
    ExtentsNotSet(DomainId),
    /// The ghosted extents of a domain were requested before `finish`.
    #[error("domain {0} has not been finished")]
    NotFinished(DomainId),
    /// Orientation entries are not a signed permutation of `1, 2, 3`.
    #[error("invalid orientation {0:?}: expected a signed permutation of 1, 2, 3")]
    InvalidOrientation([i8; 3]),
    /// The supplied match code disagrees with the supplied orientation.
    #[error("match code {given} disagrees with orientation {orientation:?} (expected {expected})")]
    MatchCodeMismatch {
        given: u8,
        expected: u8,
        orientation: [i8; 3],
    },
    /// A neighbor overlap that does not describe exactly one face of the domain.
    #[error("overlap {overlap:?} does not lie on exactly one face of domain {domain}")]
    NotAFace { domain: DomainId, overlap: [i64; 6] },
    /// A refinement level without a registered ratio.
    #[error("no refinement ratio registered between level {0} and the next")]
    MissingRefinementRatio(usize),
    /// A refinement ratio component below one.
    #[error("invalid refinement ratio {0:?}: every component must be at least 1")]
    InvalidRefinementRatio([i64; 3]),
    /// `domain` lists `neighbor`, but `neighbor` has no matching record.
    #[error("domain {domain} lists {neighbor} as a neighbor but no reciprocal record exists")]
    MissingReciprocal { domain: DomainId, neighbor: DomainId },
    /// More than one record of `neighbor` could be the reciprocal.
    #[error("domain {domain} has {candidates} candidate reciprocal records in {neighbor}")]
    AmbiguousReciprocal {
        domain: DomainId,
        neighbor: DomainId,
        candidates: usize,
    },
    /// Neighbor regions on one face claim the same cells.
    #[error("neighbors {first} and {second} of domain {domain} overlap on face {face}")]
    AmbiguousFace {
        domain: DomainId,
        face: Face,
        first: DomainId,
        second: DomainId,
    },
    /// Permuted orientation across refinement levels.
    #[error("orientation {orientation:?} between domains {domain} and {neighbor} crosses levels")]
    UnsupportedOrientation {
        domain: DomainId,
        neighbor: DomainId,
        orientation: [i8; 3],
    },
    /// Mesh geometry disagrees with the registered extents.
    #[error("mesh of domain {domain} has point dims {found:?}, registry expects {expected:?}")]
    MeshMismatch {
        domain: DomainId,
        expected: [usize; 3],
        found: [usize; 3],
    },
    /// A per-domain array has the wrong number of tuples.
    #[error("array of domain {domain} holds {found} tuples, expected {expected}")]
    ArrayLengthMismatch {
        domain: DomainId,
        expected: usize,
        found: usize,
    },
    /// A tuple array whose length is not a multiple of its component count.
    #[error("{len} values cannot form tuples of {ncomps} components")]
    InvalidComponentCount { ncomps: usize, len: usize },
    /// Per-cell material counts disagree with the material/value lists.
    #[error("material counts sum to {counted}, got {materials} materials and {values} values")]
    InvalidMaterialCounts {
        counted: usize,
        materials: usize,
        values: usize,
    },
    /// The domain list and the array list differ in length.
    #[error("exchange received {domains} domains but {arrays} arrays")]
    InputLengthMismatch { domains: usize, arrays: usize },
    /// A domain appears more than once in one exchange call.
    #[error("domain {0} appears more than once in the exchange list")]
    DuplicateDomain(DomainId),
    /// A domain in the exchange list is not owned by the calling rank.
    #[error("domain {domain} is owned by rank {owner:?}, not by the calling rank {rank}")]
    NotLocal {
        domain: DomainId,
        owner: Option<usize>,
        rank: usize,
    },
    /// A domain was assigned to two different ranks.
    #[error("domain {domain} assigned to both rank {first} and rank {second}")]
    ConflictingOwner {
        domain: DomainId,
        first: usize,
        second: usize,
    },
    /// A segment carries a different payload kind than the call exchanges.
    #[error("expected a {expected:?} payload, received {found:?}")]
    KindMismatch {
        expected: PayloadKind,
        found: PayloadKind,
    },
    /// A received segment does not fit the region planned for it.
    #[error("segment for transfer {transfer} is malformed: {reason}")]
    MalformedSegment { transfer: u32, reason: String },
    /// A gather stencil left the source domain's native extents.
    #[error("transfer {transfer} reads outside the native extents of domain {domain}")]
    GatherOutOfBounds { transfer: u32, domain: DomainId },
    /// The byte stream of a message could not be decoded.
    #[error("wire error: {0}")]
    Wire(String),
    /// Error during communication with a neighbor rank.
    #[error("communication with rank {neighbor} failed: {reason}")]
    CommError { neighbor: usize, reason: String },
}

impl HaloError {
    /// Whether this error invalidates a whole exchange call.
    ///
    /// Topology and resolution errors are recoverable per face or per
    /// domain and never abort an exchange.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HaloError::InputLengthMismatch { .. }
                | HaloError::DuplicateDomain(_)
                | HaloError::NotLocal { .. }
                | HaloError::ConflictingOwner { .. }
                | HaloError::KindMismatch { .. }
                | HaloError::Wire(_)
                | HaloError::CommError { .. }
        )
    }
}
