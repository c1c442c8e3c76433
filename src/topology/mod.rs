//! Block topology: extents, orientations, neighbor records and the
//! boundary registry that ties them together.
//!
//! Most users populate a [`BoundaryRegistry`] (explicitly through
//! [`BoundaryRegistry::add_neighbor`] or by running [`resolve_neighbors`])
//! and hand it to the exchange engine.

pub mod boundary;
pub mod cache;
pub mod extents;
pub mod neighbor;
pub mod orientation;
pub mod ownership;
pub mod registry;
pub mod resolver;

/// Index of a domain (block or AMR patch) within a registry.
pub type DomainId = usize;

pub use boundary::Boundary;
pub use cache::InvalidateCache;
pub use extents::{AXES, Centering, Face, IndexBox, Side};
pub use neighbor::{LevelRelation, Neighbor};
pub use orientation::Orientation;
pub use ownership::DomainOwnership;
pub use registry::BoundaryRegistry;
pub use resolver::{ResolveReport, resolve_neighbors};
