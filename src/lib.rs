#![cfg_attr(docsrs, feature(doc_cfg))]
//! # block-halo
//!
//! block-halo keeps the boundary topology of block-structured and AMR meshes
//! and fills ghost zones across domain boundaries. Domains may live in one
//! process or be spread across ranks behind a pluggable [`Communicator`].
//!
//! ## Features
//! - [`BoundaryRegistry`](topology::BoundaryRegistry): per-domain extents,
//!   neighbor records with signed axis orientations, refinement levels and
//!   ghosted extents computed by `finish`
//! - [`resolve_neighbors`](topology::resolve_neighbors): neighbor discovery
//!   from extents alone, across refinement levels
//! - [`GhostExchanger`](algs::GhostExchanger): scalar, vector, material and
//!   mixed-variable exchange, ghost-zone and ghost-node classification
//! - Curvilinear and rectilinear coordinate exchange
//! - Serial (`NoComm`), in-process multi-rank (`LocalComm`) and MPI
//!   (`mpi-support` feature) communicators
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! block-halo = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! ```
//! use block_halo::prelude::*;
//!
//! let mut reg = BoundaryRegistry::new();
//! reg.set_num_domains(2).unwrap();
//! reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
//! reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
//! resolve_neighbors(&mut reg).unwrap();
//!
//! let ex = GhostExchanger::new(&reg, DomainOwnership::single_process(2), &NoComm);
//! let zones = vec![vec![1.0; 16], vec![2.0; 16]];
//! let out = ex.exchange_scalar(&[0, 1], Centering::Zones, &zones).unwrap();
//! assert_eq!(out[0].data.len(), 20);
//! assert_eq!(out[0].flag_at([4, 0, 0]), Some(GhostFlags::DUPLICATED));
//! ```
//!
//! ## Collective calls
//!
//! Every rank owning a domain on either side of a cross-rank transfer must
//! enter the same exchange call. The exchange plan is derived from the
//! registry alone, so ranks agree on it without communicating.

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod mesh_error;
pub mod topology;

pub use algs::communicator::Communicator;
pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    pub use crate::algs::exchange::{GhostExchanger, GhostKind};
    pub use crate::algs::geometry::{CurvilinearMesh, RectilinearMesh, StructuredMesh};
    pub use crate::config::{ExchangeOptions, NodeRefinement, ZoneCoarsening};
    pub use crate::data::{Element, Field, GhostFlags, Ghosted, MixedCells};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::HaloError;
    pub use crate::topology::{
        BoundaryRegistry, Centering, DomainId, DomainOwnership, Face, IndexBox, InvalidateCache,
        Orientation, Side, resolve_neighbors,
    };
}
