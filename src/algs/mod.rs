//! Exchange algorithms: planning, transport, synthesis and geometry.

pub mod communicator;
pub mod exchange;
pub mod geometry;
pub mod plan;
pub mod synthesize;
pub mod wire;

pub use exchange::{GhostExchanger, GhostKind};
pub use plan::ExchangePlan;
