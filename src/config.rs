//! Exchange configuration.
//!
//! [`ExchangeOptions`] is plain data: callers load it from whatever serde
//! format their application already uses. Missing fields take defaults.

use serde::{Deserialize, Serialize};

/// How a coarse cell is filled from the finer cells covering it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneCoarsening {
    /// Mean of the child block (floating data only).
    #[default]
    Average,
    /// Value of the lowest-index child.
    Inject,
}

/// How fine nodes are filled from a coarser neighbor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRefinement {
    /// Multilinear interpolation between coarse nodes (floating data only).
    #[default]
    Interpolate,
    /// Copy of the coarse node at or below the fine node.
    Replicate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeOptions {
    /// Ghost layers requested on every face unless overridden per domain.
    pub ghost_layers: usize,
    /// First message tag used by the transport; two consecutive tags are taken.
    pub tag_base: u16,
    pub zone_coarsening: ZoneCoarsening,
    pub node_refinement: NodeRefinement,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            ghost_layers: 1,
            tag_base: 0x4800,
            zone_coarsening: ZoneCoarsening::Average,
            node_refinement: NodeRefinement::Interpolate,
        }
    }
}
