//! Ghost-zone synthesis: where every slot of a ghosted array comes from.
//!
//! A [`Placement`] maps each entity of a domain's ghosted extents to its
//! native tuple, to a tuple of a delivered segment, or to nothing. Fills
//! are applied in transfer order and the first writer keeps the slot;
//! flags are OR-ed from every fill that covers it. Slots nobody filled are
//! flagged [`GhostFlags::EXTERIOR`].

use crate::algs::plan::ExchangePlan;
use crate::data::ghost_flags::GhostFlags;
use crate::topology::DomainId;
use crate::topology::extents::IndexBox;

/// Origin of one slot of a ghosted array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Tuple of the native input array.
    Native(usize),
    /// Tuple `tuple` of delivered segment `segment`.
    Received { segment: usize, tuple: usize },
    Empty,
}

/// A region written into the ghost layer.
#[derive(Clone, Copy, Debug)]
pub struct Fill {
    pub region: IndexBox,
    pub reason: GhostFlags,
    /// Delivered segment backing the region; `None` when only flags are wanted.
    pub segment: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub extents: IndexBox,
    pub slots: Vec<Slot>,
    pub flags: Vec<GhostFlags>,
}

impl Placement {
    /// Lay out `new` around the native box `old` and apply `fills` in order.
    pub fn build(old: &IndexBox, new: &IndexBox, fills: impl IntoIterator<Item = Fill>) -> Self {
        let n = new.count();
        let mut slots = vec![Slot::Empty; n];
        let mut flags = vec![GhostFlags::REAL; n];
        let mut covered = vec![false; n];
        for (i, p) in old.iter().enumerate() {
            if new.contains(p) {
                let idx = new.offset_of(p);
                slots[idx] = Slot::Native(i);
                covered[idx] = true;
            }
        }
        for fill in fills {
            for (tuple, p) in fill.region.iter().enumerate() {
                if !new.contains(p) || old.contains(p) {
                    continue;
                }
                let idx = new.offset_of(p);
                flags[idx] |= fill.reason;
                if covered[idx] {
                    continue;
                }
                covered[idx] = true;
                if let Some(segment) = fill.segment {
                    slots[idx] = Slot::Received { segment, tuple };
                }
            }
        }
        for (flag, _) in flags.iter_mut().zip(&covered).filter(|(_, c)| !**c) {
            *flag |= GhostFlags::EXTERIOR;
        }
        Self {
            extents: *new,
            slots,
            flags,
        }
    }

    /// Flag native nodes on faces shared with a same-level neighbor of
    /// lower id: that neighbor owns them.
    pub fn mark_shared_nodes(&mut self, domain: DomainId, plan: &ExchangePlan) {
        for t in plan.into_domain(domain) {
            if t.reason != GhostFlags::DUPLICATED || t.source >= domain {
                continue;
            }
            for p in t.shared_nodes.iter() {
                if self.extents.contains(p) {
                    let idx = self.extents.offset_of(p);
                    self.flags[idx] |= GhostFlags::DUPLICATED;
                }
            }
        }
    }

    /// Number of slots filled from delivered segments.
    pub fn received(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Received { .. }))
            .count()
    }
}
