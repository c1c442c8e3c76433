mod util;

use block_halo::prelude::*;
use proptest::prelude::*;
use util::{global, zones_of};

/// Blocks tiling a rectangle, cut at the given widths along i and j.
fn tiling(widths: &[i64], heights: &[i64]) -> BoundaryRegistry {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(widths.len() * heights.len()).unwrap();
    let mut d = 0;
    let mut j0 = 0;
    for &h in heights {
        let mut i0 = 0;
        for &w in widths {
            reg.set_extents(d, [i0, i0 + w, j0, j0 + h, 0, 0]).unwrap();
            i0 += w;
            d += 1;
        }
        j0 += h;
    }
    resolve_neighbors(&mut reg).unwrap();
    reg
}

proptest! {
    #[test]
    fn resolved_tilings_are_symmetric(
        widths in prop::collection::vec(1i64..5, 1..4),
        heights in prop::collection::vec(1i64..5, 1..4),
    ) {
        let reg = tiling(&widths, &heights);
        prop_assert!(reg.validate_invariants().is_ok());
        for (d, b) in reg.boundaries().iter().enumerate() {
            for n in b.neighbors() {
                let back = reg.boundary(n.domain).unwrap();
                let m = back
                    .neighbors()
                    .iter()
                    .find(|m| m.domain == d && m.face == n.reciprocal_face());
                prop_assert!(m.is_some(), "{} -> {} has no reciprocal", d, n.domain);
                // Identity orientation: both sides see the same global region.
                prop_assert_eq!(m.unwrap().overlap, n.overlap);
            }
        }
    }

    #[test]
    fn finish_is_idempotent(
        widths in prop::collection::vec(1i64..5, 1..4),
        heights in prop::collection::vec(1i64..5, 1..4),
        layers in 1usize..3,
    ) {
        let mut reg = tiling(&widths, &heights);
        for d in 0..reg.num_domains() {
            reg.set_ghost_request(d, [layers; 6]).unwrap();
        }
        let n = reg.num_domains();
        let first: Vec<IndexBox> = (0..n).map(|d| reg.finish(d).unwrap()).collect();
        let version = reg.version();
        let second: Vec<IndexBox> = (0..n).map(|d| reg.finish(d).unwrap()).collect();
        prop_assert_eq!(first, second);
        prop_assert_ne!(reg.version(), version);
    }

    #[test]
    fn matching_resolution_ghosts_are_exact_copies(
        widths in prop::collection::vec(1i64..5, 1..4),
        heights in prop::collection::vec(1i64..5, 1..4),
    ) {
        let reg = tiling(&widths, &heights);
        let n = reg.num_domains();
        let ex = GhostExchanger::new(&reg, DomainOwnership::single_process(n), &NoComm);
        let domains: Vec<DomainId> = (0..n).collect();
        let arrays: Vec<Vec<f64>> = domains.iter().map(|&d| zones_of(&reg, d, global)).collect();
        let out = ex.exchange_scalar(&domains, Centering::Zones, &arrays).unwrap();
        for g in &out {
            for (p, (&v, &f)) in g.extents.iter().zip(g.data.iter().zip(&g.flags)) {
                if f.contains(GhostFlags::DUPLICATED) {
                    prop_assert_eq!(v, global(p));
                } else if !f.is_real() {
                    prop_assert_eq!(f, GhostFlags::EXTERIOR);
                }
            }
        }
    }
}

#[test]
fn plan_is_cached_until_the_registry_changes() {
    let mut reg = tiling(&[2, 2], &[3]);
    let before = reg.plan().transfers().len();
    assert_eq!(before, 2);
    assert!(std::ptr::eq(reg.plan(), reg.plan()));
    reg.reset_cached_members();
    assert_eq!(reg.num_domains(), 0);
    assert!(reg.plan().transfers().is_empty());
    reg.set_num_domains(1).unwrap();
    assert!(matches!(reg.set_num_domains(1), Err(HaloError::AlreadyInitialized)));
}

#[test]
fn ambiguous_same_level_neighbors_are_dropped() {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(3).unwrap();
    reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
    reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
    // Overlaps domain 1 on the same face of domain 0.
    reg.set_extents(2, [4, 6, 1, 3, 0, 0]).unwrap();
    let report = resolve_neighbors(&mut reg).unwrap();
    assert!(!report.ambiguous.is_empty());
    assert!(report
        .ambiguous
        .iter()
        .all(|e| matches!(e, HaloError::AmbiguousFace { domain: 0, .. })));
    assert!(reg.boundary(0).unwrap().neighbors().is_empty());
}
