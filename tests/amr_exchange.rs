mod util;

use block_halo::prelude::*;
use util::{nodes_of, zones_of};

const COARSE: DomainId = 0;
const FINE: DomainId = 1;

/// A 4×4 coarse patch and, to its right, an 8×8 patch one level finer.
fn coarse_fine() -> BoundaryRegistry {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(2).unwrap();
    reg.set_refinement_ratios(vec![[2, 2, 1]]).unwrap();
    reg.set_indices_for_amr_patch(COARSE, 0, [0, 4, 0, 4, 0, 0]).unwrap();
    reg.set_indices_for_amr_patch(FINE, 1, [8, 16, 0, 8, 0, 0]).unwrap();
    let report = resolve_neighbors(&mut reg).unwrap();
    assert_eq!(report.added, 2);
    assert!(report.finish_errors.is_empty());
    reg
}

fn coarse_value(p: [i64; 3]) -> f64 {
    p[0] as f64 + 10.0 * p[1] as f64
}

fn fine_value(p: [i64; 3]) -> f64 {
    p[0] as f64 + 100.0 * p[1] as f64
}

#[test]
fn resolver_records_levels_and_native_overlaps() {
    let reg = coarse_fine();
    let c = &reg.boundary(COARSE).unwrap().neighbors()[0];
    assert_eq!(c.domain, FINE);
    assert_eq!(c.overlap, IndexBox::from_extents([4, 4, 0, 4, 0, 0]));
    assert_eq!(c.level, block_halo::topology::LevelRelation::Finer([2, 2, 1]));
    let f = &reg.boundary(FINE).unwrap().neighbors()[0];
    assert_eq!(f.overlap, IndexBox::from_extents([8, 8, 0, 8, 0, 0]));
    assert!(reg.validate_invariants().is_ok());
}

#[test]
fn coarse_ghosts_average_fine_blocks_and_fine_ghosts_replicate() {
    let reg = coarse_fine();
    let ex = GhostExchanger::new(&reg, DomainOwnership::single_process(2), &NoComm);
    let arrays = vec![zones_of(&reg, COARSE, coarse_value), zones_of(&reg, FINE, fine_value)];
    let out = ex.exchange_scalar(&[COARSE, FINE], Centering::Zones, &arrays).unwrap();

    let c = &out[0];
    assert_eq!(c.extents, IndexBox::from_extents([0, 4, 0, 3, 0, 0]));
    for j in 0..4 {
        let block = [[8, 2 * j], [9, 2 * j], [8, 2 * j + 1], [9, 2 * j + 1]];
        let mean = block.iter().map(|&[i, j]| fine_value([i, j, 0])).sum::<f64>() / 4.0;
        assert_eq!(c.data[c.extents.offset_of([4, j, 0])], mean);
        assert_eq!(c.flag_at([4, j, 0]), Some(GhostFlags::LEVEL_INTERFACE));
    }

    let f = &out[1];
    assert_eq!(f.extents, IndexBox::from_extents([7, 15, 0, 7, 0, 0]));
    for j in 0..8 {
        let parent = coarse_value([3, j / 2, 0]);
        assert_eq!(f.data[f.extents.offset_of([7, j, 0])], parent);
        assert_eq!(f.flag_at([7, j, 0]), Some(GhostFlags::LEVEL_INTERFACE));
    }
}

#[test]
fn injection_takes_the_first_child() {
    let reg = coarse_fine();
    let opts = ExchangeOptions {
        zone_coarsening: ZoneCoarsening::Inject,
        ..ExchangeOptions::default()
    };
    let ex =
        GhostExchanger::new(&reg, DomainOwnership::single_process(2), &NoComm).with_options(opts);
    let arrays = vec![zones_of(&reg, COARSE, coarse_value), zones_of(&reg, FINE, fine_value)];
    let out = ex.exchange_scalar(&[COARSE, FINE], Centering::Zones, &arrays).unwrap();
    let c = &out[0];
    assert_eq!(c.data[c.extents.offset_of([4, 1, 0])], fine_value([8, 2, 0]));
}

#[test]
fn integer_zones_inject_instead_of_averaging() {
    let reg = coarse_fine();
    let ex = GhostExchanger::new(&reg, DomainOwnership::single_process(2), &NoComm);
    let arrays: Vec<Vec<i32>> = vec![
        zones_of(&reg, COARSE, coarse_value).into_iter().map(|v| v as i32).collect(),
        zones_of(&reg, FINE, fine_value).into_iter().map(|v| v as i32).collect(),
    ];
    let out = ex.exchange_scalar(&[COARSE, FINE], Centering::Zones, &arrays).unwrap();
    let c = &out[0];
    assert_eq!(c.data[c.extents.offset_of([4, 3, 0])], fine_value([8, 6, 0]) as i32);
}

#[test]
fn fine_nodes_interpolate_between_coarse_nodes() {
    let reg = coarse_fine();
    let ex = GhostExchanger::new(&reg, DomainOwnership::single_process(2), &NoComm);
    let arrays = vec![nodes_of(&reg, COARSE, coarse_value), nodes_of(&reg, FINE, fine_value)];
    let out = ex.exchange_scalar(&[COARSE, FINE], Centering::Nodes, &arrays).unwrap();

    // Coarse ghost node (5, j) sits on fine node (10, 2j).
    let c = &out[0];
    for j in 0..=4 {
        assert_eq!(c.data[c.extents.offset_of([5, j, 0])], fine_value([10, 2 * j, 0]));
    }
    // Fine ghost node (7, j) lies halfway between coarse nodes 3 and 4 along i.
    let f = &out[1];
    let at = |j: i64| f.data[f.extents.offset_of([7, j, 0])];
    assert_eq!(at(2), 0.5 * (coarse_value([3, 1, 0]) + coarse_value([4, 1, 0])));
    let expected = 0.25
        * (coarse_value([3, 1, 0])
            + coarse_value([4, 1, 0])
            + coarse_value([3, 2, 0])
            + coarse_value([4, 2, 0]));
    assert!((at(3) - expected).abs() < 1e-12);

    let opts = ExchangeOptions {
        node_refinement: NodeRefinement::Replicate,
        ..ExchangeOptions::default()
    };
    let ex = ex.with_options(opts);
    let out = ex.exchange_scalar(&[COARSE, FINE], Centering::Nodes, &arrays).unwrap();
    let f = &out[1];
    assert_eq!(f.data[f.extents.offset_of([7, 3, 0])], coarse_value([3, 1, 0]));
}

#[test]
fn permuted_orientation_across_levels_is_reported() {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(2).unwrap();
    reg.set_refinement_ratios(vec![[2, 2, 1]]).unwrap();
    reg.set_indices_for_amr_patch(COARSE, 0, [0, 4, 0, 4, 0, 0]).unwrap();
    reg.set_indices_for_amr_patch(FINE, 1, [8, 16, 0, 8, 0, 0]).unwrap();
    let swap = Orientation::new([-1, 2, 3]).unwrap();
    reg.add_neighbor(COARSE, FINE, swap.match_code(), swap.raw(), [4, 4, 0, 4, 0, 0])
        .unwrap();
    reg.finish(COARSE).unwrap();
    let issues: Vec<_> = reg.plan().issues_of(COARSE).cloned().collect();
    assert!(matches!(issues[0], HaloError::UnsupportedOrientation { domain: 0, neighbor: 1, .. }));
}
