mod util;

use std::thread;

use block_halo::prelude::*;
use serial_test::serial;
use util::{global, grid, nodes_of, zones_of};

const NX: usize = 3;
const NY: usize = 2;

fn registry() -> BoundaryRegistry {
    grid(NX, NY, 3, 2)
}

/// A coarse patch beside a column of two fine patches, ratio 2.
fn two_levels() -> BoundaryRegistry {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(3).unwrap();
    reg.set_refinement_ratios(vec![[2, 2, 1]]).unwrap();
    reg.set_indices_for_amr_patch(0, 0, [0, 2, 0, 2, 0, 0]).unwrap();
    reg.set_indices_for_amr_patch(1, 1, [4, 8, 0, 4, 0, 0]).unwrap();
    reg.set_indices_for_amr_patch(2, 1, [4, 8, 4, 8, 0, 0]).unwrap();
    resolve_neighbors(&mut reg).unwrap();
    reg
}

type Work<R> = fn(&BoundaryRegistry, &GhostExchanger<'_, LocalComm>, &[DomainId]) -> Vec<R>;

/// Run `work` on `ranks` in-process ranks, domain `d` owned by `owner(d)`;
/// results of all ranks are concatenated in rank order.
fn on_ranks<R: Send + 'static>(
    layout: fn() -> BoundaryRegistry,
    ranks: usize,
    owner: fn(DomainId) -> usize,
    work: Work<R>,
) -> Vec<R> {
    let handles: Vec<_> = LocalComm::world(ranks)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let reg = layout();
                let n = reg.num_domains();
                let pairs = (0..n).map(|d| (d, owner(d)));
                let ownership = DomainOwnership::from_pairs(n, pairs).unwrap();
                let mine = ownership.local_domains(comm.rank());
                let ex = GhostExchanger::new(&reg, ownership, &comm);
                work(&reg, &ex, &mine)
            })
        })
        .collect();
    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

type Scalars = (Ghosted<Vec<f64>>, Ghosted<Vec<f64>>);

fn scalars(
    reg: &BoundaryRegistry,
    ex: &GhostExchanger<'_, LocalComm>,
    mine: &[DomainId],
) -> Vec<Scalars> {
    let zones: Vec<Vec<f64>> = mine.iter().map(|&d| zones_of(reg, d, global)).collect();
    let nodes: Vec<Vec<f64>> = mine.iter().map(|&d| nodes_of(reg, d, global)).collect();
    let z = ex.exchange_scalar(mine, Centering::Zones, &zones).unwrap();
    let p = ex.exchange_scalar(mine, Centering::Nodes, &nodes).unwrap();
    z.into_iter().zip(p).collect()
}

/// Ghosted zone and node arrays of every domain of the block grid.
fn run(ranks: usize, owner: fn(DomainId) -> usize) -> Vec<Scalars> {
    let mut all = on_ranks(registry, ranks, owner, scalars);
    all.sort_by_key(|(z, _)| z.domain);
    all
}

type Mixed = (Ghosted<MixedCells>, Ghosted<MixedCells>);

/// Pure, two-material and empty cells, all keyed on the global cell index.
fn composition(cells: IndexBox) -> MixedCells {
    MixedCells::from_cells(cells.iter().map(|[i, j, _]| match (i + j) % 3 {
        0 => vec![(1, 1.0)],
        1 => vec![(1, 0.5), (2 + j as i32, 0.5)],
        _ => vec![],
    }))
}

fn mix_values(cells: IndexBox) -> MixedCells {
    MixedCells::from_cells(cells.iter().map(|[i, j, _]| {
        if i % 2 == 0 {
            vec![(1, i as f64), (7, 100.0 + j as f64)]
        } else {
            vec![(7, 50.0 + i as f64)]
        }
    }))
}

fn mixed(
    reg: &BoundaryRegistry,
    ex: &GhostExchanger<'_, LocalComm>,
    mine: &[DomainId],
) -> Vec<Mixed> {
    let cells = |d: DomainId| reg.boundary(d).unwrap().old_cells().unwrap();
    let mats: Vec<MixedCells> = mine.iter().map(|&d| composition(cells(d))).collect();
    let vars: Vec<MixedCells> = mine.iter().map(|&d| mix_values(cells(d))).collect();
    let m = ex.exchange_material(mine, &mats).unwrap();
    let v = ex.exchange_mix_var(mine, &vars).unwrap();
    m.into_iter().zip(v).collect()
}

fn run_mixed(
    layout: fn() -> BoundaryRegistry,
    ranks: usize,
    owner: fn(DomainId) -> usize,
) -> Vec<Mixed> {
    let mut all = on_ranks(layout, ranks, owner, mixed);
    all.sort_by_key(|(m, _)| m.domain);
    all
}

#[test]
#[serial]
fn results_do_not_depend_on_the_owner_map() {
    let serial = run(1, |_| 0);
    assert_eq!(serial.len(), NX * NY);
    let owners: [fn(DomainId) -> usize; 4] = [|d| d % 2, |d| d / NX, |d| (d * 7) % 3, |d| d];
    let ranks = [2, NY, 3, NX * NY];
    for (owner, ranks) in owners.into_iter().zip(ranks) {
        let split = run(ranks, owner);
        assert_eq!(split, serial, "{ranks} ranks");
    }
}

#[test]
#[serial]
fn mixed_cells_do_not_depend_on_the_owner_map() {
    let serial = run_mixed(registry, 1, |_| 0);
    assert_eq!(serial.len(), NX * NY);
    assert!(serial.iter().all(|(m, _)| m.ghost_count() > 0));
    let owners: [fn(DomainId) -> usize; 3] = [|d| d % 2, |d| (d * 7) % 3, |d| d];
    let ranks = [2, 3, NX * NY];
    for (owner, ranks) in owners.into_iter().zip(ranks) {
        assert_eq!(run_mixed(registry, ranks, owner), serial, "{ranks} ranks");
    }
}

#[test]
#[serial]
fn coarsened_mixed_cells_do_not_depend_on_the_owner_map() {
    let serial = run_mixed(two_levels, 1, |_| 0);
    let coarse = &serial[0].0;
    assert_eq!(coarse.flag_at([2, 0, 0]), Some(GhostFlags::LEVEL_INTERFACE));
    assert_eq!(run_mixed(two_levels, 2, |d| d % 2), serial);
    assert_eq!(run_mixed(two_levels, 3, |d| d), serial);
}

#[test]
#[serial]
fn cross_rank_transfers_are_detected() {
    let reg = registry();
    let n = reg.num_domains();
    let comm = NoComm;
    let serial = GhostExchanger::new(&reg, DomainOwnership::single_process(n), &comm);
    assert!(!serial.requires_communication(GhostKind::Zones));
    let split = DomainOwnership::from_pairs(n, (0..n).map(|d| (d, d % 2))).unwrap();
    assert_eq!(split.ranks().len(), 2);
    let ex = GhostExchanger::new(&reg, split, &comm);
    assert!(ex.requires_communication(GhostKind::Zones));
    assert!(matches!(
        ex.exchange_scalar(&[1], Centering::Zones, &[vec![0.0; 6]]),
        Err(HaloError::NotLocal { domain: 1, owner: Some(1), rank: 0 })
    ));
}
