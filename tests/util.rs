#![allow(dead_code)]
use block_halo::prelude::*;

/// Value of a zone or node at global index `p`; distinct across the grids used here.
pub fn global(p: [i64; 3]) -> f64 {
    p[0] as f64 + 1000.0 * p[1] as f64
}

/// Two 4×4×1 blocks sharing the i=4 plane, neighbors resolved.
pub fn two_blocks() -> BoundaryRegistry {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(2).unwrap();
    reg.set_extents(0, [0, 4, 0, 4, 0, 0]).unwrap();
    reg.set_extents(1, [4, 8, 0, 4, 0, 0]).unwrap();
    let report = resolve_neighbors(&mut reg).unwrap();
    assert_eq!(report.added, 2);
    reg
}

/// `nx × ny` blocks of `w × h` cells tiling the plane from the origin,
/// numbered i-fastest.
pub fn grid(nx: usize, ny: usize, w: i64, h: i64) -> BoundaryRegistry {
    let mut reg = BoundaryRegistry::new();
    reg.set_num_domains(nx * ny).unwrap();
    for by in 0..ny {
        for bx in 0..nx {
            let (i0, j0) = (bx as i64 * w, by as i64 * h);
            reg.set_extents(bx + nx * by, [i0, i0 + w, j0, j0 + h, 0, 0])
                .unwrap();
        }
    }
    resolve_neighbors(&mut reg).unwrap();
    reg
}

/// Native zone values of `domain` from a function of the global cell index.
pub fn zones_of(reg: &BoundaryRegistry, domain: DomainId, f: impl Fn([i64; 3]) -> f64) -> Vec<f64> {
    let cells = reg.boundary(domain).unwrap().old_cells().unwrap();
    cells.iter().map(f).collect()
}

/// Native node values of `domain` from a function of the global node index.
pub fn nodes_of(reg: &BoundaryRegistry, domain: DomainId, f: impl Fn([i64; 3]) -> f64) -> Vec<f64> {
    let points = reg.boundary(domain).unwrap().old_points().unwrap();
    points.iter().map(f).collect()
}
