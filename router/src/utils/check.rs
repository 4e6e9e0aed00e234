use crate::grid::RoutingGrid;
use pcb_common::db::indices::NetId;
use pcb_common::db::request::RouteResult;
use pcb_common::geom::coord::GridCoord;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Verifies committed routes against the grid: every path is connected,
/// stays in bounds, avoids obstacles between its endpoints, only uses cells
/// its net owns, and no two nets claim the same cell.
pub fn run_route_check<G: RoutingGrid>(
    grid: &G,
    results: &[RouteResult],
    allow_diagonal: bool,
) -> Result<(), String> {
    log::info!("Starting Route Verification...");
    let valid = AtomicBool::new(true);

    results.par_iter().filter(|r| r.success).for_each(|r| {
        if let Err(msg) = check_path(grid, r.net_id, &r.path, allow_diagonal) {
            log::error!("FAIL: Net {}: {}", r.net_id, msg);
            valid.store(false, Ordering::Relaxed);
        }
    });

    let mut claimed: HashMap<GridCoord, NetId> = HashMap::new();
    for r in results.iter().filter(|r| r.success) {
        for c in footprint(grid, &r.path) {
            match claimed.insert(c, r.net_id) {
                Some(other) if other != r.net_id => {
                    log::error!("FAIL: Nets {} and {} overlap at {}", other, r.net_id, c);
                    valid.store(false, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    if valid.load(Ordering::Relaxed) {
        log::info!("Route Verification PASSED.");
        Ok(())
    } else {
        Err("Route verification failed".to_string())
    }
}

fn check_path<G: RoutingGrid>(
    grid: &G,
    net: NetId,
    path: &[GridCoord],
    allow_diagonal: bool,
) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty path".to_string());
    }

    for &c in path {
        if !grid.in_bounds(c) {
            return Err(format!("{} is outside the grid", c));
        }
        if grid.is_obstacle(c) {
            return Err(format!("crosses obstacle at {}", c));
        }
        if grid.is_blocked(c, net, false) {
            return Err(format!("{} is owned by net {}", c, grid.owner(c)));
        }
    }

    for step in path.windows(2) {
        let (a, b) = (step[0], step[1]);
        let legal = if a.z != b.z {
            a.same_column(&b)
        } else {
            match a.planar_step(&b) {
                (1, 0) | (0, 1) => true,
                (1, 1) => allow_diagonal,
                _ => false,
            }
        };
        if !legal {
            return Err(format!("illegal step {} -> {}", a, b));
        }
    }
    Ok(())
}

fn footprint<G: RoutingGrid>(grid: &G, path: &[GridCoord]) -> Vec<GridCoord> {
    let mut cells = path.to_vec();
    for step in path.windows(2) {
        if step[0].z != step[1].z {
            cells.extend((0..grid.layers()).map(|z| step[0].on_layer(z)));
        }
    }
    cells.sort_unstable();
    cells.dedup();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DenseGrid;

    const A: NetId = NetId(1);
    const B: NetId = NetId(2);

    fn committed(grid: &mut DenseGrid, net: NetId, path: Vec<GridCoord>) -> RouteResult {
        grid.commit_path(net, &path);
        RouteResult::routed(net, path, 0.0, 0)
    }

    #[test]
    fn accepts_disjoint_routes() {
        let mut grid = DenseGrid::new(5, 5, 2);
        let a = committed(
            &mut grid,
            A,
            vec![
                GridCoord::new(0, 0, 0),
                GridCoord::new(1, 1, 0),
                GridCoord::new(1, 1, 1),
                GridCoord::new(2, 1, 1),
            ],
        );
        let b = committed(&mut grid, B, vec![GridCoord::new(4, 0, 0), GridCoord::new(4, 1, 0)]);
        assert!(run_route_check(&grid, &[a, b], true).is_ok());
    }

    #[test]
    fn rejects_gaps_and_disallowed_diagonals() {
        let grid = DenseGrid::new(5, 5, 1);
        let gap = [GridCoord::new(0, 0, 0), GridCoord::new(2, 0, 0)];
        assert!(check_path(&grid, A, &gap, true).is_err());

        let diagonal = [GridCoord::new(0, 0, 0), GridCoord::new(1, 1, 0)];
        assert!(check_path(&grid, A, &diagonal, false).is_err());
        assert!(check_path(&grid, A, &diagonal, true).is_ok());
        assert!(check_path(&grid, A, &[], true).is_err());
    }

    #[test]
    fn rejects_shared_cells() {
        let mut grid = DenseGrid::new(5, 5, 1);
        let a = committed(&mut grid, A, vec![GridCoord::new(0, 2, 0), GridCoord::new(1, 2, 0)]);
        let b = committed(&mut grid, B, vec![GridCoord::new(1, 1, 0), GridCoord::new(1, 2, 0)]);
        assert!(run_route_check(&grid, &[a, b], true).is_err());
    }

    #[test]
    fn obstacles_rejected_anywhere_on_a_path() {
        let mut grid = DenseGrid::new(5, 5, 1);
        grid.set_obstacle(GridCoord::new(2, 0, 0));
        let ending = [GridCoord::new(1, 0, 0), GridCoord::new(2, 0, 0)];
        assert!(check_path(&grid, A, &ending, false).is_err());
        let starting = [GridCoord::new(2, 0, 0), GridCoord::new(3, 0, 0)];
        assert!(check_path(&grid, A, &starting, false).is_err());

        let through = [
            GridCoord::new(1, 0, 0),
            GridCoord::new(2, 0, 0),
            GridCoord::new(3, 0, 0),
        ];
        assert!(check_path(&grid, A, &through, false).is_err());
    }
}
