use approx::assert_relative_eq;
use pcb_common::db::board::Board;
use pcb_common::db::indices::NetId;
use pcb_common::db::request::{PadLayers, PadLocation, RouteFailure, RouteRequest};
use pcb_common::db::rules::DesignRules;
use pcb_common::geom::coord::GridCoord;
use pcb_common::geom::point::Point;
use pcb_common::util::config::{Config, NegotiationConfig, RoutingConfig};
use pcb_router::algo::accel::{HeuristicBatch, ParallelHeuristic, SearchAccelerator};
use pcb_router::cost::CostModel;
use pcb_router::grid::{DenseGrid, RoutingGrid};
use pcb_router::negotiation::NegotiationStatus;
use pcb_router::utils::check::run_route_check;
use pcb_router::utils::conversion::GridConverter;
use pcb_router::{RouteError, Router};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn rules() -> DesignRules {
    DesignRules {
        grid_resolution: 1.0,
        ..DesignRules::default()
    }
}

fn router_on(grid: DenseGrid) -> Router {
    let converter = GridConverter::new(Point::new(0.0, 0.0), 1.0, grid.cols(), grid.rows());
    Router::new(
        grid,
        converter,
        RoutingConfig::default(),
        NegotiationConfig::default(),
    )
    .unwrap()
}

fn request(net: usize, from: (f64, f64), to: (f64, f64)) -> RouteRequest {
    RouteRequest::new(
        NetId::new(net),
        PadLocation::new(from.0, from.1, PadLayers::Fixed(0)),
        PadLocation::new(to.0, to.1, PadLayers::Fixed(0)),
    )
}

/// Uniform-cost search over the same single-layer move set the router uses.
fn reference_cost(grid: &DenseGrid, from: (u32, u32), to: (u32, u32)) -> Option<f64> {
    let (w, h) = (grid.cols() as i64, grid.rows() as i64);
    let idx = |x: i64, y: i64| (y * w + x) as usize;
    let blocked = |x: i64, y: i64| grid.is_obstacle(GridCoord::new(x as u32, y as u32, 0));
    let mut dist = vec![f64::INFINITY; (w * h) as usize];
    let mut done = vec![false; (w * h) as usize];
    dist[idx(from.0 as i64, from.1 as i64)] = 0.0;

    loop {
        let mut best: Option<(usize, f64)> = None;
        for (i, &d) in dist.iter().enumerate() {
            if !done[i] && d.is_finite() && best.is_none_or(|(_, b)| d < b) {
                best = Some((i, d));
            }
        }
        let (i, d) = best?;
        let (x, y) = ((i as i64) % w, (i as i64) / w);
        if (x, y) == (to.0 as i64, to.1 as i64) {
            return Some(d);
        }
        done[i] = true;

        for dx in -1..=1_i64 {
            for dy in -1..=1_i64 {
                let (nx, ny) = (x + dx, y + dy);
                if (dx, dy) == (0, 0) || nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                if blocked(nx, ny) {
                    continue;
                }
                let step = if dx != 0 && dy != 0 {
                    if blocked(nx, y) || blocked(x, ny) {
                        continue;
                    }
                    std::f64::consts::SQRT_2
                } else {
                    1.0
                };
                let j = idx(nx, ny);
                if d + step < dist[j] {
                    dist[j] = d + step;
                }
            }
        }
    }
}

#[test]
fn diagonal_across_open_grid() {
    let mut router = router_on(DenseGrid::new(4, 4, 1));
    let result = router
        .route_single(&request(1, (0.0, 0.0), (3.0, 3.0)), &rules())
        .unwrap();

    assert!(result.success);
    assert_eq!(result.path.len(), 4);
    assert_eq!(result.path[0], GridCoord::new(0, 0, 0));
    assert_eq!(result.path[3], GridCoord::new(3, 3, 0));
    assert_relative_eq!(result.cost, 3.0 * std::f64::consts::SQRT_2, epsilon = 1e-9);
}

#[test]
fn identical_endpoints_give_single_cell() {
    let mut router = router_on(DenseGrid::new(4, 4, 1));
    let result = router
        .route_single(&request(1, (2.0, 2.0), (2.0, 2.0)), &rules())
        .unwrap();

    assert!(result.success);
    assert_eq!(result.path, vec![GridCoord::new(2, 2, 0)]);
    assert_eq!(result.cost, 0.0);
    assert_eq!(result.nodes_explored, 0);
}

#[test]
fn enclosed_target_fails_without_error() {
    let mut grid = DenseGrid::new(8, 8, 1);
    for (x, y) in [(4, 4), (5, 4), (6, 4), (4, 5), (6, 5), (4, 6), (5, 6), (6, 6)] {
        grid.set_obstacle(GridCoord::new(x, y, 0));
    }
    let mut router = router_on(grid);
    let result = router
        .route_single(&request(1, (0.0, 0.0), (5.0, 5.0)), &rules())
        .unwrap();

    assert!(!result.success);
    assert!(result.path.is_empty());
    assert!(result.cost.is_infinite());
    assert!(result.nodes_explored > 0);
    assert_eq!(result.failure, Some(RouteFailure::NoPathFound));
}

#[test]
fn target_on_obstacle_has_no_path() {
    let mut grid = DenseGrid::new(8, 8, 1);
    grid.set_obstacle(GridCoord::new(5, 5, 0));
    let mut router = router_on(grid);
    let result = router
        .route_single(&request(1, (0.0, 0.0), (5.0, 5.0)), &rules())
        .unwrap();

    assert!(!result.success);
    assert!(result.path.is_empty());
    assert_eq!(result.failure, Some(RouteFailure::NoPathFound));
}

#[test]
fn target_on_foreign_trace_has_no_path() {
    let mut grid = DenseGrid::new(10, 10, 1);
    let trace: Vec<GridCoord> = (0..10).map(|x| GridCoord::new(x, 5, 0)).collect();
    grid.commit_path(NetId::new(9), &trace);
    let mut router = router_on(grid);

    let onto_trace = router
        .route_single(&request(1, (5.0, 0.0), (5.0, 5.0)), &rules())
        .unwrap();
    assert!(!onto_trace.success);
    assert_eq!(onto_trace.failure, Some(RouteFailure::NoPathFound));

    let from_trace = router
        .route_single(&request(2, (5.0, 5.0), (5.0, 0.0)), &rules())
        .unwrap();
    assert!(!from_trace.success);
    assert_eq!(from_trace.failure, Some(RouteFailure::NoPathFound));
}

#[test]
fn search_matches_reference_costs() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut grid = DenseGrid::new(15, 15, 1);
        for _ in 0..50 {
            let (x, y) = (rng.gen_range(0..15), rng.gen_range(0..15));
            if (x, y) != (0, 0) && (x, y) != (14, 14) {
                grid.set_obstacle(GridCoord::new(x, y, 0));
            }
        }
        let expected = reference_cost(&grid, (0, 0), (14, 14));

        let mut router = router_on(grid);
        let result = router
            .route_single(&request(1, (0.0, 0.0), (14.0, 14.0)), &rules())
            .unwrap();

        match expected {
            Some(cost) => {
                assert!(result.success);
                assert_relative_eq!(result.cost, cost, epsilon = 1e-9);
            }
            None => assert!(!result.success),
        }
    }
}

#[test]
fn invalid_rules_are_rejected() {
    let mut router = router_on(DenseGrid::new(4, 4, 1));
    let bad = DesignRules {
        trace_width: -1.0,
        ..rules()
    };
    let err = router
        .route_single(&request(1, (0.0, 0.0), (3.0, 3.0)), &bad)
        .unwrap_err();
    assert!(matches!(err, RouteError::InvalidRules(_)));

    let coarse = DesignRules {
        grid_resolution: 0.5,
        ..rules()
    };
    let err = router
        .route_batch(&[request(1, (0.0, 0.0), (3.0, 3.0))], &coarse, false)
        .unwrap_err();
    assert!(matches!(err, RouteError::ResolutionMismatch { .. }));
}

#[test]
fn zero_iteration_budget_is_rejected() {
    let mut router = router_on(DenseGrid::new(4, 4, 1));
    let err = router
        .route_negotiated(&[request(1, (0.0, 0.0), (3.0, 3.0))], &rules(), 0)
        .unwrap_err();
    assert!(matches!(err, RouteError::InvalidConfig(_)));
}

#[test]
fn out_of_bounds_pad_does_not_abort_batch() {
    let mut router = router_on(DenseGrid::new(10, 10, 1));
    let requests = [
        request(1, (0.0, 0.0), (5.0, 0.0)),
        request(2, (0.0, 5.0), (40.0, 5.0)),
    ];
    let report = router.route_batch(&requests, &rules(), true).unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(report.results[&NetId::new(1)].success);
    assert_eq!(
        report.results[&NetId::new(2)].failure,
        Some(RouteFailure::OutOfBounds { x: 40.0, y: 5.0 })
    );
}

#[test]
fn malformed_request_sets_are_rejected() {
    let mut router = router_on(DenseGrid::new(10, 10, 1));
    let duplicate = [
        request(1, (0.0, 0.0), (5.0, 0.0)),
        request(1, (0.0, 5.0), (5.0, 5.0)),
    ];
    assert!(matches!(
        router.route_batch(&duplicate, &rules(), false),
        Err(RouteError::InvalidRequest { .. })
    ));

    let shared_pad = [
        request(1, (0.0, 0.0), (5.0, 0.0)),
        request(2, (5.0, 0.0), (5.0, 5.0)),
    ];
    assert!(matches!(
        router.route_batch(&shared_pad, &rules(), false),
        Err(RouteError::InvalidRequest { .. })
    ));

    let free_net = [request(0, (0.0, 0.0), (5.0, 0.0))];
    assert!(matches!(
        router.route_batch(&free_net, &rules(), false),
        Err(RouteError::InvalidRequest { .. })
    ));

    let missing_layer = [RouteRequest::new(
        NetId::new(3),
        PadLocation::new(0.0, 0.0, PadLayers::Fixed(4)),
        PadLocation::new(5.0, 0.0, PadLayers::Fixed(0)),
    )];
    assert!(matches!(
        router.route_batch(&missing_layer, &rules(), false),
        Err(RouteError::InvalidRequest { .. })
    ));
}

#[test]
fn independent_nets_converge_in_one_pass() {
    let mut router = router_on(DenseGrid::new(20, 20, 2));
    let requests: Vec<RouteRequest> = (0..5)
        .map(|i| {
            let y = (i * 4) as f64;
            request(i + 1, (0.0, y), (10.0, y))
        })
        .collect();
    let report = router.route_negotiated(&requests, &rules(), 10).unwrap();

    assert_eq!(report.negotiation, Some(NegotiationStatus::Converged { passes: 1 }));
    assert!(report.all_routed());
    assert!(report.conflicts.is_empty());
    let results: Vec<_> = report.results.values().cloned().collect();
    assert!(run_route_check(router.grid(), &results, true).is_ok());
}

#[test]
fn overlapping_nets_are_grouped_apart() {
    let router = router_on(DenseGrid::new(12, 12, 1));
    let requests = [
        request(1, (0.0, 1.0), (4.0, 1.0)),
        request(2, (2.0, 0.0), (2.0, 4.0)),
        request(3, (9.0, 9.0), (11.0, 11.0)),
    ];
    let groups = router.partition(&requests, &rules()).unwrap();
    assert_eq!(
        groups,
        vec![vec![NetId::new(1), NetId::new(3)], vec![NetId::new(2)]]
    );
    assert_eq!(router.partition(&requests, &rules()).unwrap(), groups);
}

#[test]
fn crossing_nets_converge_through_negotiation() {
    let mut router = router_on(DenseGrid::new(12, 12, 1));
    let requests = [
        request(1, (0.0, 1.0), (4.0, 1.0)),
        request(2, (2.0, 0.0), (2.0, 4.0)),
    ];
    let report = router.route_negotiated(&requests, &rules(), 30).unwrap();

    let status = report.negotiation.unwrap();
    assert!(status.is_converged());
    assert!(status.passes() >= 2);
    assert!(report.all_routed());
    assert!(report.conflicts.is_empty());

    let results: Vec<_> = report.results.values().cloned().collect();
    assert!(run_route_check(router.grid(), &results, true).is_ok());
}

#[test]
fn layer_change_uses_a_via() {
    let mut grid = DenseGrid::new(6, 3, 2);
    for y in 0..3 {
        grid.set_obstacle(GridCoord::new(3, y, 0));
    }
    let mut router = router_on(grid);
    let req = RouteRequest::new(
        NetId::new(1),
        PadLocation::new(0.0, 1.0, PadLayers::Fixed(0)),
        PadLocation::new(5.0, 1.0, PadLayers::Fixed(0)),
    );
    let report = router.route_batch(&[req], &rules(), false).unwrap();
    let result = &report.results[&NetId::new(1)];

    assert!(result.success);
    assert_eq!(result.via_count(), 2);
    assert!(result.cost >= 20.0);
    let world = router.world_path(result).unwrap();
    assert_eq!(world.first(), Some(&(Point::new(0.0, 1.0), 0)));
    assert_eq!(world.last(), Some(&(Point::new(5.0, 1.0), 0)));
}

#[test]
fn repeated_runs_are_deterministic() {
    let requests: Vec<RouteRequest> = (0..8)
        .map(|i| {
            let x = (i * 2) as f64;
            request(i + 1, (x, 0.0), (19.0 - x, 19.0))
        })
        .collect();

    let run = || {
        let mut router = router_on(DenseGrid::new(20, 20, 2));
        router.route_negotiated(&requests, &rules(), 10).unwrap()
    };
    let (a, b) = (run(), run());
    assert_eq!(a.results, b.results);
    assert_eq!(a.negotiation, b.negotiation);
}

#[test]
fn statistics_accumulate_over_calls() {
    let mut router = router_on(DenseGrid::new(10, 10, 1));
    assert_eq!(router.get_statistics().searches, 0);

    let first = router
        .route_single(&request(1, (0.0, 0.0), (9.0, 0.0)), &rules())
        .unwrap();
    let second = router
        .route_single(&request(2, (0.0, 9.0), (9.0, 9.0)), &rules())
        .unwrap();

    let stats = router.get_statistics();
    assert_eq!(stats.nets_routed, 2);
    assert_eq!(stats.searches, 2);
    let total = (first.nodes_explored + second.nodes_explored) as u64;
    assert_eq!(stats.total_nodes_explored, total);
    assert_relative_eq!(stats.avg_nodes_per_route, total as f64 / 2.0);
}

#[test]
fn board_obstacles_are_inflated_by_clearance() {
    let board = Board::from_toml_str(
        r#"
        [outline]
        width = 10.0
        height = 10.0
        layers = 1

        [[obstacles]]
        min_x = 4.0
        min_y = 4.0
        max_x = 5.0
        max_y = 5.0

        [[nets]]
        id = 1
        source = { x = 0.0, y = 4.5, layer = 0 }
        target = { x = 9.0, y = 4.5, layer = 0 }
        "#,
    )
    .unwrap();
    let config = Config {
        rules: DesignRules {
            grid_resolution: 0.5,
            ..DesignRules::default()
        },
        ..Config::default()
    };

    let (router, report) = pcb_router::route(&board, &config).unwrap();
    let grid = router.grid();
    assert_eq!((grid.cols(), grid.rows()), (21, 21));
    // a 0.3 clearance covers 3.7..5.3, which holds cell centres 4.0, 4.5 and 5.0
    assert!(grid.is_obstacle(GridCoord::new(8, 8, 0)));
    assert!(grid.is_obstacle(GridCoord::new(10, 10, 0)));
    assert!(!grid.is_obstacle(GridCoord::new(7, 9, 0)));
    assert!(!grid.is_obstacle(GridCoord::new(11, 9, 0)));

    let result = &report.results[&NetId::new(1)];
    assert!(result.success);
    assert!(result.path.iter().all(|&c| !grid.is_obstacle(c)));
}

/// Returns a wrong-length batch.
struct ShortBatch;

impl SearchAccelerator for ShortBatch {
    fn heuristics(&self, _: &CostModel, batch: &HeuristicBatch<'_>, out: &mut Vec<f64>) -> bool {
        out.clear();
        out.extend(batch.cells.iter().skip(1).map(|_| 0.0));
        true
    }
}

/// Returns NaN for every cell.
struct NanBatch;

impl SearchAccelerator for NanBatch {
    fn heuristics(&self, _: &CostModel, batch: &HeuristicBatch<'_>, out: &mut Vec<f64>) -> bool {
        out.clear();
        out.resize(batch.cells.len(), f64::NAN);
        true
    }
}

fn walled_grid() -> DenseGrid {
    let mut grid = DenseGrid::new(20, 20, 2);
    for y in 0..16 {
        grid.set_obstacle(GridCoord::new(9, y, 0));
    }
    grid
}

fn crossing_requests() -> Vec<RouteRequest> {
    (0..6)
        .map(|i| {
            let x = (i * 3) as f64;
            request(i + 1, (x, 0.0), (19.0 - x, 19.0))
        })
        .collect()
}

#[test]
fn accelerated_routing_matches_scalar() {
    let requests = crossing_requests();
    let accelerated = || {
        router_on(walled_grid()).with_accelerator(Arc::new(ParallelHeuristic { min_batch: 1 }))
    };

    let single = request(1, (0.0, 2.0), (18.0, 2.0));
    let scalar = router_on(walled_grid()).route_single(&single, &rules()).unwrap();
    let fast = accelerated().route_single(&single, &rules()).unwrap();
    assert!(scalar.success);
    assert_eq!(scalar, fast);

    let scalar = router_on(walled_grid())
        .route_negotiated(&requests, &rules(), 10)
        .unwrap();
    let fast = accelerated().route_negotiated(&requests, &rules(), 10).unwrap();
    assert_eq!(scalar.results, fast.results);
    assert_eq!(scalar.negotiation, fast.negotiation);

    let scalar = router_on(walled_grid())
        .route_batch(&requests, &rules(), false)
        .unwrap();
    let fast = accelerated().route_batch(&requests, &rules(), false).unwrap();
    assert_eq!(scalar.results, fast.results);
}

#[test]
fn unusable_accelerator_output_falls_back_to_scalar() {
    let requests = crossing_requests();
    let scalar = router_on(walled_grid())
        .route_negotiated(&requests, &rules(), 10)
        .unwrap();

    let backends: [Arc<dyn SearchAccelerator>; 2] = [Arc::new(ShortBatch), Arc::new(NanBatch)];
    for backend in backends {
        let mut router = router_on(walled_grid()).with_accelerator(backend);
        let report = router.route_negotiated(&requests, &rules(), 10).unwrap();
        assert_eq!(report.results, scalar.results);
        assert_eq!(report.negotiation, scalar.negotiation);
    }
}
