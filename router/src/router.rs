use crate::algo::accel::SearchAccelerator;
use crate::algo::astar::{AStar, Goal};
use crate::batch::BatchScheduler;
use crate::cost::CostModel;
use crate::error::{Result, RouteError};
use crate::grid::{DenseGrid, RoutingGrid};
use crate::negotiation::{Conflict, NegotiationOrchestrator, NegotiationStatus};
use crate::net::{PreparedNet, SearchContext, SearchEffort, SearchSettings};
use crate::utils::conversion::GridConverter;
use pcb_common::db::board::Board;
use pcb_common::db::indices::NetId;
use pcb_common::db::request::{PadLayers, RouteFailure, RouteRequest, RouteResult};
use pcb_common::db::rules::DesignRules;
use pcb_common::geom::coord::GridCoord;
use pcb_common::geom::point::Point;
use pcb_common::util::config::{Config, NegotiationConfig, RoutingConfig};
use pcb_common::util::profiler::ScopedTimer;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Cumulative counters over every routing call made on one [`Router`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RoutingStats {
    /// Successful results returned, counted once per call.
    pub nets_routed: usize,
    pub searches: usize,
    pub total_nodes_explored: u64,
    /// Mean nodes expanded per search performed.
    pub avg_nodes_per_route: f64,
}

/// Outcome of a multi-net call.
#[derive(Clone, Debug)]
pub struct RoutingReport {
    /// One entry per request.
    pub results: BTreeMap<NetId, RouteResult>,
    /// `None` when the nets were routed in a single non-negotiated pass.
    pub negotiation: Option<NegotiationStatus>,
    /// Cells still shared when negotiation stopped.
    pub conflicts: Vec<Conflict>,
}

impl RoutingReport {
    pub fn routed_count(&self) -> usize {
        self.results.values().filter(|r| r.success).count()
    }

    pub fn all_routed(&self) -> bool {
        self.results.values().all(|r| r.success)
    }
}

enum Preparation {
    Ready(PreparedNet),
    Rejected(RouteFailure),
}

/// Owns the routing grid and runs single-net, batched and negotiated
/// routing against it. Committed routes persist across calls.
pub struct Router<G: RoutingGrid = DenseGrid> {
    grid: G,
    converter: GridConverter,
    routing: RoutingConfig,
    negotiation: NegotiationConfig,
    accelerator: Option<Arc<dyn SearchAccelerator>>,
    stats: RoutingStats,
}

impl Router<DenseGrid> {
    /// Builds the grid for `board`, blocking every cell whose centre falls
    /// within clearance of an obstacle.
    pub fn from_board(board: &Board, config: &Config) -> Result<Self> {
        let rules = &config.rules;
        rules.validate()?;

        let converter = GridConverter::for_extent(&board.extent(), rules.grid_resolution);
        let (cols, rows) = converter.grid_size();
        let layers = board.outline.layers;
        let mut grid = DenseGrid::with_routable_layers(cols, rows, layers, board.routable_layers());
        if grid.routable_layers().is_empty() {
            return Err(RouteError::InvalidConfig(
                "board has no routable layer inside its layer stack".to_string(),
            ));
        }

        let margin = rules.clearance_distance();
        for obstacle in &board.obstacles {
            let zs: Vec<u8> = match obstacle.layer {
                Some(l) if l < layers => vec![l],
                Some(l) => {
                    log::warn!("Skipping obstacle on missing layer {}", l);
                    continue;
                }
                None => (0..layers).collect(),
            };
            for (x, y) in converter.cells_in(&obstacle.rect().inflate(margin)) {
                for &z in &zs {
                    grid.set_obstacle(GridCoord::new(x, y, z));
                }
            }
        }

        log::info!(
            "Grid: {}x{}x{} cells at {} per cell, {} obstacles",
            cols,
            rows,
            layers,
            rules.grid_resolution,
            board.obstacles.len()
        );
        Router::new(grid, converter, config.routing.clone(), config.negotiation.clone())
    }
}

impl<G: RoutingGrid> Router<G> {
    pub fn new(
        grid: G,
        converter: GridConverter,
        routing: RoutingConfig,
        negotiation: NegotiationConfig,
    ) -> Result<Self> {
        if converter.grid_size() != (grid.cols(), grid.rows()) {
            return Err(RouteError::InvalidConfig(format!(
                "converter covers {:?} cells but the grid is {}x{}",
                converter.grid_size(),
                grid.cols(),
                grid.rows()
            )));
        }
        if routing.arena_divisor == 0 || routing.arena_min > routing.arena_max {
            return Err(RouteError::InvalidConfig(
                "arena sizing needs a non-zero divisor and arena_min <= arena_max".to_string(),
            ));
        }
        if !negotiation.schedule.is_valid() {
            return Err(RouteError::InvalidConfig(format!(
                "invalid congestion schedule {:?}",
                negotiation.schedule
            )));
        }

        Ok(Self {
            grid,
            converter,
            routing,
            negotiation,
            accelerator: None,
            stats: RoutingStats::default(),
        })
    }

    pub fn with_accelerator(mut self, accelerator: Arc<dyn SearchAccelerator>) -> Self {
        self.accelerator = Some(accelerator);
        self
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn converter(&self) -> &GridConverter {
        &self.converter
    }

    pub fn routing_config(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Routes one net against the current grid. Nothing is committed.
    pub fn route_single(&mut self, request: &RouteRequest, rules: &DesignRules) -> Result<RouteResult> {
        self.check_rules(rules)?;
        let inflate = self.bbox_inflate(rules);

        let net = match self.prepare(request, inflate)? {
            Preparation::Ready(net) => net,
            Preparation::Rejected(failure) => {
                return Ok(RouteResult::failed(request.net_id, failure, 0));
            }
        };

        let accelerator = self.accelerator.clone();
        let ctx = self.context(rules, accelerator.as_deref());
        let result = ctx.search(&mut AStar::new(), &self.grid, &net, false, 0.0);

        let mut effort = SearchEffort::default();
        effort.record(&result);
        self.record(effort, result.success as usize);
        Ok(result)
    }

    /// Negotiated congestion routing over `requests`, stopping after at most
    /// `max_iterations` passes.
    pub fn route_negotiated(
        &mut self,
        requests: &[RouteRequest],
        rules: &DesignRules,
        max_iterations: usize,
    ) -> Result<RoutingReport> {
        self.check_rules(rules)?;
        if max_iterations == 0 {
            return Err(RouteError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let _timer = ScopedTimer::new("Route negotiated");

        let (nets, mut results) = self.prepare_batch(requests, rules)?;
        let negotiation = NegotiationConfig {
            max_iterations,
            ..self.negotiation.clone()
        };
        let accelerator = self.accelerator.clone();
        let ctx = self.context(rules, accelerator.as_deref());
        let scheduler = BatchScheduler::new(self.routing.max_group_size);

        let outcome = NegotiationOrchestrator::new(ctx, &negotiation, scheduler).run(&mut self.grid, &nets);
        for (net, result) in nets.iter().zip(outcome.results) {
            results.insert(net.net, result);
        }

        let report = RoutingReport {
            results,
            negotiation: Some(outcome.status),
            conflicts: outcome.conflicts,
        };
        self.record(outcome.effort, report.routed_count());
        log::info!(
            "Routed {}/{} nets in {} passes ({} shared cells)",
            report.routed_count(),
            report.results.len(),
            outcome.status.passes(),
            report.conflicts.len()
        );
        Ok(report)
    }

    /// Routes `requests` together. With `negotiated` set this is
    /// [`Router::route_negotiated`] with the configured pass budget;
    /// otherwise every net gets one exclusive search.
    pub fn route_batch(
        &mut self,
        requests: &[RouteRequest],
        rules: &DesignRules,
        negotiated: bool,
    ) -> Result<RoutingReport> {
        if negotiated {
            return self.route_negotiated(requests, rules, self.negotiation.max_iterations);
        }
        self.check_rules(rules)?;
        let _timer = ScopedTimer::new("Route batch");

        let (nets, mut results) = self.prepare_batch(requests, rules)?;
        let accelerator = self.accelerator.clone();
        let ctx = self.context(rules, accelerator.as_deref());
        let scheduler = BatchScheduler::new(self.routing.max_group_size);

        let (routed, effort) = scheduler.route(&ctx, &mut self.grid, &nets);
        for (net, result) in nets.iter().zip(routed) {
            results.insert(net.net, result);
        }

        let report = RoutingReport {
            results,
            negotiation: None,
            conflicts: Vec::new(),
        };
        self.record(effort, report.routed_count());
        log::info!(
            "Routed {}/{} nets in a single pass",
            report.routed_count(),
            report.results.len()
        );
        Ok(report)
    }

    pub fn get_statistics(&self) -> RoutingStats {
        self.stats
    }

    /// Path of `result` in world coordinates, with the layer of each point.
    pub fn world_path(&self, result: &RouteResult) -> Result<Vec<(Point<f64>, u8)>> {
        result
            .path
            .iter()
            .map(|c| Ok((self.converter.to_world(c.x, c.y)?, c.z)))
            .collect()
    }

    /// Groups the in-bounds requests the way a batch run would search them.
    /// Each inner list holds net ids that may be searched concurrently.
    pub fn partition(&self, requests: &[RouteRequest], rules: &DesignRules) -> Result<Vec<Vec<NetId>>> {
        self.check_rules(rules)?;
        let (nets, _) = self.collect_nets(requests, rules)?;
        let boxes: Vec<_> = nets.iter().map(|n| n.bbox).collect();
        let groups = BatchScheduler::new(self.routing.max_group_size).partition(&boxes);
        Ok(groups
            .into_iter()
            .map(|g| g.into_iter().map(|i| nets[i].net).collect())
            .collect())
    }

    fn check_rules(&self, rules: &DesignRules) -> Result<()> {
        rules.validate()?;
        let grid = self.converter.resolution();
        if (rules.grid_resolution - grid).abs() > 1e-9 * grid.abs().max(1.0) {
            return Err(RouteError::ResolutionMismatch {
                rules: rules.grid_resolution,
                grid,
            });
        }
        Ok(())
    }

    fn bbox_inflate(&self, rules: &DesignRules) -> u32 {
        rules.clearance_radius_cells() + self.routing.bbox_margin
    }

    fn context<'a>(
        &self,
        rules: &DesignRules,
        accelerator: Option<&'a dyn SearchAccelerator>,
    ) -> SearchContext<'a> {
        SearchContext {
            model: CostModel::new(rules, self.routing.allow_diagonal),
            settings: SearchSettings {
                arena_capacity: self.routing.arena_capacity(self.grid.cell_count()),
                node_budget: self.routing.node_budget,
                time_limit: self.routing.time_limit_ms.map(Duration::from_millis),
            },
            accelerator,
        }
    }

    fn record(&mut self, effort: SearchEffort, routed: usize) {
        let stats = &mut self.stats;
        stats.nets_routed += routed;
        stats.searches += effort.searches;
        stats.total_nodes_explored += effort.nodes_explored;
        stats.avg_nodes_per_route = if stats.searches > 0 {
            stats.total_nodes_explored as f64 / stats.searches as f64
        } else {
            0.0
        };
    }

    fn pad_layers(&self, net: NetId, layers: PadLayers) -> Result<Vec<u8>> {
        let routable = self.grid.routable_layers();
        let resolved = layers.resolve(routable);
        if let Some(&bad) = resolved.iter().find(|z| !routable.contains(z)) {
            return Err(RouteError::InvalidRequest {
                net,
                reason: format!("pad layer {} is not routable", bad),
            });
        }
        Ok(resolved)
    }

    fn prepare(&self, request: &RouteRequest, inflate: u32) -> Result<Preparation> {
        let net = request.net_id;
        if net.is_free() {
            return Err(RouteError::InvalidRequest {
                net,
                reason: "net id 0 is reserved for free cells".to_string(),
            });
        }
        let source_layers = self.pad_layers(net, request.source.layers)?;
        let target_layers = self.pad_layers(net, request.target.layers)?;

        let mut ends = [(0, 0); 2];
        for (end, pad) in ends.iter_mut().zip([&request.source, &request.target]) {
            *end = match self.converter.to_grid(pad.point) {
                Ok(cell) => cell,
                Err(RouteError::OutOfBounds { x, y }) => {
                    log::warn!("Net {} has a pad outside the grid at ({}, {})", net, x, y);
                    return Ok(Preparation::Rejected(RouteFailure::OutOfBounds { x, y }));
                }
                Err(e) => return Err(e),
            };
        }
        let [(sx, sy), (tx, ty)] = ends;

        let sources = source_layers
            .into_iter()
            .map(|z| GridCoord::new(sx, sy, z))
            .collect();
        let goal = Goal {
            x: tx,
            y: ty,
            layers: target_layers,
        };
        Ok(Preparation::Ready(PreparedNet::new(
            net,
            sources,
            goal,
            request.priority,
            inflate,
        )))
    }

    /// Validates a multi-net request set. Returns the routable nets in
    /// priority order plus results for nets rejected up front.
    fn collect_nets(
        &self,
        requests: &[RouteRequest],
        rules: &DesignRules,
    ) -> Result<(Vec<PreparedNet>, BTreeMap<NetId, RouteResult>)> {
        let inflate = self.bbox_inflate(rules);
        let mut seen = HashSet::new();
        let mut nets = Vec::with_capacity(requests.len());
        let mut results = BTreeMap::new();

        for request in requests {
            if !seen.insert(request.net_id) {
                return Err(RouteError::InvalidRequest {
                    net: request.net_id,
                    reason: "net requested more than once".to_string(),
                });
            }
            match self.prepare(request, inflate)? {
                Preparation::Ready(net) => nets.push(net),
                Preparation::Rejected(failure) => {
                    results.insert(request.net_id, RouteResult::failed(request.net_id, failure, 0));
                }
            }
        }

        let mut pads: HashMap<GridCoord, NetId> = HashMap::new();
        for net in &nets {
            for cell in net.pad_cells() {
                match pads.insert(cell, net.net) {
                    Some(other) if other != net.net => {
                        return Err(RouteError::InvalidRequest {
                            net: net.net,
                            reason: format!("pad at {} overlaps a pad of net {}", cell, other),
                        });
                    }
                    _ => {}
                }
            }
        }

        nets.sort_by_key(|n| Reverse(n.priority));
        Ok((nets, results))
    }

    /// Same checks as `collect_nets`, then clears the nets' previous routes
    /// and reserves their pads.
    fn prepare_batch(
        &mut self,
        requests: &[RouteRequest],
        rules: &DesignRules,
    ) -> Result<(Vec<PreparedNet>, BTreeMap<NetId, RouteResult>)> {
        let (nets, results) = self.collect_nets(requests, rules)?;
        for net in &nets {
            self.grid.release_net(net.net);
        }
        for net in &nets {
            for cell in net.pad_cells() {
                if let Some(other) = self.grid.reserve(cell, net.net) {
                    log::warn!("Pad {} of net {} is already held by net {}", cell, net.net, other);
                }
            }
        }
        Ok((nets, results))
    }
}
