use crate::algo::accel::SearchAccelerator;
use crate::algo::astar::{AStar, ExhaustReason, Goal, SearchLimits, SearchQuery, SearchStatus};
use crate::batch::BatchScheduler;
use crate::cost::CostModel;
use crate::grid::RoutingGrid;
use pcb_common::db::indices::NetId;
use pcb_common::db::request::{RouteFailure, RouteResult};
use pcb_common::geom::coord::GridCoord;
use pcb_common::geom::rect::Rect;
use std::time::{Duration, Instant};

/// A request resolved to grid cells, ready for searching.
#[derive(Clone, Debug)]
pub struct PreparedNet {
    pub net: NetId,
    pub sources: Vec<GridCoord>,
    pub goal: Goal,
    pub priority: i32,
    /// Clearance-inflated endpoint box, in cells.
    pub bbox: Rect,
}

impl PreparedNet {
    pub fn new(net: NetId, sources: Vec<GridCoord>, goal: Goal, priority: i32, inflate: u32) -> Self {
        let mut endpoints = sources.clone();
        endpoints.extend(goal.layers.iter().map(|&z| GridCoord::new(goal.x, goal.y, z)));
        let bbox = BatchScheduler::bounding_box(&endpoints, inflate);
        Self {
            net,
            sources,
            goal,
            priority,
            bbox,
        }
    }

    /// Every pad cell of the net: all source seeds and goal layers.
    pub fn pad_cells(&self) -> impl Iterator<Item = GridCoord> + '_ {
        self.sources.iter().copied().chain(
            self.goal
                .layers
                .iter()
                .map(|&z| GridCoord::new(self.goal.x, self.goal.y, z)),
        )
    }

    pub fn query(&self, allow_sharing: bool, present_factor: f64) -> SearchQuery {
        SearchQuery {
            net: self.net,
            sources: self.sources.clone(),
            goal: self.goal.clone(),
            allow_sharing,
            present_factor,
        }
    }
}

/// Per-search bounds; the deadline is taken when each search starts.
#[derive(Clone, Copy, Debug)]
pub struct SearchSettings {
    pub arena_capacity: usize,
    pub node_budget: Option<u32>,
    pub time_limit: Option<Duration>,
}

impl SearchSettings {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            arena_capacity: self.arena_capacity,
            node_budget: self.node_budget,
            deadline: self.time_limit.map(|t| Instant::now() + t),
        }
    }
}

/// Everything a search needs apart from the grid and the net.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub model: CostModel,
    pub settings: SearchSettings,
    pub accelerator: Option<&'a dyn SearchAccelerator>,
}

impl SearchContext<'_> {
    /// Runs one search and folds the outcome into a [`RouteResult`]. The
    /// reported cost is geometric; congestion surcharges only steer the
    /// search.
    pub fn search<G: RoutingGrid + ?Sized>(
        &self,
        solver: &mut AStar,
        grid: &G,
        net: &PreparedNet,
        allow_sharing: bool,
        present_factor: f64,
    ) -> RouteResult {
        let query = net.query(allow_sharing, present_factor);
        let outcome = solver.find_path(
            grid,
            &self.model,
            &query,
            &self.settings.limits(),
            self.accelerator,
        );
        match outcome.status {
            SearchStatus::Found => {
                let cost = self.model.path_cost(&outcome.path);
                RouteResult::routed(net.net, outcome.path, cost, outcome.nodes_explored)
            }
            SearchStatus::Exhausted(ExhaustReason::FrontierEmpty) => {
                RouteResult::failed(net.net, RouteFailure::NoPathFound, outcome.nodes_explored)
            }
            SearchStatus::Exhausted(reason) => {
                log::debug!(
                    "Net {} stopped after {} nodes: {:?}",
                    net.net,
                    outcome.nodes_explored,
                    reason
                );
                RouteResult::failed(net.net, RouteFailure::BudgetExceeded, outcome.nodes_explored)
            }
        }
    }
}

/// Search effort spent by one routing call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchEffort {
    pub searches: usize,
    pub nodes_explored: u64,
}

impl SearchEffort {
    pub fn record(&mut self, result: &RouteResult) {
        self.searches += 1;
        self.nodes_explored += result.nodes_explored as u64;
    }
}
