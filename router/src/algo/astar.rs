use crate::algo::accel::{self, HeuristicBatch, SearchAccelerator};
use crate::cost::{CostModel, MoveKind};
use crate::grid::RoutingGrid;
use pcb_common::db::indices::NetId;
use pcb_common::geom::coord::GridCoord;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::time::Instant;

const ORTHOGONAL: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
const DIAGONAL: [(i32, i32); 4] = [(1, 1), (-1, 1), (-1, -1), (1, -1)];

/// Arena node. `parent_index` is -1 for seeds.
#[derive(Clone, Copy, Debug)]
pub struct SearchNode {
    pub coord: GridCoord,
    pub g_score: f64,
    pub f_score: f64,
    pub parent_index: i32,
    closed: bool,
}

/// Frontier priority: lowest `f_score` first, then earliest insertion.
#[derive(Clone, Copy, Debug, PartialEq)]
struct OpenKey {
    f_score: f64,
    seq: u64,
}

impl Eq for OpenKey {}

impl Ord for OpenKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Goal {
    pub x: u32,
    pub y: u32,
    pub layers: Vec<u8>,
}

impl Goal {
    #[inline(always)]
    pub fn is_reached(&self, c: GridCoord) -> bool {
        c.x == self.x && c.y == self.y && self.layers.contains(&c.z)
    }
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub net: NetId,
    /// One seed per valid start layer.
    pub sources: Vec<GridCoord>,
    pub goal: Goal,
    pub allow_sharing: bool,
    pub present_factor: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct SearchLimits {
    pub arena_capacity: usize,
    pub node_budget: Option<u32>,
    pub deadline: Option<Instant>,
}

impl SearchLimits {
    pub fn with_capacity(arena_capacity: usize) -> Self {
        Self {
            arena_capacity,
            node_budget: None,
            deadline: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExhaustReason {
    FrontierEmpty,
    ArenaFull,
    NodeBudget,
    Deadline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStatus {
    Found,
    Exhausted(ExhaustReason),
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub path: Vec<GridCoord>,
    /// Search cost of `path`, congestion surcharges included.
    pub g_score: f64,
    pub nodes_explored: u32,
}

impl SearchOutcome {
    fn exhausted(reason: ExhaustReason, nodes_explored: u32) -> Self {
        Self {
            status: SearchStatus::Exhausted(reason),
            path: Vec::new(),
            g_score: f64::INFINITY,
            nodes_explored,
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == SearchStatus::Found
    }
}

/// Best-first search over a [`RoutingGrid`].
///
/// The arena and the cell lookup table are reused between calls; a tag bump
/// invalidates the lookup without clearing it, so one solver per worker
/// thread is enough.
#[derive(Clone)]
pub struct AStar {
    arena: Vec<SearchNode>,
    slot: Vec<u32>,
    slot_tag: Vec<u32>,
    current_tag: u32,
    open: PriorityQueue<u32, OpenKey>,
    seq: u64,
    pending: Vec<(GridCoord, f64)>,
    pending_cells: Vec<GridCoord>,
    heuristics: Vec<f64>,
}

impl Default for AStar {
    fn default() -> Self {
        Self::new()
    }
}

impl AStar {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            slot: Vec::new(),
            slot_tag: Vec::new(),
            current_tag: 1,
            open: PriorityQueue::new(),
            seq: 0,
            pending: Vec::with_capacity(16),
            pending_cells: Vec::with_capacity(16),
            heuristics: Vec::with_capacity(16),
        }
    }

    fn ensure_capacity(&mut self, size: usize) {
        if size > self.slot.len() {
            self.slot.resize(size, u32::MAX);
            self.slot_tag.resize(size, 0);
        }
    }

    fn reset(&mut self) {
        self.current_tag = self.current_tag.wrapping_add(1);
        if self.current_tag == 0 {
            self.slot_tag.fill(0);
            self.current_tag = 1;
        }
        self.arena.clear();
        self.open.clear();
        self.seq = 0;
    }

    fn push_open(&mut self, node: u32, f_score: f64) {
        self.seq += 1;
        self.open.push(
            node,
            OpenKey {
                f_score,
                seq: self.seq,
            },
        );
    }

    pub fn find_path<G: RoutingGrid + ?Sized>(
        &mut self,
        grid: &G,
        model: &CostModel,
        query: &SearchQuery,
        limits: &SearchLimits,
        accelerator: Option<&dyn SearchAccelerator>,
    ) -> SearchOutcome {
        let open_source =
            |s: GridCoord| grid.in_bounds(s) && !grid.is_blocked(s, query.net, query.allow_sharing);
        if let Some(&start) = query
            .sources
            .iter()
            .find(|&&s| open_source(s) && query.goal.is_reached(s))
        {
            return SearchOutcome {
                status: SearchStatus::Found,
                path: vec![start],
                g_score: 0.0,
                nodes_explored: 0,
            };
        }

        self.ensure_capacity(grid.cell_count());
        self.reset();

        let goal = &query.goal;
        for &start in &query.sources {
            if !open_source(start) {
                continue;
            }
            let key = grid.index_of(start);
            if self.slot_tag[key] == self.current_tag {
                continue;
            }
            if self.arena.len() >= limits.arena_capacity {
                return SearchOutcome::exhausted(ExhaustReason::ArenaFull, 0);
            }
            let h = model.heuristic(start, goal.x, goal.y, &goal.layers);
            let idx = self.arena.len() as u32;
            self.arena.push(SearchNode {
                coord: start,
                g_score: 0.0,
                f_score: h,
                parent_index: -1,
                closed: false,
            });
            self.slot[key] = idx;
            self.slot_tag[key] = self.current_tag;
            self.push_open(idx, h);
        }

        let mut explored: u32 = 0;

        while let Some((idx, _)) = self.open.pop() {
            let current = self.arena[idx as usize];
            if current.closed {
                continue;
            }
            self.arena[idx as usize].closed = true;
            explored += 1;

            if goal.is_reached(current.coord) {
                return SearchOutcome {
                    status: SearchStatus::Found,
                    path: self.reconstruct_path(idx),
                    g_score: current.g_score,
                    nodes_explored: explored,
                };
            }

            if limits.node_budget.is_some_and(|budget| explored >= budget) {
                return SearchOutcome::exhausted(ExhaustReason::NodeBudget, explored);
            }
            if limits.deadline.is_some_and(|d| Instant::now() >= d) {
                return SearchOutcome::exhausted(ExhaustReason::Deadline, explored);
            }

            self.collect_neighbors(grid, model, query, current.coord);
            if self.pending.is_empty() {
                continue;
            }

            self.pending_cells.clear();
            self.pending_cells.extend(self.pending.iter().map(|p| p.0));
            let batch = HeuristicBatch {
                cells: &self.pending_cells,
                goal_x: goal.x,
                goal_y: goal.y,
                goal_layers: &goal.layers,
            };
            accel::evaluate(accelerator, model, &batch, &mut self.heuristics);

            for i in 0..self.pending.len() {
                let (neighbor, step_cost) = self.pending[i];
                let h = self.heuristics[i];
                let tentative_g = current.g_score + step_cost;
                let key = grid.index_of(neighbor);

                if self.slot_tag[key] == self.current_tag {
                    let n_idx = self.slot[key];
                    let node = &mut self.arena[n_idx as usize];
                    if tentative_g >= node.g_score {
                        continue;
                    }
                    node.g_score = tentative_g;
                    node.f_score = tentative_g + h;
                    node.parent_index = idx as i32;
                    node.closed = false;
                    let f = node.f_score;
                    self.push_open(n_idx, f);
                } else {
                    if self.arena.len() >= limits.arena_capacity {
                        return SearchOutcome::exhausted(ExhaustReason::ArenaFull, explored);
                    }
                    let n_idx = self.arena.len() as u32;
                    self.arena.push(SearchNode {
                        coord: neighbor,
                        g_score: tentative_g,
                        f_score: tentative_g + h,
                        parent_index: idx as i32,
                        closed: false,
                    });
                    self.slot[key] = n_idx;
                    self.slot_tag[key] = self.current_tag;
                    self.push_open(n_idx, tentative_g + h);
                }
            }
        }

        SearchOutcome::exhausted(ExhaustReason::FrontierEmpty, explored)
    }

    /// Fills `pending` with every legal step out of `pos` and its cost.
    fn collect_neighbors<G: RoutingGrid + ?Sized>(
        &mut self,
        grid: &G,
        model: &CostModel,
        query: &SearchQuery,
        pos: GridCoord,
    ) {
        self.pending.clear();
        let net = query.net;
        let sharing = query.allow_sharing;
        let passable = |c: GridCoord| !grid.is_blocked(c, net, sharing);
        let step = |base: f64, c: GridCoord| {
            base * (1.0 + model.negotiated_penalty(grid, c, net, query.present_factor))
        };

        let diagonals: &[(i32, i32)] = if model.allows_diagonal() {
            &DIAGONAL
        } else {
            &[]
        };
        for &(dx, dy) in ORTHOGONAL.iter().chain(diagonals) {
            let Some(n) = offset(grid, pos, dx, dy) else {
                continue;
            };
            if !passable(n) {
                continue;
            }
            let kind = if dx != 0 && dy != 0 {
                // no cutting past an obstacle corner
                let corner_a = GridCoord::new(n.x, pos.y, pos.z);
                let corner_b = GridCoord::new(pos.x, n.y, pos.z);
                if grid.is_obstacle(corner_a) || grid.is_obstacle(corner_b) {
                    continue;
                }
                MoveKind::Diagonal
            } else {
                MoveKind::Straight
            };
            self.pending.push((n, step(model.move_cost(kind), n)));
        }

        let routable = grid.routable_layers();
        if routable.len() > 1 && grid.can_place_via(pos.x, pos.y, net, sharing) {
            let straight = model.move_cost(MoveKind::Straight);
            for &layer in routable {
                if layer == pos.z {
                    continue;
                }
                let n = pos.on_layer(layer);
                let penalty = model.negotiated_penalty(grid, n, net, query.present_factor);
                self.pending.push((n, model.via_cost() + straight * penalty));
            }
        }
    }

    fn reconstruct_path(&self, end: u32) -> Vec<GridCoord> {
        let mut path = Vec::new();
        let mut curr = end as i32;
        while curr >= 0 {
            let node = &self.arena[curr as usize];
            path.push(node.coord);
            curr = node.parent_index;
        }
        path.reverse();
        path
    }
}

#[inline(always)]
fn offset<G: RoutingGrid + ?Sized>(grid: &G, c: GridCoord, dx: i32, dy: i32) -> Option<GridCoord> {
    let x = c.x as i64 + dx as i64;
    let y = c.y as i64 + dy as i64;
    if x < 0 || y < 0 || x >= grid.cols() as i64 || y >= grid.rows() as i64 {
        return None;
    }
    Some(GridCoord::new(x as u32, y as u32, c.z))
}
