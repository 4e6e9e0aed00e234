use crate::algo::astar::AStar;
use crate::batch::BatchScheduler;
use crate::grid::RoutingGrid;
use crate::net::{PreparedNet, SearchContext, SearchEffort};
use pcb_common::db::indices::NetId;
use pcb_common::db::request::{RouteFailure, RouteResult};
use pcb_common::geom::coord::GridCoord;
use pcb_common::util::config::NegotiationConfig;
use pcb_common::util::profiler::ScopedTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationStatus {
    /// The last pass committed without any shared cell.
    Converged { passes: usize },
    /// `max_iterations` passes ran and cells are still shared.
    BudgetExhausted { passes: usize },
}

impl NegotiationStatus {
    pub fn passes(&self) -> usize {
        match *self {
            NegotiationStatus::Converged { passes }
            | NegotiationStatus::BudgetExhausted { passes } => passes,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, NegotiationStatus::Converged { .. })
    }
}

/// A cell claimed by more than one net in the final pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub coord: GridCoord,
    pub nets: Vec<NetId>,
}

#[derive(Clone, Debug)]
pub struct NegotiationOutcome {
    pub status: NegotiationStatus,
    /// Aligned with the `nets` slice handed to [`NegotiationOrchestrator::run`].
    pub results: Vec<RouteResult>,
    pub conflicts: Vec<Conflict>,
    /// Conflict count after each pass.
    pub history: Vec<usize>,
    pub effort: SearchEffort,
}

enum PassState {
    Pass(usize),
    Converged(usize),
    BudgetExhausted(usize),
}

/// PathFinder-style negotiated congestion routing.
///
/// Pass 0 routes every net with sharing allowed. Each later pass releases the
/// nets that ended up on a shared cell (plus the ones that failed) and
/// reroutes them under a higher present-congestion factor, until no cell is
/// shared or the pass budget runs out.
pub struct NegotiationOrchestrator<'a> {
    ctx: SearchContext<'a>,
    config: &'a NegotiationConfig,
    scheduler: BatchScheduler,
}

impl<'a> NegotiationOrchestrator<'a> {
    pub fn new(ctx: SearchContext<'a>, config: &'a NegotiationConfig, scheduler: BatchScheduler) -> Self {
        Self {
            ctx,
            config,
            scheduler,
        }
    }

    /// Nets must already be in routing order and carry distinct ids.
    pub fn run<G: RoutingGrid>(&self, grid: &mut G, nets: &[PreparedNet]) -> NegotiationOutcome {
        let _timer = ScopedTimer::new("Negotiated routing");
        let max_passes = self.config.max_iterations.max(1);
        let position: HashMap<NetId, usize> = nets.iter().enumerate().map(|(i, n)| (n.net, i)).collect();
        let mut rng = self.config.shuffle_seed.map(StdRng::seed_from_u64);

        let mut results: Vec<RouteResult> = nets
            .iter()
            .map(|n| RouteResult::failed(n.net, RouteFailure::NoPathFound, 0))
            .collect();
        let mut effort = SearchEffort::default();
        let mut history = Vec::new();
        let mut shared: BTreeMap<GridCoord, BTreeSet<NetId>> = BTreeMap::new();
        let mut reroute: Vec<usize> = (0..nets.len()).collect();
        let mut state = PassState::Pass(0);

        let status = loop {
            let pass = match state {
                PassState::Pass(pass) => pass,
                PassState::Converged(passes) => break NegotiationStatus::Converged { passes },
                PassState::BudgetExhausted(passes) => {
                    break NegotiationStatus::BudgetExhausted { passes };
                }
            };
            let start = Instant::now();
            let factor = self.config.schedule.factor(pass);

            if pass > 0 {
                for &i in &reroute {
                    grid.release_net(nets[i].net);
                }
                if let Some(rng) = rng.as_mut() {
                    reroute.shuffle(rng);
                }
            }

            shared.clear();
            self.route_pass(grid, nets, &reroute, factor, &mut results, &mut shared, &mut effort);

            let conflicts = shared.len();
            history.push(conflicts);
            log::info!(
                "Pass {}: Conflicts: {}, Rerouted: {}, Penalty: {:.2}, Time: {}ms",
                pass,
                conflicts,
                reroute.len(),
                factor,
                start.elapsed().as_millis()
            );

            state = if conflicts == 0 {
                PassState::Converged(pass + 1)
            } else if pass + 1 >= max_passes {
                PassState::BudgetExhausted(pass + 1)
            } else {
                let mut next: BTreeSet<usize> = shared
                    .values()
                    .flatten()
                    .filter_map(|net| position.get(net).copied())
                    .collect();
                next.extend((0..nets.len()).filter(|&i| !results[i].success));
                reroute = next.into_iter().collect();
                PassState::Pass(pass + 1)
            };
        };

        if !status.is_converged() {
            log::warn!(
                "Negotiation stopped after {} passes with {} shared cells",
                status.passes(),
                shared.len()
            );
        }
        let conflicts = shared
            .into_iter()
            .map(|(coord, nets)| Conflict {
                coord,
                nets: nets.into_iter().collect(),
            })
            .collect();

        NegotiationOutcome {
            status,
            results,
            conflicts,
            history,
            effort,
        }
    }

    /// Searches `reroute` group by group. Each group fans out across the
    /// thread pool against a frozen grid; commits happen afterwards on this
    /// thread.
    #[allow(clippy::too_many_arguments)]
    fn route_pass<G: RoutingGrid>(
        &self,
        grid: &mut G,
        nets: &[PreparedNet],
        reroute: &[usize],
        factor: f64,
        results: &mut [RouteResult],
        shared: &mut BTreeMap<GridCoord, BTreeSet<NetId>>,
        effort: &mut SearchEffort,
    ) {
        let boxes: Vec<_> = reroute.iter().map(|&i| nets[i].bbox).collect();
        let groups = self.scheduler.partition(&boxes);
        let ctx = &self.ctx;

        for group in groups {
            let frozen: &G = grid;
            let found: Vec<(usize, RouteResult)> = group
                .par_iter()
                .map_with(AStar::new(), |solver, &slot| {
                    let i = reroute[slot];
                    (i, ctx.search(solver, frozen, &nets[i], true, factor))
                })
                .collect();

            for (i, result) in found {
                effort.record(&result);
                if result.success {
                    for (coord, other) in grid.commit_path(nets[i].net, &result.path) {
                        let owners = shared.entry(coord).or_default();
                        owners.insert(other);
                        owners.insert(nets[i].net);
                    }
                }
                results[i] = result;
            }
        }
    }
}
