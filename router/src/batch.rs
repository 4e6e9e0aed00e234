use crate::algo::astar::AStar;
use crate::grid::RoutingGrid;
use crate::net::{PreparedNet, SearchContext, SearchEffort};
use pcb_common::db::indices::NetId;
use pcb_common::db::request::{RouteFailure, RouteResult};
use pcb_common::geom::coord::GridCoord;
use pcb_common::geom::point::Point;
use pcb_common::geom::rect::Rect;
use pcb_common::geom::rtree::SpatialIndex;
use rayon::prelude::*;

/// Splits nets into rounds of mutually non-overlapping bounding boxes.
///
/// Nets in one group may be searched concurrently; groups run one after the
/// other. The grouping depends only on input order and the boxes.
#[derive(Clone, Copy, Debug)]
pub struct BatchScheduler {
    max_group_size: usize,
}

impl BatchScheduler {
    pub fn new(max_group_size: usize) -> Self {
        Self {
            max_group_size: max_group_size.max(1),
        }
    }

    pub fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    /// Cell-aligned box covering every endpoint cell, grown by `inflate` cells
    /// on each side. Boxes are half-open so adjacent cells do not overlap.
    pub fn bounding_box(cells: &[GridCoord], inflate: u32) -> Rect {
        let mut min_x = u32::MAX;
        let mut max_x = 0;
        let mut min_y = u32::MAX;
        let mut max_y = 0;
        for c in cells {
            min_x = min_x.min(c.x);
            max_x = max_x.max(c.x);
            min_y = min_y.min(c.y);
            max_y = max_y.max(c.y);
        }
        if cells.is_empty() {
            return Rect::default();
        }
        Rect::new(
            Point::new(min_x as f64, min_y as f64),
            Point::new(max_x as f64 + 1.0, max_y as f64 + 1.0),
        )
        .inflate(inflate as f64)
    }

    /// First-fit colouring of the overlap graph. Returns groups of indices
    /// into `boxes`, each group in ascending index order.
    pub fn partition(&self, boxes: &[Rect]) -> Vec<Vec<usize>> {
        let index = SpatialIndex::bulk_load(boxes);
        let mut color_of: Vec<usize> = Vec::with_capacity(boxes.len());
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut forbidden: Vec<bool> = Vec::new();

        for (i, rect) in boxes.iter().enumerate() {
            forbidden.clear();
            forbidden.resize(groups.len(), false);
            for j in index.query(*rect) {
                if j < i {
                    forbidden[color_of[j]] = true;
                }
            }

            let color = (0..groups.len())
                .find(|&c| !forbidden[c] && groups[c].len() < self.max_group_size)
                .unwrap_or(groups.len());
            if color == groups.len() {
                groups.push(Vec::new());
            }
            groups[color].push(i);
            color_of.push(color);
        }

        log::debug!(
            "Partitioned {} nets into {} groups (max size {})",
            boxes.len(),
            groups.len(),
            self.max_group_size
        );
        groups
    }

    /// Routes every net once without sharing. Each group is searched in
    /// parallel against the grid as it stood before the group; a net whose
    /// path now collides with a sibling's commit is searched again on its own
    /// once the group is done.
    pub fn route<G: RoutingGrid>(
        &self,
        ctx: &SearchContext<'_>,
        grid: &mut G,
        nets: &[PreparedNet],
    ) -> (Vec<RouteResult>, SearchEffort) {
        let boxes: Vec<Rect> = nets.iter().map(|n| n.bbox).collect();
        let mut results: Vec<RouteResult> = nets
            .iter()
            .map(|n| RouteResult::failed(n.net, RouteFailure::NoPathFound, 0))
            .collect();
        let mut effort = SearchEffort::default();
        let mut solver = AStar::new();

        for group in self.partition(&boxes) {
            let frozen: &G = grid;
            let found: Vec<(usize, RouteResult)> = group
                .par_iter()
                .map_with(AStar::new(), |solver, &i| {
                    (i, ctx.search(solver, frozen, &nets[i], false, 0.0))
                })
                .collect();

            let mut retry = Vec::new();
            for (i, result) in found {
                effort.record(&result);
                if result.success && collides(grid, nets[i].net, &result.path) {
                    retry.push(i);
                    continue;
                }
                if result.success {
                    grid.commit_path(nets[i].net, &result.path);
                }
                results[i] = result;
            }

            if !retry.is_empty() {
                log::debug!("Retrying {} nets sequentially after group collisions", retry.len());
            }
            for i in retry {
                let result = ctx.search(&mut solver, &*grid, &nets[i], false, 0.0);
                effort.record(&result);
                if result.success {
                    grid.commit_path(nets[i].net, &result.path);
                }
                results[i] = result;
            }
        }

        (results, effort)
    }
}

/// True if committing `path` for `net` would land on a cell another net owns.
fn collides<G: RoutingGrid>(grid: &G, net: NetId, path: &[GridCoord]) -> bool {
    let taken = |c: GridCoord| grid.is_blocked(c, net, false);
    if path.iter().any(|&c| taken(c)) {
        return true;
    }
    path.windows(2).any(|step| {
        step[0].z != step[1].z && (0..grid.layers()).any(|z| taken(step[0].on_layer(z)))
    })
}
