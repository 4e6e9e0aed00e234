use crate::grid::RoutingGrid;
use pcb_common::db::indices::NetId;
use pcb_common::db::rules::DesignRules;
use pcb_common::geom::coord::GridCoord;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveKind {
    Straight,
    Diagonal,
}

/// Cost functions for one routing run. Immutable once built.
#[derive(Clone, Copy, Debug)]
pub struct CostModel {
    unit: f64,
    via: f64,
    diagonal: bool,
}

impl CostModel {
    pub fn new(rules: &DesignRules, allow_diagonal: bool) -> Self {
        Self {
            unit: rules.cost_straight * rules.grid_resolution,
            via: rules.cost_via,
            diagonal: allow_diagonal,
        }
    }

    pub fn allows_diagonal(&self) -> bool {
        self.diagonal
    }

    #[inline(always)]
    pub fn move_cost(&self, kind: MoveKind) -> f64 {
        match kind {
            MoveKind::Straight => self.unit,
            MoveKind::Diagonal => self.unit * std::f64::consts::SQRT_2,
        }
    }

    #[inline(always)]
    pub fn via_cost(&self) -> f64 {
        self.via
    }

    /// Congestion surcharge for entering `coord` on behalf of `net`.
    ///
    /// Grows with the cell's usage history and with `present_factor`, plus one
    /// extra unit while another net currently owns the cell. Zero when the
    /// factor is not positive.
    #[inline(always)]
    pub fn negotiated_penalty<G: RoutingGrid + ?Sized>(
        &self,
        grid: &G,
        coord: GridCoord,
        net: NetId,
        present_factor: f64,
    ) -> f64 {
        if present_factor <= 0.0 {
            return 0.0;
        }
        let owner = grid.owner(coord);
        let present = if !owner.is_free() && owner != net {
            1.0
        } else {
            0.0
        };
        present_factor * (grid.usage(coord) as f64 + present)
    }

    /// Lower bound of the remaining cost from `from` to the goal column
    /// `(goal_x, goal_y)` reachable on `goal_layers`.
    #[inline(always)]
    pub fn heuristic(&self, from: GridCoord, goal_x: u32, goal_y: u32, goal_layers: &[u8]) -> f64 {
        let dx = from.x.abs_diff(goal_x) as f64;
        let dy = from.y.abs_diff(goal_y) as f64;
        let planar = if self.diagonal {
            dx.min(dy) * std::f64::consts::SQRT_2 + (dx - dy).abs()
        } else {
            dx + dy
        };
        let layer_change = if goal_layers.contains(&from.z) {
            0.0
        } else {
            self.via
        };
        planar * self.unit + layer_change
    }

    /// Geometric cost of a finished path, without congestion surcharges.
    pub fn path_cost(&self, path: &[GridCoord]) -> f64 {
        path.windows(2)
            .map(|w| {
                let (a, b) = (w[0], w[1]);
                if a.z != b.z {
                    self.via
                } else {
                    match a.planar_step(&b) {
                        (0, 0) => 0.0,
                        (1, 1) => self.move_cost(MoveKind::Diagonal),
                        _ => self.move_cost(MoveKind::Straight),
                    }
                }
            })
            .sum()
    }
}
