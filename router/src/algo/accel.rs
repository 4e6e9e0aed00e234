use crate::cost::CostModel;
use pcb_common::geom::coord::GridCoord;
use rayon::prelude::*;

/// Heuristic evaluations requested for one expansion.
pub struct HeuristicBatch<'a> {
    pub cells: &'a [GridCoord],
    pub goal_x: u32,
    pub goal_y: u32,
    pub goal_layers: &'a [u8],
}

/// Optional offload point for batched heuristic evaluation (GPU or similar).
///
/// Implementations fill `out` with one value per cell, in order, and return
/// `true`. Returning `false`, a wrong length, or a value that is negative or
/// NaN makes the search fall back to [`CostModel::heuristic`] for that batch.
pub trait SearchAccelerator: Send + Sync {
    /// Batches smaller than this are evaluated on the calling thread.
    fn min_batch(&self) -> usize {
        1
    }

    fn heuristics(&self, model: &CostModel, batch: &HeuristicBatch<'_>, out: &mut Vec<f64>)
    -> bool;
}

/// Reference backend: evaluates the batch on the rayon pool.
#[derive(Clone, Copy, Debug)]
pub struct ParallelHeuristic {
    pub min_batch: usize,
}

impl Default for ParallelHeuristic {
    fn default() -> Self {
        Self { min_batch: 64 }
    }
}

impl SearchAccelerator for ParallelHeuristic {
    fn min_batch(&self) -> usize {
        self.min_batch
    }

    fn heuristics(
        &self,
        model: &CostModel,
        batch: &HeuristicBatch<'_>,
        out: &mut Vec<f64>,
    ) -> bool {
        out.clear();
        out.par_extend(batch.cells.par_iter().map(|&c| {
            model.heuristic(c, batch.goal_x, batch.goal_y, batch.goal_layers)
        }));
        true
    }
}

/// Runs `accel` on `batch`, falling back to the scalar path when it declines
/// or returns something unusable.
pub(crate) fn evaluate(
    accel: Option<&dyn SearchAccelerator>,
    model: &CostModel,
    batch: &HeuristicBatch<'_>,
    out: &mut Vec<f64>,
) {
    if let Some(accel) = accel {
        if batch.cells.len() >= accel.min_batch()
            && accel.heuristics(model, batch, out)
            && out.len() == batch.cells.len()
            && out.iter().all(|h| *h >= 0.0)
        {
            return;
        }
    }
    out.clear();
    out.extend(
        batch
            .cells
            .iter()
            .map(|&c| model.heuristic(c, batch.goal_x, batch.goal_y, batch.goal_layers)),
    );
}
