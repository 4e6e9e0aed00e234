pub mod dense;

pub use dense::DenseGrid;

use pcb_common::db::indices::NetId;
use pcb_common::geom::coord::GridCoord;

/// Occupancy model shared by every search and the negotiation loop.
///
/// Searches only take `&self`; ownership changes go through `&mut self` on
/// the orchestrator's thread between search phases.
pub trait RoutingGrid: Sync + Send {
    fn cols(&self) -> u32;
    fn rows(&self) -> u32;
    fn layers(&self) -> u8;
    fn routable_layers(&self) -> &[u8];

    fn cell_count(&self) -> usize {
        self.cols() as usize * self.rows() as usize * self.layers() as usize
    }
    /// Dense index of an in-bounds coordinate.
    fn index_of(&self, coord: GridCoord) -> usize;
    fn in_bounds(&self, coord: GridCoord) -> bool {
        coord.x < self.cols() && coord.y < self.rows() && coord.z < self.layers()
    }

    fn set_obstacle(&mut self, coord: GridCoord);
    fn is_obstacle(&self, coord: GridCoord) -> bool;
    fn owner(&self, coord: GridCoord) -> NetId;
    fn usage(&self, coord: GridCoord) -> u32;

    /// Claims a pad cell for `net`. Reserved cells survive `release_net`.
    /// Returns the previous owner if another net already holds the cell.
    fn reserve(&mut self, coord: GridCoord, net: NetId) -> Option<NetId>;

    fn is_blocked(&self, coord: GridCoord, net: NetId, allow_sharing: bool) -> bool;
    fn can_place_via(&self, x: u32, y: u32, net: NetId, allow_sharing: bool) -> bool;

    /// Writes `path` into the grid for `net` and bumps usage on every cell
    /// touched. Cells already owned by another net keep their owner and are
    /// reported back as collisions.
    fn commit_path(&mut self, net: NetId, path: &[GridCoord]) -> Vec<(GridCoord, NetId)>;
    /// Clears every non-reserved cell owned by `net`.
    fn release_net(&mut self, net: NetId);
}
