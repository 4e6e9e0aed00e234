use super::RoutingGrid;
use pcb_common::db::indices::NetId;
use pcb_common::geom::coord::GridCoord;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub owner_net: NetId,
    /// Number of committed paths that have touched this cell, across passes.
    pub usage_count: u32,
    pub is_obstacle: bool,
    /// Pad copper; owned by its net for the whole run.
    pub reserved: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            owner_net: NetId::FREE,
            usage_count: 0,
            is_obstacle: false,
            reserved: false,
        }
    }
}

impl Cell {
    #[inline(always)]
    pub fn is_blocked_for(&self, net: NetId, allow_sharing: bool) -> bool {
        if self.is_obstacle {
            return true;
        }
        if self.owner_net == net {
            return false;
        }
        if self.reserved {
            return true;
        }
        if allow_sharing && self.usage_count > 0 {
            return false;
        }
        !self.owner_net.is_free()
    }
}

pub struct DenseGrid {
    cols: u32,
    rows: u32,
    layers: u8,
    routable: Vec<u8>,
    cells: Vec<Cell>,
    claims: HashMap<NetId, Vec<usize>>,
}

impl DenseGrid {
    pub fn new(cols: u32, rows: u32, layers: u8) -> Self {
        Self::with_routable_layers(cols, rows, layers, (0..layers).collect())
    }

    /// Grid whose searches only run on `routable`; the other layers still take
    /// part in via checks.
    pub fn with_routable_layers(cols: u32, rows: u32, layers: u8, routable: Vec<u8>) -> Self {
        let size = (cols as usize) * (rows as usize) * (layers as usize);

        if size > 200_000_000 {
            log::warn!(
                "Allocating large DenseGrid: {} cells. Ensure sufficient RAM.",
                size
            );
        }

        let mut routable: Vec<u8> = routable.into_iter().filter(|&l| l < layers).collect();
        routable.sort_unstable();
        routable.dedup();

        Self {
            cols,
            rows,
            layers,
            routable,
            cells: vec![Cell::default(); size],
            claims: HashMap::new(),
        }
    }

    #[inline(always)]
    fn index(&self, coord: GridCoord) -> usize {
        (coord.z as usize) * (self.cols as usize) * (self.rows as usize)
            + (coord.y as usize) * (self.cols as usize)
            + (coord.x as usize)
    }

    #[inline(always)]
    fn coord_at(&self, idx: usize) -> GridCoord {
        let plane = (self.cols as usize) * (self.rows as usize);
        let z = idx / plane;
        let rem = idx % plane;
        GridCoord::new(
            (rem % self.cols as usize) as u32,
            (rem / self.cols as usize) as u32,
            z as u8,
        )
    }

    pub fn cell(&self, coord: GridCoord) -> &Cell {
        &self.cells[self.index(coord)]
    }

    pub fn obstacles(&self) -> Vec<GridCoord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_obstacle)
            .map(|(i, _)| self.coord_at(i))
            .collect()
    }

    /// Cells currently owned by `net` through committed paths.
    pub fn claimed_cells(&self, net: NetId) -> Vec<GridCoord> {
        self.claims
            .get(&net)
            .map(|idxs| idxs.iter().map(|&i| self.coord_at(i)).collect())
            .unwrap_or_default()
    }

    /// Cells a path occupies: its own cells plus the full via column at every
    /// layer change.
    fn footprint(&self, path: &[GridCoord]) -> Vec<usize> {
        let mut idxs: Vec<usize> = path.iter().map(|&c| self.index(c)).collect();
        for step in path.windows(2) {
            if step[0].z != step[1].z && step[0].same_column(&step[1]) {
                for z in 0..self.layers {
                    idxs.push(self.index(step[0].on_layer(z)));
                }
            }
        }
        idxs.sort_unstable();
        idxs.dedup();
        idxs
    }
}

impl RoutingGrid for DenseGrid {
    fn cols(&self) -> u32 {
        self.cols
    }
    fn rows(&self) -> u32 {
        self.rows
    }
    fn layers(&self) -> u8 {
        self.layers
    }
    fn routable_layers(&self) -> &[u8] {
        &self.routable
    }

    #[inline(always)]
    fn index_of(&self, coord: GridCoord) -> usize {
        self.index(coord)
    }

    fn set_obstacle(&mut self, coord: GridCoord) {
        if !self.in_bounds(coord) {
            return;
        }
        let idx = self.index(coord);
        let cell = &mut self.cells[idx];
        cell.is_obstacle = true;
        cell.owner_net = NetId::FREE;
        cell.reserved = false;
    }

    fn is_obstacle(&self, coord: GridCoord) -> bool {
        if !self.in_bounds(coord) {
            return true;
        }
        self.cells[self.index(coord)].is_obstacle
    }

    fn owner(&self, coord: GridCoord) -> NetId {
        self.cells[self.index(coord)].owner_net
    }

    fn usage(&self, coord: GridCoord) -> u32 {
        self.cells[self.index(coord)].usage_count
    }

    fn reserve(&mut self, coord: GridCoord, net: NetId) -> Option<NetId> {
        let idx = self.index(coord);
        let cell = &mut self.cells[idx];
        if cell.is_obstacle {
            return None;
        }
        if cell.owner_net.is_free() || cell.owner_net == net {
            cell.owner_net = net;
            cell.reserved = true;
            return None;
        }
        Some(cell.owner_net)
    }

    #[inline(always)]
    fn is_blocked(&self, coord: GridCoord, net: NetId, allow_sharing: bool) -> bool {
        if !self.in_bounds(coord) {
            return true;
        }
        self.cells[self.index(coord)].is_blocked_for(net, allow_sharing)
    }

    fn can_place_via(&self, x: u32, y: u32, net: NetId, allow_sharing: bool) -> bool {
        (0..self.layers).all(|z| !self.is_blocked(GridCoord::new(x, y, z), net, allow_sharing))
    }

    fn commit_path(&mut self, net: NetId, path: &[GridCoord]) -> Vec<(GridCoord, NetId)> {
        let mut collisions = Vec::new();
        for idx in self.footprint(path) {
            let cell = &mut self.cells[idx];
            if cell.is_obstacle {
                continue;
            }
            cell.usage_count = cell.usage_count.saturating_add(1);
            if cell.owner_net.is_free() {
                cell.owner_net = net;
                self.claims.entry(net).or_default().push(idx);
            } else if cell.owner_net != net {
                let other = cell.owner_net;
                collisions.push((self.coord_at(idx), other));
            }
        }
        collisions
    }

    fn release_net(&mut self, net: NetId) {
        let Some(idxs) = self.claims.remove(&net) else {
            return;
        };
        for idx in idxs {
            let cell = &mut self.cells[idx];
            if cell.owner_net == net && !cell.reserved {
                cell.owner_net = NetId::FREE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: NetId = NetId(1);
    const B: NetId = NetId(2);

    #[test]
    fn ownership_blocks_other_nets_until_shared() {
        let mut grid = DenseGrid::new(4, 4, 1);
        let c = GridCoord::new(1, 1, 0);
        assert!(grid.commit_path(A, &[c]).is_empty());

        assert!(!grid.is_blocked(c, A, false));
        assert!(grid.is_blocked(c, B, false));
        // committed cells have usage > 0 and may be shared during negotiation
        assert!(!grid.is_blocked(c, B, true));
    }

    #[test]
    fn obstacles_are_never_shareable_or_owned() {
        let mut grid = DenseGrid::new(4, 4, 2);
        let c = GridCoord::new(2, 2, 1);
        grid.set_obstacle(c);
        assert!(grid.is_blocked(c, A, true));
        assert_eq!(grid.reserve(c, A), None);
        grid.commit_path(A, &[c]);
        assert_eq!(grid.owner(c), NetId::FREE);
        assert_eq!(grid.usage(c), 0);
        assert!(grid.is_blocked(GridCoord::new(9, 0, 0), A, true));
    }

    #[test]
    fn collisions_keep_first_owner() {
        let mut grid = DenseGrid::new(4, 4, 1);
        let path_a = [GridCoord::new(0, 1, 0), GridCoord::new(1, 1, 0)];
        let path_b = [GridCoord::new(1, 0, 0), GridCoord::new(1, 1, 0)];
        grid.commit_path(A, &path_a);
        let collisions = grid.commit_path(B, &path_b);
        assert_eq!(collisions, vec![(GridCoord::new(1, 1, 0), A)]);
        assert_eq!(grid.owner(GridCoord::new(1, 1, 0)), A);
        assert_eq!(grid.usage(GridCoord::new(1, 1, 0)), 2);
    }

    #[test]
    fn release_frees_claims_but_keeps_pads_and_history() {
        let mut grid = DenseGrid::new(4, 4, 1);
        let pad = GridCoord::new(0, 0, 0);
        assert_eq!(grid.reserve(pad, A), None);
        assert_eq!(grid.reserve(pad, B), Some(A));

        let path = [pad, GridCoord::new(1, 0, 0), GridCoord::new(2, 0, 0)];
        grid.commit_path(A, &path);
        grid.release_net(A);

        assert_eq!(grid.owner(pad), A);
        // pads stay exclusive even after their own net has used them
        assert!(grid.is_blocked(pad, B, true));
        assert_eq!(grid.owner(GridCoord::new(1, 0, 0)), NetId::FREE);
        assert_eq!(grid.usage(GridCoord::new(1, 0, 0)), 1);
        assert!(grid.claimed_cells(A).is_empty());
    }

    #[test]
    fn via_commit_claims_whole_column() {
        let mut grid = DenseGrid::new(3, 3, 3);
        let path = [
            GridCoord::new(1, 1, 0),
            GridCoord::new(1, 1, 2),
            GridCoord::new(2, 1, 2),
        ];
        grid.commit_path(A, &path);
        for z in 0..3 {
            assert_eq!(grid.owner(GridCoord::new(1, 1, z)), A);
        }
        assert!(!grid.can_place_via(1, 1, B, false));
        assert!(grid.can_place_via(1, 1, B, true));
        assert!(grid.can_place_via(1, 1, A, false));
    }

    #[test]
    fn via_blocked_by_obstacle_on_any_layer() {
        let mut grid = DenseGrid::with_routable_layers(3, 3, 3, vec![0, 2]);
        assert_eq!(grid.routable_layers(), &[0, 2]);
        grid.set_obstacle(GridCoord::new(0, 0, 1));
        assert!(!grid.can_place_via(0, 0, A, true));
        assert!(grid.can_place_via(1, 0, A, false));
    }
}
