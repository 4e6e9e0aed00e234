/// A cell address in the routing grid: `x` is the column, `y` the row and
/// `z` the layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl GridCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn on_layer(self, z: u8) -> Self {
        Self { z, ..self }
    }

    #[inline(always)]
    pub fn same_column(&self, other: &GridCoord) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Per-axis planar distance, ignoring layers.
    #[inline(always)]
    pub fn planar_step(&self, other: &GridCoord) -> (u32, u32) {
        (self.x.abs_diff(other.x), self.y.abs_diff(other.y))
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, L{})", self.x, self.y, self.z)
    }
}
