use crate::error::{Result, RouteError};
use pcb_common::geom::point::Point;
use pcb_common::geom::rect::Rect;

/// Maps world coordinates onto cell centres spaced `resolution` apart,
/// starting at the board origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConverter {
    resolution: f64,
    offset_x: f64,
    offset_y: f64,
    grid_w: u32,
    grid_h: u32,
}

impl GridConverter {
    pub fn new(origin: Point<f64>, resolution: f64, grid_w: u32, grid_h: u32) -> Self {
        Self {
            resolution,
            offset_x: origin.x,
            offset_y: origin.y,
            grid_w,
            grid_h,
        }
    }

    /// Grid with a cell centre on every resolution step inside `extent`,
    /// both edges included.
    pub fn for_extent(extent: &Rect, resolution: f64) -> Self {
        let cells = |len: f64| ((len / resolution) + 1e-9).floor().max(0.0) as u32 + 1;
        Self::new(
            extent.min,
            resolution,
            cells(extent.width()),
            cells(extent.height()),
        )
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_w, self.grid_h)
    }

    /// Nearest cell to `p`. Points that round outside the grid are rejected
    /// rather than clamped.
    pub fn to_grid(&self, p: Point<f64>) -> Result<(u32, u32)> {
        let raw_x = ((p.x - self.offset_x) / self.resolution).round();
        let raw_y = ((p.y - self.offset_y) / self.resolution).round();

        let inside = raw_x.is_finite()
            && raw_y.is_finite()
            && raw_x >= 0.0
            && raw_y >= 0.0
            && raw_x < self.grid_w as f64
            && raw_y < self.grid_h as f64;
        if !inside {
            return Err(RouteError::OutOfBounds { x: p.x, y: p.y });
        }
        Ok((raw_x as u32, raw_y as u32))
    }

    pub fn to_world(&self, x: u32, y: u32) -> Result<Point<f64>> {
        let p = Point::new(
            x as f64 * self.resolution + self.offset_x,
            y as f64 * self.resolution + self.offset_y,
        );
        if x >= self.grid_w || y >= self.grid_h {
            return Err(RouteError::OutOfBounds { x: p.x, y: p.y });
        }
        Ok(p)
    }

    /// Cells whose centre lies inside `rect` (edges included), clipped to
    /// the grid.
    pub fn cells_in(&self, rect: &Rect) -> impl Iterator<Item = (u32, u32)> + use<> {
        let span = |lo: f64, hi: f64, off: f64, n: u32| -> (i64, i64) {
            let first = ((lo - off) / self.resolution - 1e-9).ceil() as i64;
            let last = ((hi - off) / self.resolution + 1e-9).floor() as i64;
            (first.max(0), last.min(n as i64 - 1))
        };
        let (x0, x1) = span(rect.min.x, rect.max.x, self.offset_x, self.grid_w);
        let (y0, y1) = span(rect.min.y, rect.max.y, self.offset_y, self.grid_h);

        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (x as u32, y as u32)))
    }
}
