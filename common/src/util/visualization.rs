use crate::db::request::RouteResult;
use crate::geom::coord::GridCoord;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as ImageRect;
use std::path::Path;

const LAYER_COLORS: [Rgba<u8>; 6] = [
    // F.Cu: Red
    Rgba([230, 40, 60, 200]),
    // B.Cu: Blue
    Rgba([40, 110, 255, 200]),
    // In1: Green
    Rgba([0, 220, 110, 190]),
    // In2: Gold
    Rgba([255, 200, 0, 190]),
    // In3: Violet
    Rgba([180, 60, 255, 190]),
    // In4: Cyan
    Rgba([0, 230, 240, 190]),
];

/// Renders obstacles and routed paths of a `cols` x `rows` grid to a PNG.
/// Row 0 is drawn at the bottom.
pub fn draw_routed_board(
    cols: u32,
    rows: u32,
    obstacles: &[GridCoord],
    routes: &[RouteResult],
    filename: &Path,
    pixels_per_cell: u32,
) -> anyhow::Result<()> {
    let scale = pixels_per_cell.max(1);
    let w = cols.max(1) * scale;
    let h = rows.max(1) * scale;
    let mut img = RgbaImage::from_pixel(w, h, Rgba([12, 12, 16, 255]));

    let center = |c: GridCoord| -> (f32, f32) {
        (
            (c.x * scale + scale / 2) as f32,
            (h - (c.y * scale + scale / 2)) as f32,
        )
    };

    let obstacle_color = Rgba([70, 70, 80, 255]);
    for &o in obstacles {
        let rect = ImageRect::at((o.x * scale) as i32, (h - (o.y + 1) * scale) as i32)
            .of_size(scale, scale);
        draw_filled_rect_mut(&mut img, rect, obstacle_color);
    }

    let mut routed: Vec<&RouteResult> = routes.iter().filter(|r| r.success).collect();
    routed.sort_by_key(|r| r.net_id);

    let via_color = Rgba([255, 255, 255, 230]);
    for route in routed {
        for step in route.path.windows(2) {
            let (a, b) = (step[0], step[1]);
            let (x1, y1) = center(a);
            let (x2, y2) = center(b);
            if a.z != b.z {
                let half = (scale / 3).max(1);
                let rect = ImageRect::at(x1 as i32 - half as i32, y1 as i32 - half as i32)
                    .of_size(half * 2, half * 2);
                draw_filled_rect_mut(&mut img, rect, via_color);
                continue;
            }
            let color = LAYER_COLORS[(a.z as usize).min(LAYER_COLORS.len() - 1)];
            draw_line_segment_mut(&mut img, (x1, y1), (x2, y2), color);
        }
    }

    img.save(filename)
        .map_err(|e| anyhow::anyhow!("Failed to save {:?}: {}", filename, e))
}
