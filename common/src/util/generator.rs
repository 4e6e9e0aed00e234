use crate::db::board::{Board, NetSpec, Obstacle, Outline, PadSpec};
use crate::db::indices::NetId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

pub struct BoardSpec {
    pub width: f64,
    pub height: f64,
    pub layers: u8,
    pub nets: usize,
    pub obstacles: usize,
    /// Pads are snapped to multiples of this pitch.
    pub pitch: f64,
    pub seed: Option<u64>,
}

/// Builds a random benchmark board: keepout blocks plus pad pairs on free
/// pitch points. Roughly a third of the pads are through-hole.
pub fn generate_random_board(spec: &BoardSpec) -> anyhow::Result<Board> {
    if spec.pitch <= 0.0 || spec.width <= spec.pitch || spec.height <= spec.pitch {
        anyhow::bail!(
            "Board {}x{} cannot hold pads at pitch {}",
            spec.width,
            spec.height,
            spec.pitch
        );
    }
    let layers = spec.layers.max(1);
    let mut rng = match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let cols = (spec.width / spec.pitch).floor() as i64;
    let rows = (spec.height / spec.pitch).floor() as i64;
    let free_points = (cols * rows) as usize;
    if spec.nets * 2 > free_points / 2 {
        anyhow::bail!(
            "Too many nets ({}) for a {}x{} pad lattice",
            spec.nets,
            cols,
            rows
        );
    }

    log::info!(
        "Generating board: {} nets, {} obstacles, {}x{} on {} layers",
        spec.nets,
        spec.obstacles,
        spec.width,
        spec.height,
        layers
    );

    let mut obstacles = Vec::with_capacity(spec.obstacles);
    let mut blocked: HashSet<(i64, i64)> = HashSet::new();
    for _ in 0..spec.obstacles {
        let w = rng.gen_range(1..=(cols / 8).max(1));
        let h = rng.gen_range(1..=(rows / 8).max(1));
        let x0 = rng.gen_range(1..(cols - w).max(2));
        let y0 = rng.gen_range(1..(rows - h).max(2));
        let layer = if rng.gen_bool(0.5) {
            None
        } else {
            Some(rng.gen_range(0..layers))
        };
        for x in x0 - 1..=x0 + w + 1 {
            for y in y0 - 1..=y0 + h + 1 {
                blocked.insert((x, y));
            }
        }
        obstacles.push(Obstacle {
            layer,
            min_x: x0 as f64 * spec.pitch,
            min_y: y0 as f64 * spec.pitch,
            max_x: (x0 + w) as f64 * spec.pitch,
            max_y: (y0 + h) as f64 * spec.pitch,
        });
    }

    let mut used = blocked;
    let mut pick_pad = |rng: &mut StdRng| -> Option<PadSpec> {
        for _ in 0..1000 {
            let x = rng.gen_range(1..cols);
            let y = rng.gen_range(1..rows);
            if used.contains(&(x, y)) {
                continue;
            }
            used.insert((x, y));
            let layer = if rng.gen_range(0..3) == 0 {
                None
            } else {
                Some(rng.gen_range(0..layers))
            };
            return Some(PadSpec {
                x: x as f64 * spec.pitch,
                y: y as f64 * spec.pitch,
                layer,
            });
        }
        None
    };

    let mut nets = Vec::with_capacity(spec.nets);
    for i in 0..spec.nets {
        let (Some(source), Some(target)) = (pick_pad(&mut rng), pick_pad(&mut rng)) else {
            log::warn!("Ran out of free pad sites after {} nets", i);
            break;
        };
        nets.push(NetSpec {
            id: NetId::new(i + 1),
            name: format!("net{}", i + 1),
            source,
            target,
            priority: 0,
        });
    }

    Ok(Board {
        outline: Outline {
            width: spec.width,
            height: spec.height,
            origin_x: 0.0,
            origin_y: 0.0,
            layers,
            routable_layers: None,
        },
        obstacles,
        nets,
    })
}
