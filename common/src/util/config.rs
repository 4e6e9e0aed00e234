use crate::db::rules::DesignRules;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: DesignRules,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_allow_diagonal")]
    pub allow_diagonal: bool,
    #[serde(default = "default_max_group_size")]
    pub max_group_size: usize,
    #[serde(default = "default_arena_min")]
    pub arena_min: usize,
    #[serde(default = "default_arena_max")]
    pub arena_max: usize,
    #[serde(default = "default_arena_divisor")]
    pub arena_divisor: usize,
    #[serde(default)]
    pub node_budget: Option<u32>,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub bbox_margin: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            allow_diagonal: default_allow_diagonal(),
            max_group_size: default_max_group_size(),
            arena_min: default_arena_min(),
            arena_max: default_arena_max(),
            arena_divisor: default_arena_divisor(),
            node_budget: None,
            time_limit_ms: None,
            bbox_margin: 0,
        }
    }
}

impl RoutingConfig {
    /// Search arena capacity for a grid with `cells` cells across all layers.
    pub fn arena_capacity(&self, cells: usize) -> usize {
        let divisor = self.arena_divisor.max(1);
        (cells / divisor).clamp(self.arena_min, self.arena_max.max(self.arena_min))
    }
}

/// Growth curve of the present-congestion factor across negotiation passes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CongestionSchedule {
    Linear { initial: f64, step: f64 },
    Geometric { initial: f64, multiplier: f64, max: f64 },
}

impl Default for CongestionSchedule {
    fn default() -> Self {
        CongestionSchedule::Geometric {
            initial: 0.5,
            multiplier: 2.0,
            max: 10_000.0,
        }
    }
}

impl CongestionSchedule {
    /// Factor for pass `pass`; never decreases as `pass` grows.
    pub fn factor(&self, pass: usize) -> f64 {
        match *self {
            CongestionSchedule::Linear { initial, step } => {
                (initial + step.max(0.0) * pass as f64).max(0.0)
            }
            CongestionSchedule::Geometric {
                initial,
                multiplier,
                max,
            } => {
                let growth = multiplier.max(1.0).powi(pass.min(i32::MAX as usize) as i32);
                (initial.max(0.0) * growth).min(max)
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            CongestionSchedule::Linear { initial, step } => {
                initial.is_finite() && step.is_finite() && step >= 0.0
            }
            CongestionSchedule::Geometric {
                initial,
                multiplier,
                max,
            } => initial.is_finite() && multiplier >= 1.0 && max >= 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub schedule: CongestionSchedule,
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            schedule: CongestionSchedule::default(),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_board_file")]
    pub board_file: String,
    #[serde(default)]
    pub output_image: Option<String>,
    #[serde(default = "default_negotiated")]
    pub negotiated: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            board_file: default_board_file(),
            output_image: None,
            negotiated: default_negotiated(),
        }
    }
}

fn default_allow_diagonal() -> bool {
    true
}

fn default_max_group_size() -> usize {
    32
}

fn default_arena_min() -> usize {
    10_000
}

fn default_arena_max() -> usize {
    500_000
}

fn default_arena_divisor() -> usize {
    10
}

fn default_max_iterations() -> usize {
    30
}

fn default_board_file() -> String {
    "inputs/board.toml".to_string()
}

fn default_negotiated() -> bool {
    true
}
