use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RulesError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Physical and cost rules for one routing run. Lengths are in world units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignRules {
    #[serde(default = "default_trace_width")]
    pub trace_width: f64,
    #[serde(default = "default_trace_clearance")]
    pub trace_clearance: f64,
    #[serde(default = "default_cost_straight")]
    pub cost_straight: f64,
    #[serde(default = "default_cost_via")]
    pub cost_via: f64,
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: f64,
}

impl Default for DesignRules {
    fn default() -> Self {
        Self {
            trace_width: default_trace_width(),
            trace_clearance: default_trace_clearance(),
            cost_straight: default_cost_straight(),
            cost_via: default_cost_via(),
            grid_resolution: default_grid_resolution(),
        }
    }
}

impl DesignRules {
    pub fn validate(&self) -> Result<(), RulesError> {
        let fields = [
            ("trace_width", self.trace_width),
            ("trace_clearance", self.trace_clearance),
            ("cost_straight", self.cost_straight),
            ("cost_via", self.cost_via),
            ("grid_resolution", self.grid_resolution),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(RulesError::NotFinite { field, value });
            }
        }
        for (field, value) in [
            ("trace_width", self.trace_width),
            ("cost_straight", self.cost_straight),
            ("grid_resolution", self.grid_resolution),
        ] {
            if value <= 0.0 {
                return Err(RulesError::NotPositive { field, value });
            }
        }
        for (field, value) in [
            ("trace_clearance", self.trace_clearance),
            ("cost_via", self.cost_via),
        ] {
            if value < 0.0 {
                return Err(RulesError::Negative { field, value });
            }
        }
        Ok(())
    }

    /// Half trace width plus clearance: the keep-away distance around copper.
    pub fn clearance_distance(&self) -> f64 {
        self.trace_width / 2.0 + self.trace_clearance
    }

    pub fn clearance_radius_cells(&self) -> u32 {
        // Absorb representation error so 0.3 / 0.1 stays 3 cells.
        let cells = self.clearance_distance() / self.grid_resolution;
        (cells - 1e-9).ceil().max(0.0) as u32
    }
}

fn default_trace_width() -> f64 {
    0.2
}

fn default_trace_clearance() -> f64 {
    0.2
}

fn default_cost_straight() -> f64 {
    1.0
}

fn default_cost_via() -> f64 {
    10.0
}

fn default_grid_resolution() -> f64 {
    0.1
}
