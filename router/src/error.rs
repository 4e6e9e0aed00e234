use pcb_common::db::indices::NetId;
use pcb_common::db::rules::RulesError;
use thiserror::Error;

/// Run-level failures. Per-net outcomes such as an unroutable net live in
/// [`RouteResult`](pcb_common::db::request::RouteResult) instead.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("invalid design rules: {0}")]
    InvalidRules(#[from] RulesError),
    #[error("rules use grid resolution {rules} but the grid was built at {grid}")]
    ResolutionMismatch { rules: f64, grid: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid request for net {net}: {reason}")]
    InvalidRequest { net: NetId, reason: String },
    #[error("point ({x}, {y}) lies outside the routing grid")]
    OutOfBounds { x: f64, y: f64 },
}

pub type Result<T> = std::result::Result<T, RouteError>;
