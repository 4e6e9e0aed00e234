use crate::db::indices::NetId;
use crate::geom::coord::GridCoord;
use crate::geom::point::Point;

/// Layers a pad can be reached on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadLayers {
    /// Surface-mount pad on a single copper layer.
    Fixed(u8),
    /// Through-hole pad, connectable on every routable layer.
    AnyRoutable,
}

impl PadLayers {
    pub fn from_optional(layer: Option<u8>) -> Self {
        match layer {
            Some(l) => PadLayers::Fixed(l),
            None => PadLayers::AnyRoutable,
        }
    }

    /// Resolves the variant against the grid's routable layer list.
    pub fn resolve(&self, routable: &[u8]) -> Vec<u8> {
        match *self {
            PadLayers::Fixed(l) => vec![l],
            PadLayers::AnyRoutable => routable.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PadLocation {
    pub point: Point<f64>,
    pub layers: PadLayers,
}

impl PadLocation {
    pub fn new(x: f64, y: f64, layers: PadLayers) -> Self {
        Self {
            point: Point::new(x, y),
            layers,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub net_id: NetId,
    pub source: PadLocation,
    pub target: PadLocation,
    /// Higher values are routed first in batch and negotiated runs.
    pub priority: i32,
}

impl RouteRequest {
    pub fn new(net_id: NetId, source: PadLocation, target: PadLocation) -> Self {
        Self {
            net_id,
            source,
            target,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Why a net has no route. These are ordinary outcomes, not errors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RouteFailure {
    /// The frontier emptied before reaching the target.
    NoPathFound,
    /// The arena, node budget or deadline ran out first.
    BudgetExceeded,
    /// An endpoint lies outside the grid extent.
    OutOfBounds { x: f64, y: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteResult {
    pub net_id: NetId,
    pub success: bool,
    /// Grid cells from source to target inclusive; empty on failure.
    pub path: Vec<GridCoord>,
    /// Geometric cost of `path`, `f64::INFINITY` on failure.
    pub cost: f64,
    pub nodes_explored: u32,
    pub failure: Option<RouteFailure>,
}

impl RouteResult {
    pub fn routed(net_id: NetId, path: Vec<GridCoord>, cost: f64, nodes_explored: u32) -> Self {
        Self {
            net_id,
            success: true,
            path,
            cost,
            nodes_explored,
            failure: None,
        }
    }

    pub fn failed(net_id: NetId, failure: RouteFailure, nodes_explored: u32) -> Self {
        Self {
            net_id,
            success: false,
            path: Vec::new(),
            cost: f64::INFINITY,
            nodes_explored,
            failure: Some(failure),
        }
    }

    pub fn via_count(&self) -> usize {
        self.path.windows(2).filter(|w| w[0].z != w[1].z).count()
    }
}
