use crate::db::indices::NetId;
use crate::db::request::{PadLayers, PadLocation, RouteRequest};
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Board description handed over by the file-format layer: outline, layer
/// stack, keepouts and the pad pairs to connect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Board {
    pub outline: Outline,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    #[serde(default)]
    pub nets: Vec<NetSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outline {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    #[serde(default = "default_layers")]
    pub layers: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routable_layers: Option<Vec<u8>>,
}

/// Rectangular keepout; `layer = None` blocks the whole stack.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u8>,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Obstacle {
    pub fn rect(&self) -> Rect {
        Rect::from_corners(
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.max_y),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetSpec {
    pub id: NetId,
    #[serde(default)]
    pub name: String,
    pub source: PadSpec,
    pub target: PadSpec,
    #[serde(default)]
    pub priority: i32,
}

/// Pad position; a missing `layer` marks a through-hole pad.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PadSpec {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u8>,
}

impl PadSpec {
    fn location(&self) -> PadLocation {
        PadLocation::new(self.x, self.y, PadLayers::from_optional(self.layer))
    }
}

fn default_layers() -> u8 {
    2
}

impl Board {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let board: Board = toml::from_str(s).context("Failed to parse board TOML")?;
        if board.outline.width <= 0.0 || board.outline.height <= 0.0 {
            anyhow::bail!(
                "Board outline must have a positive size, got {}x{}",
                board.outline.width,
                board.outline.height
            );
        }
        if board.outline.layers == 0 {
            anyhow::bail!("Board must have at least one layer");
        }
        Ok(board)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board file {:?}", path))?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string(self).context("Failed to serialize board")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    pub fn extent(&self) -> Rect {
        let o = &self.outline;
        Rect::new(
            Point::new(o.origin_x, o.origin_y),
            Point::new(o.origin_x + o.width, o.origin_y + o.height),
        )
    }

    /// Routable layers, defaulting to the full stack.
    pub fn routable_layers(&self) -> Vec<u8> {
        match &self.outline.routable_layers {
            Some(layers) => layers.clone(),
            None => (0..self.outline.layers).collect(),
        }
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        self.nets
            .iter()
            .map(|n| {
                RouteRequest::new(n.id, n.source.location(), n.target.location())
                    .with_priority(n.priority)
            })
            .collect()
    }
}
