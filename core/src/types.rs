//! Shared data structures exchanged between the collection, the processing pipeline and export.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Persistent identifier for a panorama, assigned in creation order.
///
/// Unlike [`crate::panorama::PanoramaCollection::unique_id`], this never changes when other
/// entries are inserted or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PanoramaId(u64);

impl PanoramaId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PanoramaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Projection of the source imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanoramaKind {
    Equirectangular,
    Cube,
}

impl PanoramaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PanoramaKind::Equirectangular => "equirectangular",
            PanoramaKind::Cube => "cube",
        }
    }
}

/// One of the six faces of a cube map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Front,
    Right,
    Back,
    Left,
    Up,
    Down,
}

impl Face {
    /// All faces in canonical order.
    pub const ALL: [Face; 6] = [Face::Front, Face::Right, Face::Back, Face::Left, Face::Up, Face::Down];

    /// Order in which faces are stacked inside the preview strip.
    pub const PREVIEW_ORDER: [Face; 6] =
        [Face::Back, Face::Down, Face::Front, Face::Left, Face::Right, Face::Up];

    /// Single-letter code used in tile paths.
    pub fn code(self) -> char {
        match self {
            Face::Front => 'f',
            Face::Right => 'r',
            Face::Back => 'b',
            Face::Left => 'l',
            Face::Up => 'u',
            Face::Down => 'd',
        }
    }

    pub fn index(self) -> usize {
        match self {
            Face::Front => 0,
            Face::Right => 1,
            Face::Back => 2,
            Face::Left => 3,
            Face::Up => 4,
            Face::Down => 5,
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Face {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "f" | "front" => Ok(Face::Front),
            "r" | "right" => Ok(Face::Right),
            "b" | "back" => Ok(Face::Back),
            "l" | "left" => Ok(Face::Left),
            "u" | "up" => Ok(Face::Up),
            "d" | "down" => Ok(Face::Down),
            other => Err(anyhow!("unknown cube face {other:?}")),
        }
    }
}

/// Address of a single tile inside a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: u32,
    pub face: Face,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(level: u32, face: Face, x: u32, y: u32) -> Self {
        Self { level, face, x, y }
    }
}

/// A single resolution level of a tile pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub tile_size: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback_only: bool,
}

impl Level {
    pub fn new(tile_size: u32, size: u32) -> Self {
        Self { tile_size, size, fallback_only: false }
    }

    /// Number of tiles along one edge of a face at this level.
    pub fn tiles_per_side(&self) -> u32 {
        if self.tile_size == 0 { 0 } else { self.size.div_ceil(self.tile_size) }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Optional negotiation parameters passed alongside levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelOptions {
    /// Requested face size; clamped to the largest level.
    pub face_size: Option<u32>,
    /// Size of the low-fidelity cube map preview, if one will be provided.
    pub preview_size: Option<u32>,
}

/// Camera parameters a scene opens with. Angles are in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewParameters {
    pub yaw: f64,
    pub pitch: f64,
    pub fov: f64,
}

impl Default for ViewParameters {
    fn default() -> Self {
        Self { yaw: 0.0, pitch: 0.0, fov: std::f64::consts::FRAC_PI_2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}
