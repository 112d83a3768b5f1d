//! Keyed tile payload store addressed by `(level, face, x, y)`.

use std::fmt;
use std::sync::Arc;

use hashlink::LinkedHashMap;

use crate::types::{Face, TileCoord};

/// Encoded tile image bytes. Cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct TileBlob(Arc<[u8]>);

impl TileBlob {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TileBlob {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl fmt::Debug for TileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TileBlob").field(&format_args!("{} bytes", self.0.len())).finish()
    }
}

/// Sparse map of tiles. Enumeration follows insertion order; rewriting a key keeps its slot.
#[derive(Debug, Default, Clone)]
pub struct TileStore {
    tiles: LinkedHashMap<TileCoord, TileBlob>,
    bytes_used: usize,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Total payload size across all tiles.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Store a tile, replacing any payload previously written at the same coordinates.
    pub fn put(&mut self, level: u32, face: Face, x: u32, y: u32, blob: TileBlob) {
        let coord = TileCoord::new(level, face, x, y);
        let cost = blob.len();
        if let Some(slot) = self.tiles.get_mut(&coord) {
            self.bytes_used = self.bytes_used.saturating_sub(slot.len()) + cost;
            *slot = blob;
            return;
        }
        self.bytes_used += cost;
        self.tiles.insert(coord, blob);
    }

    /// Look up a tile by exact coordinates. Absent keys yield `None`.
    pub fn query(&self, level: u32, face: Face, x: u32, y: u32) -> Option<&TileBlob> {
        self.tiles.get(&TileCoord::new(level, face, x, y))
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.tiles.contains_key(coord)
    }

    /// Iterate every stored tile in store order.
    pub fn iter(&self) -> impl Iterator<Item = (&TileCoord, &TileBlob)> {
        self.tiles.iter()
    }

    /// Drop every tile, returning the store to its empty state.
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.bytes_used = 0;
    }
}
