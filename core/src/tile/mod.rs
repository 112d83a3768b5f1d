//! Sparse storage for tile pyramid payloads.

pub mod store;

pub use store::{TileBlob, TileStore};
