//! Core library for building Marzipano-style panorama tours.
//!
//! Panoramas enter a [`PanoramaCollection`], which tiles them one at a time through a
//! [`PanoramaProcessor`]. Finished entries are turned into a [`TourDocument`] and packed with
//! the viewer templates into a zip archive by the [`ArchiveExporter`].

#![deny(missing_debug_implementations)]

pub mod codec;
pub mod config;
pub mod export;
pub mod fs;
pub mod log;
pub mod panorama;
pub mod pipeline;
pub mod project;
pub mod state;
pub mod tile;
pub mod tour;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use export::{ArchiveExport, ArchiveExporter, ExportStage, ExportSummary};
pub use panorama::{CollectionEvent, PanoramaCollection, PanoramaEntry, PanoramaError};
pub use pipeline::{PanoramaProcessor, tiler::TilingProcessor};
pub use state::{ProcessingState, Status};
pub use tour::{TourDocument, TourSettings, build_tour_document};
pub use types::{Face, ImageDimensions, Level, PanoramaId, PanoramaKind, TileCoord, ViewParameters};

/// Version of the core crate, reported by the CLI.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
