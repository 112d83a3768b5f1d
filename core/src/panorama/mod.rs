//! Panorama entries and the ordered, self-scheduling collection that owns them.

pub mod collection;
pub mod entry;
pub mod error;
pub mod hotspot;
pub mod source;

pub use collection::{CollectionEvent, PanoramaCollection, Removal};
pub use entry::{PanoramaEntry, PanoramaEvent};
pub use error::PanoramaError;
pub use hotspot::{InfoHotspot, LinkHotspot};
pub use source::{CubeFaces, SourceFile, SourceFiles};
