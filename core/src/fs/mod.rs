//! File system helpers: path slugs and exported-archive reading.

pub mod archive;
mod util;

pub use archive::{ArchivedTile, list_tiles, read_tour};
pub use util::{archive_path, sanitize_zip_path, slug};

/// Shared result type for fs operations.
pub type Result<T> = crate::Result<T>;
