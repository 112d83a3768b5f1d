//! Destinations for finished archives.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use tempfile::NamedTempFile;

use super::{ArchiveBlob, Result};

/// Receives the finished archive: the "offer for download" step.
pub trait ArchiveSink: fmt::Debug {
    /// Persist the blob. Returns where it landed, if it landed on disk.
    fn save(&mut self, blob: &ArchiveBlob) -> Result<Option<PathBuf>>;
}

/// Writes archives into a directory. The file appears atomically under its final name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArchiveSink for DirectorySink {
    fn save(&mut self, blob: &ArchiveBlob) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;
        let path = self.dir.join(&blob.file_name);

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("allocating temp file in {}", self.dir.display()))?;
        tmp.write_all(&blob.bytes).with_context(|| format!("writing {}", path.display()))?;
        tmp.flush().with_context(|| format!("flushing {}", path.display()))?;
        tmp.persist(&path).map_err(|err| Error::from(err.error))?;

        tracing::info!(target: "export", path = %path.display(), bytes = blob.bytes.len(), "archive saved");
        Ok(Some(path))
    }
}

/// Keeps saved archives in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    saved: Vec<ArchiveBlob>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> &[ArchiveBlob] {
        &self.saved
    }

    pub fn last(&self) -> Option<&ArchiveBlob> {
        self.saved.last()
    }
}

impl ArchiveSink for MemorySink {
    fn save(&mut self, blob: &ArchiveBlob) -> Result<Option<PathBuf>> {
        self.saved.push(blob.clone());
        Ok(None)
    }
}
