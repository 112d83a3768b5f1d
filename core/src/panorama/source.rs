//! Raw source imagery attached to a panorama.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::types::{Face, PanoramaKind};

use super::PanoramaError;

/// An in-memory source file. Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    data: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }

    /// Read a file from disk, naming it after its final path component.
    pub fn read(path: &Path) -> crate::Result<Self> {
        let data = fs::read(path).with_context(|| format!("reading source image {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile").field("name", &self.name).field("len", &self.data.len()).finish()
    }
}

/// The six images of a cube panorama, one per face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeFaces {
    faces: [SourceFile; 6],
}

impl CubeFaces {
    pub fn from_fn(mut f: impl FnMut(Face) -> SourceFile) -> Self {
        Self { faces: Face::ALL.map(&mut f) }
    }

    /// Build from `(face, file)` pairs; every face must be present.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Face, SourceFile)>,
    ) -> Result<Self, PanoramaError> {
        let mut slots: [Option<SourceFile>; 6] = Default::default();
        for (face, file) in pairs {
            slots[face.index()] = Some(file);
        }

        let mut ordered = Vec::with_capacity(6);
        for face in Face::ALL {
            let file = slots[face.index()].take().ok_or(PanoramaError::MissingCubeFace(face))?;
            ordered.push(file);
        }
        let faces: [SourceFile; 6] =
            ordered.try_into().map_err(|_| PanoramaError::MissingCubeFace(Face::Front))?;
        Ok(Self { faces })
    }

    pub fn get(&self, face: Face) -> &SourceFile {
        &self.faces[face.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Face, &SourceFile)> {
        Face::ALL.into_iter().zip(self.faces.iter())
    }
}

/// Source imagery of a panorama, tagged by projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFiles {
    Equirectangular(SourceFile),
    Cube(CubeFaces),
}

impl SourceFiles {
    pub fn kind(&self) -> PanoramaKind {
        match self {
            SourceFiles::Equirectangular(_) => PanoramaKind::Equirectangular,
            SourceFiles::Cube(_) => PanoramaKind::Cube,
        }
    }

    /// One file for equirectangular sources, all six faces (canonical order) for cubes.
    pub fn files(&self) -> Vec<&SourceFile> {
        match self {
            SourceFiles::Equirectangular(file) => vec![file],
            SourceFiles::Cube(faces) => faces.faces.iter().collect(),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.files().iter().map(|file| file.len()).sum()
    }
}
