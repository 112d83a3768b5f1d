//! Tile pyramid planning for a source panorama.

use crate::config::ProcessingConfig;
use crate::types::{ImageDimensions, Level, LevelOptions, PanoramaKind};

/// Level sizes, face size and preview size for one panorama.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidPlan {
    pub face_size: u32,
    /// Real levels, coarsest first. The preview level is not included.
    pub levels: Vec<Level>,
    pub preview_size: Option<u32>,
}

impl PyramidPlan {
    pub fn options(&self) -> LevelOptions {
        LevelOptions { face_size: Some(self.face_size), preview_size: self.preview_size }
    }

    /// Index of `levels[i]` once the preview level is prepended.
    pub fn level_index(&self, i: usize) -> u32 {
        i as u32 + u32::from(self.preview_size.is_some())
    }
}

/// Cube face edge derived from the source: a quarter of the equirectangular width, or the
/// face image width for cube input.
pub fn face_size_for(kind: PanoramaKind, dimensions: ImageDimensions) -> u32 {
    match kind {
        PanoramaKind::Equirectangular => (dimensions.width / 4).max(1),
        PanoramaKind::Cube => dimensions.width.max(1),
    }
}

/// Plan the pyramid: sizes double from `min_level_size` and the finest level is the face size.
/// Faces smaller than `min_level_size` get a single level.
pub fn plan_pyramid(kind: PanoramaKind, dimensions: ImageDimensions, config: &ProcessingConfig) -> PyramidPlan {
    let mut face_size = face_size_for(kind, dimensions);
    if let Some(max) = config.max_face_size {
        face_size = face_size.min(max);
    }

    let mut sizes = Vec::new();
    let mut size = config.min_level_size.max(1);
    while size < face_size {
        sizes.push(size);
        size = size.saturating_mul(2);
    }
    sizes.push(face_size);

    let levels = sizes.into_iter().map(|size| Level::new(config.tile_size.min(size), size)).collect();
    let preview_size = config.preview_size.map(|preview| preview.min(face_size));

    PyramidPlan { face_size, levels, preview_size }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equirect(width: u32) -> ImageDimensions {
        ImageDimensions { width, height: width / 2 }
    }

    #[test]
    fn doubles_up_to_face_size() {
        let plan = plan_pyramid(PanoramaKind::Equirectangular, equirect(8192), &ProcessingConfig::default());
        assert_eq!(plan.face_size, 2048);
        let sizes: Vec<u32> = plan.levels.iter().map(|l| l.size).collect();
        assert_eq!(sizes, vec![512, 1024, 2048]);
        assert!(plan.levels.iter().all(|l| l.tile_size == 512));
        assert_eq!(plan.preview_size, Some(256));
        assert_eq!(plan.level_index(0), 1);
    }

    #[test]
    fn odd_face_size_becomes_finest_level() {
        let plan = plan_pyramid(PanoramaKind::Cube, ImageDimensions { width: 1500, height: 1500 }, &ProcessingConfig::default());
        let sizes: Vec<u32> = plan.levels.iter().map(|l| l.size).collect();
        assert_eq!(sizes, vec![512, 1024, 1500]);
    }

    #[test]
    fn small_face_gets_single_level() {
        let config = ProcessingConfig { preview_size: None, ..ProcessingConfig::default() };
        let plan = plan_pyramid(PanoramaKind::Equirectangular, equirect(400), &config);
        assert_eq!(plan.levels, vec![Level::new(100, 100)]);
        assert_eq!(plan.preview_size, None);
        assert_eq!(plan.level_index(0), 0);
    }

    #[test]
    fn max_face_size_caps_the_pyramid() {
        let config = ProcessingConfig { max_face_size: Some(1024), ..ProcessingConfig::default() };
        let plan = plan_pyramid(PanoramaKind::Equirectangular, equirect(16384), &config);
        assert_eq!(plan.face_size, 1024);
        assert_eq!(plan.levels.last().map(|l| l.size), Some(1024));
    }
}
