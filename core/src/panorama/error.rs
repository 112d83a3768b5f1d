use thiserror::Error;

use crate::state::StateError;
use crate::types::{Face, PanoramaId};

/// Invariant violations raised by panorama entries and the collection.
///
/// These indicate a caller bug rather than a processing failure and are never absorbed by the
/// collection's queue handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PanoramaError {
    #[error("levels already set for panorama {0}")]
    LevelsAlreadySet(PanoramaId),
    #[error("cube map preview already set for panorama {0}")]
    PreviewAlreadySet(PanoramaId),
    #[error("cannot set a cube map preview on panorama {0} without a negotiated preview size")]
    PreviewSizeNotNegotiated(PanoramaId),
    #[error("levels for panorama {0} must not be empty")]
    EmptyLevels(PanoramaId),
    #[error("levels for panorama {0} must be ordered coarsest to finest")]
    LevelsOutOfOrder(PanoramaId),
    #[error("tiles of panorama {0} are sealed after successful processing")]
    TilesSealed(PanoramaId),
    #[error("unknown panorama {0}")]
    UnknownPanorama(PanoramaId),
    #[error("cube panorama is missing its {0:?} face")]
    MissingCubeFace(Face),
    #[error(transparent)]
    InvalidTransition(#[from] StateError),
}

impl PanoramaError {
    /// Whether the error reports a write-once field being written again.
    pub fn is_already_set(&self) -> bool {
        matches!(
            self,
            PanoramaError::LevelsAlreadySet(_) | PanoramaError::PreviewAlreadySet(_) | PanoramaError::TilesSealed(_)
        )
    }
}
