//! A single source panorama and everything derived from it.

use serde_json::json;

use crate::fs::slug;
use crate::state::ProcessingState;
use crate::tile::{TileBlob, TileStore};
use crate::types::{Face, ImageDimensions, Level, LevelOptions, PanoramaId, PanoramaKind, ViewParameters};

use super::{InfoHotspot, LinkHotspot, PanoramaError, SourceFiles};

/// Notifications recorded by an entry for preview and export collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanoramaEvent {
    LevelsSet,
    PreviewSet,
    Renamed,
    InitialViewChanged,
    LinkHotspotAdded(usize),
    LinkHotspotRemoved(usize),
    LinkHotspotChanged(usize),
    InfoHotspotAdded(usize),
    InfoHotspotRemoved(usize),
    InfoHotspotChanged(usize),
}

#[derive(Debug)]
pub struct PanoramaEntry {
    id: PanoramaId,
    name: String,
    sources: SourceFiles,
    dimensions: ImageDimensions,
    tiles: TileStore,
    state: ProcessingState,
    link_hotspots: Vec<LinkHotspot>,
    info_hotspots: Vec<InfoHotspot>,
    initial_view: ViewParameters,
    levels: Option<Vec<Level>>,
    face_size: Option<u32>,
    preview_size: Option<u32>,
    preview: Option<TileBlob>,
    events: Vec<PanoramaEvent>,
}

impl PanoramaEntry {
    pub(crate) fn new(
        id: PanoramaId,
        name: impl Into<String>,
        sources: SourceFiles,
        dimensions: ImageDimensions,
    ) -> Self {
        let name = name.into();
        let state = ProcessingState::new(
            "panorama",
            json!({
                "type": sources.kind().as_str(),
                "name": name,
                "width": dimensions.width,
                "height": dimensions.height,
            }),
        );

        Self {
            id,
            name,
            sources,
            dimensions,
            tiles: TileStore::new(),
            state,
            link_hotspots: Vec::new(),
            info_hotspots: Vec::new(),
            initial_view: ViewParameters::default(),
            levels: None,
            face_size: None,
            preview_size: None,
            preview: None,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> PanoramaId {
        self.id
    }

    pub fn kind(&self) -> PanoramaKind {
        self.sources.kind()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.events.push(PanoramaEvent::Renamed);
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn sources(&self) -> &SourceFiles {
        &self.sources
    }

    /// Raw source files: one for equirectangular, six for cube panoramas.
    pub fn files(&self) -> Vec<&crate::panorama::SourceFile> {
        self.sources.files()
    }

    pub fn tiles(&self) -> &TileStore {
        &self.tiles
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ProcessingState {
        &mut self.state
    }

    /// Identifier used for archive paths and hotspot targets, given the entry's position.
    ///
    /// Positional: inserting or removing earlier entries changes it.
    pub fn unique_id_at(&self, position: Option<usize>) -> String {
        match position {
            Some(index) => format!("{index}-{}", slug(&self.name)),
            None => slug(&self.name),
        }
    }

    /// Store a tile. Coordinates are not validated against the pyramid.
    ///
    /// The store is sealed once processing succeeded.
    pub(crate) fn add_tile(
        &mut self,
        level: u32,
        face: Face,
        x: u32,
        y: u32,
        blob: TileBlob,
    ) -> Result<(), PanoramaError> {
        if self.state.is_successful() {
            return Err(PanoramaError::TilesSealed(self.id));
        }
        self.tiles.put(level, face, x, y, blob);
        Ok(())
    }

    /// Assign the tile pyramid, ordered coarsest to finest. Write-once.
    ///
    /// With a preview size, a fallback-only level of that size is prepended, so tile levels are
    /// indexes into the resulting list.
    pub fn set_levels(
        &mut self,
        levels: Vec<Level>,
        options: LevelOptions,
    ) -> Result<(), PanoramaError> {
        if self.levels.is_some() {
            return Err(PanoramaError::LevelsAlreadySet(self.id));
        }
        if levels.is_empty() {
            return Err(PanoramaError::EmptyLevels(self.id));
        }
        if !levels.windows(2).all(|pair| pair[0].size <= pair[1].size) {
            return Err(PanoramaError::LevelsOutOfOrder(self.id));
        }

        let mut all = Vec::with_capacity(levels.len() + 1);
        if let Some(preview_size) = options.preview_size {
            all.push(Level { tile_size: preview_size, size: preview_size, fallback_only: true });
        }
        all.extend(levels);

        let max_size = all.last().map(|level| level.size).unwrap_or_default();
        self.face_size = Some(options.face_size.map_or(max_size, |requested| requested.min(max_size)));
        self.preview_size = options.preview_size;
        self.levels = Some(all);

        tracing::debug!(panorama = %self.id, face_size = ?self.face_size, "levels set");
        self.events.push(PanoramaEvent::LevelsSet);
        Ok(())
    }

    pub fn levels(&self) -> Option<&[Level]> {
        self.levels.as_deref()
    }

    pub fn face_size(&self) -> Option<u32> {
        self.face_size
    }

    pub fn preview_size(&self) -> Option<u32> {
        self.preview_size
    }

    /// Attach the low-resolution preview. Requires a preview size from [`Self::set_levels`].
    pub fn set_cube_map_preview(&mut self, blob: TileBlob) -> Result<(), PanoramaError> {
        if self.preview.is_some() {
            return Err(PanoramaError::PreviewAlreadySet(self.id));
        }
        if self.preview_size.is_none() {
            return Err(PanoramaError::PreviewSizeNotNegotiated(self.id));
        }
        self.preview = Some(blob);
        self.events.push(PanoramaEvent::PreviewSet);
        Ok(())
    }

    pub fn cube_map_preview(&self) -> Option<&TileBlob> {
        self.preview.as_ref()
    }

    pub fn initial_view(&self) -> ViewParameters {
        self.initial_view
    }

    pub fn set_initial_view(&mut self, view: ViewParameters) {
        self.initial_view = view;
        self.events.push(PanoramaEvent::InitialViewChanged);
    }

    pub fn link_hotspots(&self) -> &[LinkHotspot] {
        &self.link_hotspots
    }

    /// Append a link hotspot, returning its index.
    pub fn add_link_hotspot(&mut self, hotspot: LinkHotspot) -> usize {
        self.link_hotspots.push(hotspot);
        let index = self.link_hotspots.len() - 1;
        self.events.push(PanoramaEvent::LinkHotspotAdded(index));
        index
    }

    pub fn remove_link_hotspot(&mut self, index: usize) -> Option<LinkHotspot> {
        if index >= self.link_hotspots.len() {
            return None;
        }
        let removed = self.link_hotspots.remove(index);
        self.events.push(PanoramaEvent::LinkHotspotRemoved(index));
        Some(removed)
    }

    /// Edit a link hotspot in place. Returns `false` if `index` is out of range.
    pub fn update_link_hotspot(&mut self, index: usize, edit: impl FnOnce(&mut LinkHotspot)) -> bool {
        let Some(hotspot) = self.link_hotspots.get_mut(index) else {
            return false;
        };
        edit(hotspot);
        self.events.push(PanoramaEvent::LinkHotspotChanged(index));
        true
    }

    pub fn info_hotspots(&self) -> &[InfoHotspot] {
        &self.info_hotspots
    }

    pub fn add_info_hotspot(&mut self, hotspot: InfoHotspot) -> usize {
        self.info_hotspots.push(hotspot);
        let index = self.info_hotspots.len() - 1;
        self.events.push(PanoramaEvent::InfoHotspotAdded(index));
        index
    }

    pub fn remove_info_hotspot(&mut self, index: usize) -> Option<InfoHotspot> {
        if index >= self.info_hotspots.len() {
            return None;
        }
        let removed = self.info_hotspots.remove(index);
        self.events.push(PanoramaEvent::InfoHotspotRemoved(index));
        Some(removed)
    }

    pub fn update_info_hotspot(&mut self, index: usize, edit: impl FnOnce(&mut InfoHotspot)) -> bool {
        let Some(hotspot) = self.info_hotspots.get_mut(index) else {
            return false;
        };
        edit(hotspot);
        self.events.push(PanoramaEvent::InfoHotspotChanged(index));
        true
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<PanoramaEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panorama::SourceFile;

    fn entry(name: &str) -> PanoramaEntry {
        PanoramaEntry::new(
            PanoramaId::new(1),
            name,
            SourceFiles::Equirectangular(SourceFile::new("pano.jpg", vec![0u8; 8])),
            ImageDimensions { width: 4096, height: 2048 },
        )
    }

    fn pyramid() -> Vec<Level> {
        vec![Level::new(512, 512), Level::new(512, 1024)]
    }

    #[test]
    fn starts_queued_with_default_view() {
        let entry = entry("Lobby");
        assert!(entry.state().is_queued());
        assert_eq!(entry.state().metadata()["type"], "equirectangular");
        assert_eq!(entry.initial_view(), ViewParameters::default());
        assert!(entry.levels().is_none());
    }

    #[test]
    fn set_levels_prepends_preview_level() {
        let mut entry = entry("Lobby");
        entry
            .set_levels(pyramid(), LevelOptions { face_size: None, preview_size: Some(256) })
            .unwrap();

        let levels = entry.levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], Level { tile_size: 256, size: 256, fallback_only: true });
        assert_eq!(entry.face_size(), Some(1024));
        assert_eq!(entry.drain_events(), vec![PanoramaEvent::LevelsSet]);
    }

    #[test]
    fn face_size_is_clamped_to_largest_level() {
        let mut small = entry("a");
        small.set_levels(pyramid(), LevelOptions { face_size: Some(700), preview_size: None }).unwrap();
        assert_eq!(small.face_size(), Some(700));

        let mut large = entry("b");
        large.set_levels(pyramid(), LevelOptions { face_size: Some(5000), preview_size: None }).unwrap();
        assert_eq!(large.face_size(), Some(1024));
    }

    #[test]
    fn set_levels_is_write_once() {
        let mut entry = entry("Lobby");
        entry.set_levels(pyramid(), LevelOptions::default()).unwrap();

        for _ in 0..2 {
            let err = entry.set_levels(pyramid(), LevelOptions::default()).unwrap_err();
            assert_eq!(err, PanoramaError::LevelsAlreadySet(entry.id()));
            assert!(err.is_already_set());
        }
        assert_eq!(entry.levels().unwrap().len(), 2);
    }

    #[test]
    fn set_levels_rejects_finest_first_input() {
        let mut entry = entry("Lobby");
        let mut levels = pyramid();
        levels.reverse();

        let err = entry.set_levels(levels, LevelOptions::default()).unwrap_err();
        assert_eq!(err, PanoramaError::LevelsOutOfOrder(entry.id()));
        assert!(entry.levels().is_none());
        assert!(entry.face_size().is_none());

        entry.set_levels(pyramid(), LevelOptions::default()).unwrap();
        assert_eq!(entry.face_size(), Some(1024));
    }

    #[test]
    fn tiles_are_sealed_after_success() {
        let mut entry = entry("Lobby");
        entry.set_levels(pyramid(), LevelOptions::default()).unwrap();
        entry.state_mut().started().unwrap();
        entry.add_tile(0, Face::Front, 0, 0, TileBlob::from(vec![1, 2])).unwrap();
        entry.state_mut().successful().unwrap();

        let err = entry.add_tile(0, Face::Front, 0, 0, TileBlob::from(vec![9, 9])).unwrap_err();
        assert_eq!(err, PanoramaError::TilesSealed(entry.id()));
        assert!(err.is_already_set());
        assert!(entry.add_tile(7, Face::Up, 3, 3, TileBlob::from(vec![9])).is_err());

        assert_eq!(entry.tiles().len(), 1);
        assert_eq!(entry.tiles().query(0, Face::Front, 0, 0).unwrap().as_bytes(), &[1, 2]);
    }

    #[test]
    fn preview_requires_negotiated_size() {
        let mut entry = entry("Lobby");
        let err = entry.set_cube_map_preview(TileBlob::from(vec![1])).unwrap_err();
        assert_eq!(err, PanoramaError::PreviewSizeNotNegotiated(entry.id()));

        entry.set_levels(pyramid(), LevelOptions::default()).unwrap();
        let err = entry.set_cube_map_preview(TileBlob::from(vec![1])).unwrap_err();
        assert_eq!(err, PanoramaError::PreviewSizeNotNegotiated(entry.id()));
    }

    #[test]
    fn preview_is_write_once() {
        let mut entry = entry("Lobby");
        entry.set_levels(pyramid(), LevelOptions { face_size: None, preview_size: Some(64) }).unwrap();
        entry.set_cube_map_preview(TileBlob::from(vec![1])).unwrap();
        let err = entry.set_cube_map_preview(TileBlob::from(vec![2])).unwrap_err();
        assert_eq!(err, PanoramaError::PreviewAlreadySet(entry.id()));
        assert_eq!(entry.cube_map_preview().unwrap().as_bytes(), &[1]);
    }

    #[test]
    fn hotspot_edits_are_recorded() {
        let mut entry = entry("Lobby");
        let index = entry.add_info_hotspot(InfoHotspot::new(0.1, 0.2, "Desk", "Reception"));
        assert!(entry.update_info_hotspot(index, |h| h.set_title("Front desk")));
        assert!(!entry.update_info_hotspot(5, |h| h.set_title("missing")));
        let removed = entry.remove_info_hotspot(index).unwrap();
        assert_eq!(removed.title(), "Front desk");
        assert!(entry.remove_info_hotspot(0).is_none());

        assert_eq!(
            entry.drain_events(),
            vec![
                PanoramaEvent::InfoHotspotAdded(0),
                PanoramaEvent::InfoHotspotChanged(0),
                PanoramaEvent::InfoHotspotRemoved(0),
            ]
        );
        assert!(entry.drain_events().is_empty());
    }

    #[test]
    fn unique_id_combines_position_and_slug() {
        let entry = entry("Main Hall");
        assert_eq!(entry.unique_id_at(Some(0)), "0-main-hall");
        assert_eq!(entry.unique_id_at(Some(3)), "3-main-hall");
        assert_eq!(entry.unique_id_at(None), "main-hall");
    }
}
