//! Tour manifest: a JSON description of the panoramas, their views and hotspots.
//!
//! ```json
//! {
//!   "name": "Office",
//!   "settings": { "autorotateEnabled": false },
//!   "panoramas": [
//!     { "key": "lobby", "name": "Lobby", "source": "lobby.jpg",
//!       "linkHotspots": [{ "yaw": 0.4, "pitch": 0.0, "target": "hall" }] },
//!     { "key": "hall", "name": "Hall",
//!       "faces": { "f": "hall_f.jpg", "r": "hall_r.jpg", "b": "hall_b.jpg",
//!                  "l": "hall_l.jpg", "u": "hall_u.jpg", "d": "hall_d.jpg" } }
//!   ]
//! }
//! ```
//!
//! Source paths are relative to the manifest's directory. Link targets name another
//! panorama's `key` (which defaults to its name).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::probe_dimensions;
use crate::panorama::{CubeFaces, InfoHotspot, LinkHotspot, PanoramaCollection, SourceFile, SourceFiles};
use crate::tour::TourSettings;
use crate::types::{Face, ImageDimensions, PanoramaId, ViewParameters};

pub type Result<T> = crate::Result<T>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourManifest {
    pub name: String,
    #[serde(default)]
    pub settings: TourSettings,
    pub panoramas: Vec<PanoramaManifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanoramaManifest {
    #[serde(default)]
    pub key: Option<String>,
    pub name: String,
    /// Equirectangular source image.
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Cube faces keyed by face letter or name.
    #[serde(default)]
    pub faces: Option<BTreeMap<String, PathBuf>>,
    #[serde(default)]
    pub initial_view: Option<ViewParameters>,
    #[serde(default)]
    pub link_hotspots: Vec<LinkHotspotManifest>,
    #[serde(default)]
    pub info_hotspots: Vec<InfoHotspotManifest>,
}

impl PanoramaManifest {
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkHotspotManifest {
    pub yaw: f64,
    pub pitch: f64,
    #[serde(default)]
    pub rotation: f64,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoHotspotManifest {
    pub yaw: f64,
    pub pitch: f64,
    pub title: String,
    #[serde(default)]
    pub text: String,
}

/// A manifest together with the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: TourManifest,
    pub base_dir: PathBuf,
}

impl LoadedManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading manifest {}", path.display()))?;
        let manifest: TourManifest =
            serde_json::from_str(&raw).with_context(|| format!("parsing manifest {}", path.display()))?;
        manifest.validate()?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self { manifest, base_dir })
    }

    /// Read the source files of one panorama and probe its dimensions.
    pub fn read_sources(&self, panorama: &PanoramaManifest) -> Result<(SourceFiles, ImageDimensions)> {
        match (&panorama.source, &panorama.faces) {
            (Some(source), None) => {
                let file = SourceFile::read(&self.base_dir.join(source))?;
                let dimensions = probe_dimensions(file.name(), file.data())?;
                Ok((SourceFiles::Equirectangular(file), dimensions))
            }
            (None, Some(faces)) => {
                let pairs = faces
                    .iter()
                    .map(|(face, path)| -> Result<(Face, SourceFile)> {
                        let face: Face = face.parse()?;
                        Ok((face, SourceFile::read(&self.base_dir.join(path))?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let cube = CubeFaces::from_pairs(pairs)?;
                let front = cube.get(Face::Front);
                let dimensions = probe_dimensions(front.name(), front.data())?;
                Ok((SourceFiles::Cube(cube), dimensions))
            }
            _ => bail!("panorama {} needs exactly one of `source` or `faces`", panorama.name),
        }
    }

    /// Add every panorama to the collection, then apply views and hotspots.
    ///
    /// Returns the collection id of each manifest key.
    pub fn populate(&self, collection: &mut PanoramaCollection) -> Result<HashMap<String, PanoramaId>> {
        let mut ids = HashMap::new();
        for panorama in &self.manifest.panoramas {
            let (sources, dimensions) =
                self.read_sources(panorama).with_context(|| format!("loading panorama {}", panorama.name))?;
            let id = collection.push(panorama.name.clone(), sources, dimensions);
            debug!(key = panorama.key(), panorama = %id, "manifest panorama added");
            ids.insert(panorama.key().to_string(), id);
        }

        for panorama in &self.manifest.panoramas {
            let id = ids[panorama.key()];
            let entry = collection.get_mut(id).ok_or_else(|| anyhow!("panorama {id} vanished"))?;
            if let Some(view) = panorama.initial_view {
                entry.set_initial_view(view);
            }
            for link in &panorama.link_hotspots {
                let target = *ids
                    .get(&link.target)
                    .ok_or_else(|| anyhow!("{}: unknown link target {:?}", panorama.name, link.target))?;
                let mut hotspot = LinkHotspot::new(link.yaw, link.pitch, target);
                hotspot.offset_rotation(link.rotation);
                entry.add_link_hotspot(hotspot);
            }
            for info in &panorama.info_hotspots {
                entry.add_info_hotspot(InfoHotspot::new(info.yaw, info.pitch, info.title.clone(), info.text.clone()));
            }
        }
        Ok(ids)
    }
}

impl TourManifest {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for (index, panorama) in self.panoramas.iter().enumerate() {
            if let Some(previous) = seen.insert(panorama.key(), index) {
                bail!("panoramas {previous} and {index} share the key {:?}", panorama.key());
            }
        }
        Ok(())
    }
}
