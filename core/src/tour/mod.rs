//! Archive-ready tour document built from the panorama collection.

use std::collections::HashMap;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::panorama::PanoramaEntry;
use crate::types::{Level, PanoramaId, ViewParameters};

pub type Result<T> = crate::Result<T>;

const DATA_JS_PREFIX: &str = "var APP_DATA = ";

/// Viewer settings embedded in the tour. Keys this crate does not know are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TourSettings {
    pub mouse_view_mode: String,
    pub autorotate_enabled: bool,
    pub fullscreen_button: bool,
    pub view_control_buttons: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TourSettings {
    fn default() -> Self {
        Self {
            mouse_view_mode: "drag".into(),
            autorotate_enabled: true,
            fullscreen_button: false,
            view_control_buttons: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkHotspotData {
    pub yaw: f64,
    pub pitch: f64,
    pub rotation: f64,
    /// Scene id of the target.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoHotspotData {
    pub yaw: f64,
    pub pitch: f64,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub levels: Vec<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_size: Option<u32>,
    pub initial_view_parameters: ViewParameters,
    pub link_hotspots: Vec<LinkHotspotData>,
    pub info_hotspots: Vec<InfoHotspotData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDocument {
    pub scenes: Vec<Scene>,
    pub name: String,
    pub settings: TourSettings,
}

/// Build the tour document from the collection's entries in order.
///
/// Link hotspots whose target is not among `entries` are dropped. Entries that were never
/// processed export with no levels and no face size.
pub fn build_tour_document(entries: &[PanoramaEntry], name: &str, settings: &TourSettings) -> TourDocument {
    let ids: HashMap<PanoramaId, String> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.id(), entry.unique_id_at(Some(index))))
        .collect();

    let scenes = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let link_hotspots = entry
                .link_hotspots()
                .iter()
                .filter_map(|hotspot| {
                    let target = ids.get(&hotspot.target())?;
                    Some(LinkHotspotData {
                        yaw: hotspot.yaw(),
                        pitch: hotspot.pitch(),
                        rotation: hotspot.rotation(),
                        target: target.clone(),
                    })
                })
                .collect();

            let info_hotspots = entry
                .info_hotspots()
                .iter()
                .map(|hotspot| InfoHotspotData {
                    yaw: hotspot.yaw(),
                    pitch: hotspot.pitch(),
                    title: hotspot.title().to_string(),
                    text: hotspot.text().to_string(),
                })
                .collect();

            Scene {
                id: entry.unique_id_at(Some(index)),
                name: entry.name().to_string(),
                levels: entry.levels().map(<[Level]>::to_vec).unwrap_or_default(),
                face_size: entry.face_size(),
                initial_view_parameters: entry.initial_view(),
                link_hotspots,
                info_hotspots,
            }
        })
        .collect();

    TourDocument { scenes, name: name.to_string(), settings: settings.clone() }
}

impl TourDocument {
    /// `var APP_DATA = <json>;` with two-space indentation. U+2028 and U+2029 are escaped
    /// so the output stays a valid script.
    pub fn to_data_js(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self).context("serialising tour document")?;
        let json = json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
        Ok(format!("{DATA_JS_PREFIX}{json};\n"))
    }

    /// Parse a `data.js` produced by [`Self::to_data_js`].
    pub fn from_data_js(script: &str) -> Result<Self> {
        let json = script
            .trim()
            .strip_prefix(DATA_JS_PREFIX)
            .and_then(|rest| rest.strip_suffix(';'))
            .ok_or_else(|| anyhow!("data.js does not assign APP_DATA"))?;
        serde_json::from_str(json).context("parsing APP_DATA")
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id == id)
    }
}
