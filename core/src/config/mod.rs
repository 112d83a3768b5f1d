//! Tool configuration: processing and export defaults loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub type Result<T> = crate::Result<T>;

pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANISATION: &str = "Panotour";
pub(crate) const APP_NAME: &str = "panotour";

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolConfig {
    pub processing: ProcessingConfig,
    pub export: ExportConfig,
}

/// Knobs for the built-in tiling processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingConfig {
    pub tile_size: u32,
    /// Edge of the fallback preview level; `None` disables the preview.
    pub preview_size: Option<u32>,
    /// Upper bound for the derived cube face size.
    pub max_face_size: Option<u32>,
    /// Smallest real (non-preview) pyramid level.
    pub min_level_size: u32,
    pub jpeg_quality: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { tile_size: 512, preview_size: Some(256), max_face_size: None, min_level_size: 512, jpeg_quality: 85 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// Directory holding the viewer template assets.
    pub template_dir: Option<PathBuf>,
    /// Archive file stem used when the project name has no usable characters.
    pub default_file_stem: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("."), template_dir: None, default_file_stem: "marzipano-tour".into() }
    }
}

/// Read a config file. Missing keys take their defaults.
pub fn load(path: &Path) -> Result<ToolConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: ToolConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Read `path` when given, else the per-user config file if it exists, else defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ToolConfig> {
    if let Some(path) = path {
        return load(path);
    }
    match default_path() {
        Ok(path) if path.exists() => load(&path),
        _ => Ok(ToolConfig::default()),
    }
}

/// Location of the per-user config file.
pub fn default_path() -> Result<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow!("unable to determine config directory"))
}

impl ToolConfig {
    pub fn validate(&self) -> Result<()> {
        let processing = &self.processing;
        if processing.tile_size == 0 || processing.min_level_size == 0 {
            return Err(anyhow!("tile and level sizes must be positive"));
        }
        if processing.preview_size == Some(0) || processing.max_face_size == Some(0) {
            return Err(anyhow!("preview and face sizes must be positive when set"));
        }
        if !(1..=100).contains(&processing.jpeg_quality) {
            return Err(anyhow!("jpegQuality must be within 1..=100, got {}", processing.jpeg_quality));
        }
        Ok(())
    }
}
