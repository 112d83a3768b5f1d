//! Reading exported tour archives back.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use anyhow::{Context, anyhow};
use zip::read::ZipArchive;

use crate::export::{DATA_JS_PATH, TILES_ROOT};
use crate::tour::TourDocument;
use crate::types::{Face, TileCoord};

use super::{Result, util};

/// A tile file found inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTile {
    pub scene: String,
    pub coord: TileCoord,
    pub size_bytes: u64,
}

/// Parse `app-files/data.js` of an exported archive.
pub fn read_tour(path: &Path) -> Result<TourDocument> {
    let file = File::open(path).with_context(|| format!("opening archive {}", path.display()))?;
    read_tour_from(file).with_context(|| format!("reading tour from {}", path.display()))
}

pub fn read_tour_from<R: Read + Seek>(reader: R) -> Result<TourDocument> {
    let mut archive = ZipArchive::new(reader).map_err(|err| anyhow!("{err}"))?;
    let mut script = String::new();
    archive
        .by_name(DATA_JS_PATH)
        .map_err(|err| anyhow!("{DATA_JS_PATH}: {err}"))?
        .read_to_string(&mut script)
        .context("data.js is not valid UTF-8")?;
    TourDocument::from_data_js(&script)
}

/// Every tile in the archive, in archive order. Previews and unrelated files are skipped.
pub fn list_tiles(path: &Path) -> Result<Vec<ArchivedTile>> {
    let file = File::open(path).with_context(|| format!("opening archive {}", path.display()))?;
    list_tiles_from(file)
}

pub fn list_tiles_from<R: Read + Seek>(reader: R) -> Result<Vec<ArchivedTile>> {
    let mut archive = ZipArchive::new(reader).map_err(|err| anyhow!("{err}"))?;
    let mut tiles = Vec::new();

    for idx in 0..archive.len() {
        let file = archive.by_index(idx).map_err(|err| anyhow!("{err}"))?;
        if file.is_dir() {
            continue;
        }
        let Some(sanitized) = file.enclosed_name().and_then(util::sanitize_zip_path) else {
            continue;
        };
        let Some(name) = sanitized.to_str() else {
            continue;
        };
        if let Some((scene, coord)) = parse_tile_path(name) {
            tiles.push(ArchivedTile { scene, coord, size_bytes: file.size() });
        }
    }

    Ok(tiles)
}

/// Split `app-files/tiles/<scene>/<level>/<face>/<x>/<y>.jpg`.
fn parse_tile_path(name: &str) -> Option<(String, TileCoord)> {
    let rest = name.strip_prefix(TILES_ROOT)?.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();
    let [scene, level, face, x, file] = parts.as_slice() else {
        return None;
    };
    let y = file.strip_suffix(".jpg")?;
    let face: Face = face.parse().ok()?;
    Some((scene.to_string(), TileCoord::new(level.parse().ok()?, face, x.parse().ok()?, y.parse().ok()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;

    fn archive(files: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn parses_tile_paths() {
        let (scene, coord) = parse_tile_path("app-files/tiles/0-lobby/2/u/3/1.jpg").unwrap();
        assert_eq!(scene, "0-lobby");
        assert_eq!(coord, TileCoord::new(2, Face::Up, 3, 1));

        assert!(parse_tile_path("app-files/tiles/0-lobby/preview.jpg").is_none());
        assert!(parse_tile_path("app-files/tiles/0-lobby/1/q/0/0.jpg").is_none());
        assert!(parse_tile_path("index.html").is_none());
    }

    #[test]
    fn lists_only_tiles() {
        let cursor = archive(&[
            ("app-files/data.js", b"var APP_DATA = {};\n"),
            ("app-files/tiles/0-a/preview.jpg", b"p"),
            ("app-files/tiles/0-a/1/f/0/0.jpg", b"abc"),
            ("app-files/tiles/1-b/1/b/0/1.jpg", b"x"),
        ]);
        let tiles = list_tiles_from(cursor).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].scene, "0-a");
        assert_eq!(tiles[0].size_bytes, 3);
        assert_eq!(tiles[1].coord, TileCoord::new(1, Face::Back, 0, 1));
    }

    #[test]
    fn missing_data_js_is_reported() {
        let cursor = archive(&[("index.html", b"<html>")]);
        let err = read_tour_from(cursor).unwrap_err();
        assert!(err.to_string().contains("data.js"));
    }
}
