//! Tour archive export.
//!
//! An export walks a fixed pipeline, each stage tracked as a child of a `zip` processing
//! state: `add_data` → `add_template_files` → `add_tiles` → `generate_zip` → `create_blob` →
//! `save_blob`. [`ArchiveExport::step`] performs one unit of work per call (one stage, one
//! template file or one panorama's tiles), so a host can interleave exports with other work.
//! The first failing stage aborts the export; nothing reaches the sink in that case.

pub mod sink;
pub mod template;

use std::fmt;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ExportConfig;
use crate::fs::{archive_path, slug};
use crate::panorama::PanoramaEntry;
use crate::state::ProcessingState;
use crate::tour::TourDocument;

pub use sink::{ArchiveSink, DirectorySink, MemorySink};
pub use template::{TemplateAsset, TemplateError, load_dir};

pub type Result<T> = crate::Result<T>;

pub const ZIP_MIME_TYPE: &str = "application/zip";
pub const DATA_JS_PATH: &str = "app-files/data.js";
pub const TILES_ROOT: &str = "app-files/tiles";
const DEFAULT_FILE_STEM: &str = "marzipano-tour";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    AddData,
    AddTemplateFiles,
    AddTiles,
    GenerateZip,
    CreateBlob,
    SaveBlob,
}

impl ExportStage {
    pub const ALL: [ExportStage; 6] = [
        ExportStage::AddData,
        ExportStage::AddTemplateFiles,
        ExportStage::AddTiles,
        ExportStage::GenerateZip,
        ExportStage::CreateBlob,
        ExportStage::SaveBlob,
    ];

    /// Kind label of the stage's processing state.
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::AddData => "add_data",
            ExportStage::AddTemplateFiles => "add_template_files",
            ExportStage::AddTiles => "add_tiles",
            ExportStage::GenerateZip => "generate_zip",
            ExportStage::CreateBlob => "create_blob",
            ExportStage::SaveBlob => "save_blob",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export stage `{stage}` failed: {source}")]
    Stage {
        stage: ExportStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("template `{name}` failed to render: {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },
    #[error("export was already aborted")]
    Aborted,
}

impl ExportError {
    fn stage(stage: ExportStage, err: anyhow::Error) -> Self {
        ExportError::Stage { stage, source: err.into() }
    }

    /// Stage the error happened in, if it belongs to one.
    pub fn failed_stage(&self) -> Option<ExportStage> {
        match self {
            ExportError::Stage { stage, .. } => Some(*stage),
            ExportError::Template { .. } => Some(ExportStage::AddTemplateFiles),
            ExportError::Aborted => None,
        }
    }
}

/// The generated archive, ready to be offered for download.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveBlob {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ArchiveBlob {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), mime_type: ZIP_MIME_TYPE, bytes }
    }
}

impl fmt::Debug for ArchiveBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveBlob")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub file_name: String,
    pub byte_length: usize,
    pub tile_count: usize,
    /// blake3 of the archive bytes, hex encoded.
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

/// Outcome of one [`ArchiveExport::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStep {
    /// A unit of work in this stage completed; call `step` again.
    Progress(ExportStage),
    Done(ExportSummary),
}

/// Builds archives with a fixed naming policy.
#[derive(Debug, Clone)]
pub struct ArchiveExporter {
    default_file_stem: String,
}

impl Default for ArchiveExporter {
    fn default() -> Self {
        Self { default_file_stem: DEFAULT_FILE_STEM.into() }
    }
}

impl ArchiveExporter {
    pub fn new(config: &ExportConfig) -> Self {
        let stem = config.default_file_stem.trim();
        Self { default_file_stem: if stem.is_empty() { DEFAULT_FILE_STEM.into() } else { stem.into() } }
    }

    /// `<slug(tour name)>.zip`, falling back to the default stem.
    pub fn file_name_for(&self, tour_name: &str) -> String {
        let stem = slug(tour_name);
        if stem.is_empty() { format!("{}.zip", self.default_file_stem) } else { format!("{stem}.zip") }
    }

    /// Prepare a stepwise export. `entries` must be the collection's entries in order.
    pub fn begin<'a>(
        &self,
        tour: &'a TourDocument,
        entries: &'a [PanoramaEntry],
        templates: &'a [TemplateAsset],
    ) -> ArchiveExport<'a> {
        ArchiveExport::new(self.file_name_for(&tour.name), tour, entries, templates)
    }

    /// Run a whole export into `sink`.
    pub fn export(
        &self,
        tour: &TourDocument,
        entries: &[PanoramaEntry],
        templates: &[TemplateAsset],
        sink: &mut dyn ArchiveSink,
    ) -> std::result::Result<ExportSummary, ExportError> {
        self.begin(tour, entries, templates).run(sink)
    }
}

#[derive(Debug, Clone)]
enum Phase {
    AddData,
    AddTemplates(usize),
    AddTiles(usize),
    GenerateZip,
    CreateBlob,
    SaveBlob,
    Finished(ExportSummary),
    Aborted,
}

type ProgressCallback<'a> = Box<dyn FnMut(ExportStage, &ProcessingState) + 'a>;

/// A single export attempt, advanced with [`Self::step`] or driven by [`Self::run`].
pub struct ArchiveExport<'a> {
    tour: &'a TourDocument,
    entries: &'a [PanoramaEntry],
    templates: &'a [TemplateAsset],
    file_name: String,
    state: ProcessingState,
    phase: Phase,
    context: Value,
    writer: Option<ZipWriter<Cursor<Vec<u8>>>>,
    archive: Option<Vec<u8>>,
    blob: Option<ArchiveBlob>,
    tile_count: usize,
    on_progress: Option<ProgressCallback<'a>>,
}

impl fmt::Debug for ArchiveExport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveExport")
            .field("file_name", &self.file_name)
            .field("phase", &self.phase)
            .field("tile_count", &self.tile_count)
            .field("writer_open", &self.writer.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> ArchiveExport<'a> {
    fn new(
        file_name: String,
        tour: &'a TourDocument,
        entries: &'a [PanoramaEntry],
        templates: &'a [TemplateAsset],
    ) -> Self {
        let mut state = ProcessingState::new("zip", json!({ "panoramaNum": entries.len() }));
        if let Err(err) = state.started() {
            warn!(target: "export", %err, "fresh export state refused to start");
        }

        Self {
            tour,
            entries,
            templates,
            file_name,
            state,
            phase: Phase::AddData,
            context: Value::Null,
            writer: None,
            archive: None,
            blob: None,
            tile_count: 0,
            on_progress: None,
        }
    }

    /// Observe every completed unit of work.
    pub fn on_progress(&mut self, callback: impl FnMut(ExportStage, &ProcessingState) + 'a) {
        self.on_progress = Some(Box::new(callback));
    }

    /// The `zip` state tree of this export.
    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProcessingState {
        &mut self.state
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// True while the in-memory archive writer is allocated.
    pub fn holds_writer(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_) | Phase::Aborted)
    }

    /// Drive the export to completion.
    pub fn run(&mut self, sink: &mut dyn ArchiveSink) -> std::result::Result<ExportSummary, ExportError> {
        loop {
            if let ExportStep::Done(summary) = self.step(sink)? {
                return Ok(summary);
            }
        }
    }

    /// Perform the next unit of work.
    pub fn step(&mut self, sink: &mut dyn ArchiveSink) -> std::result::Result<ExportStep, ExportError> {
        let stage = match &self.phase {
            Phase::Finished(summary) => return Ok(ExportStep::Done(summary.clone())),
            Phase::Aborted => return Err(ExportError::Aborted),
            Phase::AddData => ExportStage::AddData,
            Phase::AddTemplates(_) => ExportStage::AddTemplateFiles,
            Phase::AddTiles(_) => ExportStage::AddTiles,
            Phase::GenerateZip => ExportStage::GenerateZip,
            Phase::CreateBlob => ExportStage::CreateBlob,
            Phase::SaveBlob => ExportStage::SaveBlob,
        };

        match self.advance(sink) {
            Ok(step) => {
                if let Some(callback) = self.on_progress.as_mut() {
                    callback(stage, &self.state);
                }
                Ok(step)
            }
            Err(err) => {
                self.abort(stage, &err);
                Err(err)
            }
        }
    }

    fn advance(&mut self, sink: &mut dyn ArchiveSink) -> std::result::Result<ExportStep, ExportError> {
        match self.phase.clone() {
            Phase::AddData => {
                self.add_data().map_err(|err| ExportError::stage(ExportStage::AddData, err))?;
                self.phase = Phase::AddTemplates(0);
                Ok(ExportStep::Progress(ExportStage::AddData))
            }
            Phase::AddTemplates(index) => {
                self.add_template(index)?;
                self.phase = if index + 1 >= self.templates.len() {
                    Phase::AddTiles(0)
                } else {
                    Phase::AddTemplates(index + 1)
                };
                Ok(ExportStep::Progress(ExportStage::AddTemplateFiles))
            }
            Phase::AddTiles(index) => {
                self.add_tiles(index).map_err(|err| ExportError::stage(ExportStage::AddTiles, err))?;
                self.phase =
                    if index + 1 >= self.entries.len() { Phase::GenerateZip } else { Phase::AddTiles(index + 1) };
                Ok(ExportStep::Progress(ExportStage::AddTiles))
            }
            Phase::GenerateZip => {
                self.generate_zip().map_err(|err| ExportError::stage(ExportStage::GenerateZip, err))?;
                self.phase = Phase::CreateBlob;
                Ok(ExportStep::Progress(ExportStage::GenerateZip))
            }
            Phase::CreateBlob => {
                self.create_blob().map_err(|err| ExportError::stage(ExportStage::CreateBlob, err))?;
                self.phase = Phase::SaveBlob;
                Ok(ExportStep::Progress(ExportStage::CreateBlob))
            }
            Phase::SaveBlob => {
                let summary =
                    self.save_blob(sink).map_err(|err| ExportError::stage(ExportStage::SaveBlob, err))?;
                self.phase = Phase::Finished(summary.clone());
                Ok(ExportStep::Done(summary))
            }
            Phase::Finished(summary) => Ok(ExportStep::Done(summary)),
            Phase::Aborted => Err(ExportError::Aborted),
        }
    }

    fn add_data(&mut self) -> Result<()> {
        self.begin_stage(ExportStage::AddData)?;
        self.context = serde_json::to_value(self.tour).context("serialising tour document")?;
        let script = self.tour.to_data_js()?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(DATA_JS_PATH, text_options())?;
        writer.write_all(script.as_bytes())?;
        self.writer = Some(writer);

        let tour_data = self.context.clone();
        self.finish_stage(ExportStage::AddData, json!({ "tourData": tour_data }))
    }

    fn add_template(&mut self, index: usize) -> std::result::Result<(), ExportError> {
        let as_stage = |err| ExportError::stage(ExportStage::AddTemplateFiles, err);
        if index == 0 {
            self.begin_stage(ExportStage::AddTemplateFiles).map_err(as_stage)?;
        }

        let templates = self.templates;
        if let Some(asset) = templates.get(index) {
            let bytes = asset
                .render(&self.context)
                .map_err(|source| ExportError::Template { name: asset.name.clone(), source })?;
            let options = if asset.is_template() { text_options() } else { options_for(asset.output_name()) };
            self.write_entry(asset.output_name(), options, &bytes).map_err(as_stage)?;
            debug!(target: "export", asset = %asset.name, "template asset added");
        }

        if index + 1 >= templates.len() {
            let count = templates.len();
            self.finish_stage(ExportStage::AddTemplateFiles, json!({ "fileNum": count })).map_err(as_stage)?;
        }
        Ok(())
    }

    fn add_tiles(&mut self, index: usize) -> Result<()> {
        if index == 0 {
            self.begin_stage(ExportStage::AddTiles)?;
        }

        let entries = self.entries;
        if let Some(entry) = entries.get(index) {
            let id = entry.unique_id_at(Some(index));
            if let Some(preview) = entry.cube_map_preview() {
                let path = archive_path(&[TILES_ROOT, id.as_str(), "preview.jpg"]);
                self.write_entry(&path, binary_options(), preview.as_bytes())?;
            }

            let mut added = 0;
            for (coord, blob) in entry.tiles().iter() {
                let path = archive_path(&[
                    TILES_ROOT.to_string(),
                    id.clone(),
                    coord.level.to_string(),
                    coord.face.code().to_string(),
                    coord.x.to_string(),
                    format!("{}.jpg", coord.y),
                ]);
                self.write_entry(&path, binary_options(), blob.as_bytes())?;
                added += 1;
            }
            self.tile_count += added;
            debug!(target: "export", scene = %id, tiles = added, "panorama tiles added");
        }

        if index + 1 >= self.entries.len() {
            let tiles = self.tile_count;
            self.finish_stage(ExportStage::AddTiles, json!({ "tileNum": tiles }))?;
        }
        Ok(())
    }

    fn generate_zip(&mut self) -> Result<()> {
        self.begin_stage(ExportStage::GenerateZip)?;
        // The writer leaves `self` before finishing, so a failed finish cannot leak it.
        let mut writer = self.writer.take().context("archive writer is not open")?;
        let bytes = writer.finish().context("finalising zip archive")?.into_inner();
        drop(writer);
        let len = bytes.len();
        self.archive = Some(bytes);
        self.finish_stage(ExportStage::GenerateZip, json!({ "byteLength": len }))
    }

    fn create_blob(&mut self) -> Result<()> {
        self.begin_stage(ExportStage::CreateBlob)?;
        let bytes = self.archive.take().context("archive bytes are missing")?;
        self.blob = Some(ArchiveBlob::new(self.file_name.clone(), bytes));
        self.finish_stage(ExportStage::CreateBlob, json!({ "type": ZIP_MIME_TYPE }))
    }

    fn save_blob(&mut self, sink: &mut dyn ArchiveSink) -> Result<ExportSummary> {
        self.begin_stage(ExportStage::SaveBlob)?;
        let blob = self.blob.take().context("archive blob is missing")?;
        let saved_to = sink.save(&blob).with_context(|| format!("saving {}", blob.file_name))?;
        self.finish_stage(ExportStage::SaveBlob, json!({ "fileName": blob.file_name }))?;

        let summary = ExportSummary {
            file_name: blob.file_name.clone(),
            byte_length: blob.bytes.len(),
            tile_count: self.tile_count,
            digest: blake3::hash(&blob.bytes).to_hex().to_string(),
            saved_to,
        };
        self.state.successful_with(json!({ "byteLength": summary.byte_length }))?;
        info!(
            target: "export",
            file = %summary.file_name,
            bytes = summary.byte_length,
            tiles = summary.tile_count,
            "tour exported"
        );
        Ok(summary)
    }

    fn write_entry(&mut self, path: &str, options: FileOptions, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().context("archive writer is not open")?;
        writer.start_file(path, options).with_context(|| format!("adding {path}"))?;
        writer.write_all(bytes).with_context(|| format!("writing {path}"))?;
        Ok(())
    }

    fn begin_stage(&mut self, stage: ExportStage) -> Result<()> {
        self.state.add_child(stage.as_str()).started()?;
        Ok(())
    }

    fn finish_stage(&mut self, stage: ExportStage, result: Value) -> Result<()> {
        if let Some(child) = self.state.child_mut(stage.as_str()) {
            child.successful_with(result)?;
        }
        Ok(())
    }

    fn abort(&mut self, stage: ExportStage, err: &ExportError) {
        self.writer = None;
        self.archive = None;
        self.blob = None;
        self.phase = Phase::Aborted;

        let detail = json!({ "stage": stage.as_str(), "message": err.to_string() });
        if let Some(child) = self.state.child_mut(stage.as_str()) {
            if !child.is_terminal() {
                let _ = child.failed(detail.clone());
            }
        }
        if !self.state.is_terminal() {
            let _ = self.state.failed(detail);
        }
        warn!(target: "export", %stage, error = %err, "export aborted");
    }
}

fn text_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Stored without compression; used for JPEG tiles and other compressed payloads.
fn binary_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
}

fn options_for(name: &str) -> FileOptions {
    let lower = name.to_ascii_lowercase();
    let compressed = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".woff", ".woff2"];
    if compressed.iter().any(|ext| lower.ends_with(ext)) { binary_options() } else { text_options() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panorama::{PanoramaCollection, SourceFile, SourceFiles};
    use crate::pipeline::{DeferredProcessor, ProcessingOutcome};
    use crate::tile::TileBlob;
    use crate::tour::{TourSettings, build_tour_document};
    use crate::types::{Face, ImageDimensions, Level, LevelOptions};
    use std::io::Read;
    use zip::ZipArchive;

    fn processed_collection(names: &[&str]) -> PanoramaCollection {
        let processor = DeferredProcessor::new();
        let mut collection = PanoramaCollection::new(processor.clone());
        for name in names {
            collection.push(
                *name,
                SourceFiles::Equirectangular(SourceFile::new("p.jpg", vec![1])),
                ImageDimensions { width: 2048, height: 1024 },
            );
        }
        while let Some(job) = processor.take() {
            job.sink.levels(vec![Level::new(512, 512)], LevelOptions::default());
            job.sink.tile(0, Face::Front, 0, 0, TileBlob::from(vec![0xFF, 0xD8, 0xFF]));
            job.sink.finish(ProcessingOutcome::Success);
            collection.pump().unwrap();
        }
        collection
    }

    fn names_in(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn file_name_falls_back_to_default_stem() {
        let exporter = ArchiveExporter::default();
        assert_eq!(exporter.file_name_for("My Tour!"), "my-tour.zip");
        assert_eq!(exporter.file_name_for("???"), "marzipano-tour.zip");
    }

    #[test]
    fn archive_contains_data_templates_and_tiles() {
        let collection = processed_collection(&["Lobby", "Hall"]);
        let tour = build_tour_document(collection.entries(), "Office", &TourSettings::default());
        let templates = vec![
            TemplateAsset::new("index.html.tpl", b"<title><%- name %></title>".to_vec()),
            TemplateAsset::new("style.css", b"body{}".to_vec()),
        ];
        let mut sink = MemorySink::new();

        let summary = ArchiveExporter::default().export(&tour, collection.entries(), &templates, &mut sink).unwrap();
        assert_eq!(summary.tile_count, 2);
        assert_eq!(summary.file_name, "office.zip");

        let blob = sink.last().unwrap();
        assert_eq!(blob.mime_type, ZIP_MIME_TYPE);
        assert_eq!(summary.byte_length, blob.bytes.len());

        let mut names = names_in(&blob.bytes);
        names.sort();
        assert_eq!(
            names,
            vec![
                "app-files/data.js",
                "app-files/tiles/0-lobby/0/f/0/0.jpg",
                "app-files/tiles/1-hall/0/f/0/0.jpg",
                "index.html",
                "style.css",
            ]
        );

        let mut archive = ZipArchive::new(Cursor::new(blob.bytes.clone())).unwrap();
        let mut html = String::new();
        archive.by_name("index.html").unwrap().read_to_string(&mut html).unwrap();
        assert_eq!(html, "<title>Office</title>");
    }

    #[test]
    fn stages_are_tracked_in_order() {
        let collection = processed_collection(&["A"]);
        let tour = build_tour_document(collection.entries(), "T", &TourSettings::default());
        let mut export = ArchiveExporter::default().begin(&tour, collection.entries(), &[]);
        export.run(&mut MemorySink::new()).unwrap();

        let state = export.state();
        assert!(state.is_successful());
        assert_eq!(state.metadata()["panoramaNum"], 1);
        let kinds: Vec<&str> = state.children().iter().map(|child| child.kind()).collect();
        let expected: Vec<&str> = ExportStage::ALL.iter().map(|stage| stage.as_str()).collect();
        assert_eq!(kinds, expected);
        assert!(state.children().iter().all(|child| child.is_successful()));
        assert_eq!(state.child("add_tiles").unwrap().metadata()["tileNum"], 1);
        assert!(!export.holds_writer());
    }

    #[test]
    fn steps_yield_per_template_and_per_panorama() {
        let collection = processed_collection(&["A", "B", "C"]);
        let tour = build_tour_document(collection.entries(), "T", &TourSettings::default());
        let templates = vec![TemplateAsset::new("a.txt", b"a".to_vec()), TemplateAsset::new("b.txt", b"b".to_vec())];
        let mut export = ArchiveExporter::default().begin(&tour, collection.entries(), &templates);

        let mut seen = Vec::new();
        let mut sink = MemorySink::new();
        loop {
            match export.step(&mut sink).unwrap() {
                ExportStep::Progress(stage) => seen.push(stage),
                ExportStep::Done(_) => break,
            }
        }
        use ExportStage::*;
        assert_eq!(seen, vec![AddData, AddTemplateFiles, AddTemplateFiles, AddTiles, AddTiles, AddTiles, GenerateZip, CreateBlob]);
        assert!(matches!(export.step(&mut sink), Ok(ExportStep::Done(_))));
    }

    #[test]
    fn template_failure_aborts_without_saving() {
        let collection = processed_collection(&["A"]);
        let tour = build_tour_document(collection.entries(), "T", &TourSettings::default());
        let templates = vec![TemplateAsset::new("index.html.tpl", b"<%= nope %>".to_vec())];
        let mut sink = MemorySink::new();
        let mut export = ArchiveExporter::default().begin(&tour, collection.entries(), &templates);

        let err = export.run(&mut sink).unwrap_err();
        assert!(err.to_string().contains("index.html.tpl"));
        assert_eq!(err.failed_stage(), Some(ExportStage::AddTemplateFiles));
        assert!(sink.saved().is_empty());
        assert!(!export.holds_writer());
        assert!(export.state().is_failed());
        assert!(export.state().child("add_template_files").unwrap().is_failed());
        assert!(export.state().child("add_tiles").is_none());
        assert!(matches!(export.step(&mut sink), Err(ExportError::Aborted)));
    }

    #[test]
    fn identical_inputs_produce_identical_archives() {
        let collection = processed_collection(&["A", "B"]);
        let tour = build_tour_document(collection.entries(), "T", &TourSettings::default());
        let exporter = ArchiveExporter::default();
        let first = exporter.export(&tour, collection.entries(), &[], &mut MemorySink::new()).unwrap();
        let second = exporter.export(&tour, collection.entries(), &[], &mut MemorySink::new()).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.digest.len(), 64);
    }

    #[test]
    fn progress_callback_sees_every_unit() {
        let collection = processed_collection(&["A"]);
        let tour = build_tour_document(collection.entries(), "T", &TourSettings::default());
        let mut stages = Vec::new();
        {
            let mut export = ArchiveExporter::default().begin(&tour, collection.entries(), &[]);
            export.on_progress(|stage, _state| stages.push(stage));
            export.run(&mut MemorySink::new()).unwrap();
        }
        assert_eq!(stages.len(), 6);
        assert_eq!(stages.last(), Some(&ExportStage::SaveBlob));
    }
}
