//! panotour CLI
//!
//! Builds Marzipano tour archives from a JSON manifest and inspects exported archives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use panotour_core::export::{DirectorySink, ExportStage, TemplateAsset, load_dir};
use panotour_core::fs::{list_tiles, read_tour};
use panotour_core::log::{LogConfig, init as init_logging};
use panotour_core::project::LoadedManifest;
use panotour_core::{
    ArchiveExporter, CollectionEvent, PanoramaCollection, ProcessingState, TilingProcessor, build_tour_document,
    config,
};
use tracing::{info, warn};

const PUMP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "panotour", version, about = "Build and inspect 360° panorama tour archives", long_about = None)]
struct Cli {
    /// Increase console log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tile every panorama in a manifest and export the tour archive
    Build {
        /// Tour manifest (JSON)
        manifest: PathBuf,

        /// Directory the archive is written to (defaults to the configured output directory)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Viewer template directory copied into the archive root
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Tool configuration file (defaults to the per-user config location)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the export progress history as JSON when done
        #[arg(long)]
        history: bool,
    },
    /// List the scenes and tile counts of an exported archive
    Inspect {
        /// Exported tour archive (.zip)
        archive: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig::default().with_verbosity(cli.verbose)) {
        eprintln!("Warning: file logging unavailable: {err:#}");
    }

    let result = match cli.command {
        Command::Build { manifest, output, templates, config, history } => {
            build(&manifest, output.as_deref(), templates.as_deref(), config.as_deref(), history)
        }
        Command::Inspect { archive } => inspect(&archive),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn build(
    manifest_path: &Path,
    output: Option<&Path>,
    templates: Option<&Path>,
    config_path: Option<&Path>,
    history: bool,
) -> Result<()> {
    let tool_config = config::load_or_default(config_path)?;
    let loaded = LoadedManifest::load(manifest_path)?;
    info!(manifest = %manifest_path.display(), panoramas = loaded.manifest.panoramas.len(), "building tour");

    let mut collection = PanoramaCollection::new(TilingProcessor::new(tool_config.processing.clone()));
    loaded.populate(&mut collection)?;

    println!("Processing {} panorama(s)", collection.len());
    let failures = process_all(&mut collection)?;
    if failures > 0 {
        println!("{failures} panorama(s) failed; they are exported without tiles");
    }

    let tour = build_tour_document(collection.entries(), &loaded.manifest.name, &loaded.manifest.settings);

    let template_dir = templates.map(Path::to_path_buf).or_else(|| tool_config.export.template_dir.clone());
    let assets: Vec<TemplateAsset> = match &template_dir {
        Some(dir) => load_dir(dir)?,
        None => Vec::new(),
    };

    let output_dir = output.map(Path::to_path_buf).unwrap_or_else(|| tool_config.export.output_dir.clone());
    let mut sink = DirectorySink::new(output_dir);

    let exporter = ArchiveExporter::new(&tool_config.export);
    let mut export = exporter.begin(&tour, collection.entries(), &assets);
    let mut last_stage = None;
    export.on_progress(move |stage: ExportStage, state: &ProcessingState| {
        if last_stage != Some(stage) {
            let done = state.children().iter().filter(|child| child.is_successful()).count();
            println!("  [{done}/{}] {stage}", ExportStage::ALL.len());
            last_stage = Some(stage);
        }
    });
    let summary = export.run(&mut sink).context("exporting tour archive")?;

    println!();
    println!("Exported {}", summary.file_name);
    if let Some(path) = &summary.saved_to {
        println!("  Path:   {}", path.display());
    }
    println!("  Size:   {} bytes", summary.byte_length);
    println!("  Tiles:  {}", summary.tile_count);
    println!("  Digest: {}", summary.digest);

    if history {
        let snapshot = serde_json::to_string_pretty(&export.state().snapshot())?;
        println!("{snapshot}");
    }
    Ok(())
}

/// Pump processor updates until every entry reached a terminal state. Returns the failure count.
fn process_all(collection: &mut PanoramaCollection) -> Result<usize> {
    let mut failures = 0;
    while !collection.is_settled() {
        collection.pump_blocking(PUMP_INTERVAL)?;
        for event in collection.drain_events() {
            let CollectionEvent::ProcessingFailed(id) = event else {
                continue;
            };
            failures += 1;
            let Some(entry) = collection.get(id) else {
                continue;
            };
            let reason = entry
                .state()
                .metadata()
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .unwrap_or("unknown error");
            warn!(panorama = %id, reason, "processing failed");
            eprintln!("  failed: {} ({reason})", entry.name());
        }
    }

    for entry in collection.entries() {
        if entry.state().is_successful() {
            println!("  done:   {} ({} tiles)", entry.name(), entry.tiles().len());
        }
    }
    Ok(failures)
}

fn inspect(archive: &Path) -> Result<()> {
    let tour = read_tour(archive)?;
    let tiles = list_tiles(archive)?;

    let mut per_scene: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for tile in &tiles {
        let counts = per_scene.entry(tile.scene.as_str()).or_default();
        counts.0 += 1;
        counts.1 += tile.size_bytes;
    }

    println!("Tour: {}", tour.name);
    println!("Scenes: {}", tour.scenes.len());
    for scene in &tour.scenes {
        let (count, bytes) = per_scene.get(scene.id.as_str()).copied().unwrap_or_default();
        println!(
            "  {:<24} {:<24} levels={} tiles={} bytes={} links={} infos={}",
            scene.id,
            scene.name,
            scene.levels.len(),
            count,
            bytes,
            scene.link_hotspots.len(),
            scene.info_hotspots.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_arguments() {
        let cli = Cli::try_parse_from([
            "panotour",
            "-vv",
            "build",
            "tour.json",
            "--output",
            "out",
            "--templates",
            "viewer",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Build { manifest, output, templates, config, history } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(manifest, PathBuf::from("tour.json"));
        assert_eq!(output, Some(PathBuf::from("out")));
        assert_eq!(templates, Some(PathBuf::from("viewer")));
        assert!(config.is_none());
        assert!(!history);
    }

    #[test]
    fn inspect_requires_an_archive() {
        assert!(Cli::try_parse_from(["panotour", "inspect"]).is_err());
    }

    #[test]
    fn inspect_reports_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&dir.path().join("missing.zip")).is_err());
    }
}
