use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use panotour_core::config::ProcessingConfig;
use panotour_core::export::{ArchiveExporter, MemorySink, TemplateAsset};
use panotour_core::fs::archive::{list_tiles_from, read_tour_from};
use panotour_core::panorama::{InfoHotspot, LinkHotspot, PanoramaCollection, SourceFile, SourceFiles};
use panotour_core::pipeline::tiler::TilingProcessor;
use panotour_core::tour::{TourSettings, build_tour_document};
use panotour_core::types::{Face, ImageDimensions, PanoramaId};
use zip::ZipArchive;

fn equirect_png(width: u32, height: u32, tint: u8) -> Vec<u8> {
    let buffer = ImageBuffer::from_fn(width, height, |x, y| Rgba([(x * 2) as u8, (y * 4) as u8, tint, 255]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(buffer).write_to(&mut cursor, ImageFormat::Png).expect("encode png");
    cursor.into_inner()
}

fn config() -> ProcessingConfig {
    ProcessingConfig { tile_size: 16, preview_size: Some(8), max_face_size: None, min_level_size: 16, jpeg_quality: 70 }
}

fn add(collection: &mut PanoramaCollection, name: &str, tint: u8) -> PanoramaId {
    let source = SourceFile::new(format!("{name}.png"), equirect_png(128, 64, tint));
    collection.push(name, SourceFiles::Equirectangular(source), ImageDimensions { width: 128, height: 64 })
}

fn settle(collection: &mut PanoramaCollection) {
    let deadline = Instant::now() + Duration::from_secs(60);
    while !collection.is_settled() {
        assert!(Instant::now() < deadline, "processing did not settle");
        collection.pump_blocking(Duration::from_millis(100)).expect("apply update");
    }
}

fn zip_names(bytes: &[u8]) -> BTreeSet<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    archive.file_names().map(str::to_string).collect()
}

#[test]
fn processes_and_exports_a_two_scene_tour() {
    let mut collection = PanoramaCollection::new(TilingProcessor::new(config()));
    let lobby = add(&mut collection, "Lobby", 10);
    let hall = add(&mut collection, "Main Hall", 200);

    // Only the first entry may be processing while the second waits.
    assert_eq!(collection.processing(), Some(lobby));
    settle(&mut collection);

    for id in [lobby, hall] {
        let entry = collection.get(id).unwrap();
        assert!(entry.state().is_successful(), "{} did not succeed", entry.name());
        assert_eq!(entry.tiles().len(), 6 + 6 * 4);
        assert!(entry.cube_map_preview().is_some());
        assert_eq!(entry.state().metadata()["tileNum"], 30);
    }

    let entry = collection.get_mut(lobby).unwrap();
    entry.add_link_hotspot(LinkHotspot::new(0.3, -0.1, hall));
    entry.add_info_hotspot(InfoHotspot::new(1.2, 0.0, "Desk", "Reception\u{2028}desk"));

    let tour = build_tour_document(collection.entries(), "Office Tour", &TourSettings::default());
    let templates = vec![
        TemplateAsset::new(
            "index.html.tpl",
            "<title><%- name %></title><% for scene in scenes %><a href=\"#<%= scene.id %>\"><%- scene.name %></a><% end %>",
        ),
        TemplateAsset::new("style.css", "body{}"),
    ];

    let mut sink = MemorySink::new();
    let summary = ArchiveExporter::default()
        .export(&tour, collection.entries(), &templates, &mut sink)
        .expect("export");

    assert_eq!(summary.file_name, "office-tour.zip");
    assert_eq!(summary.tile_count, 60);
    let blob = sink.last().expect("saved blob");
    assert_eq!(blob.bytes.len(), summary.byte_length);

    let names = zip_names(&blob.bytes);
    assert!(names.contains("app-files/data.js"));
    assert!(names.contains("index.html"));
    assert!(names.contains("style.css"));
    assert!(names.contains("app-files/tiles/0-lobby/preview.jpg"));
    assert!(names.contains("app-files/tiles/1-main-hall/2/f/1/1.jpg"));
    assert!(names.contains("app-files/tiles/0-lobby/1/d/0/0.jpg"));

    let mut archive = ZipArchive::new(Cursor::new(blob.bytes.as_slice())).unwrap();
    let mut index = String::new();
    archive.by_name("index.html").unwrap().read_to_string(&mut index).unwrap();
    assert_eq!(
        index,
        r##"<title>Office Tour</title><a href="#0-lobby">Lobby</a><a href="#1-main-hall">Main Hall</a>"##
    );

    let mut data_js = String::new();
    archive.by_name("app-files/data.js").unwrap().read_to_string(&mut data_js).unwrap();
    assert!(data_js.starts_with("var APP_DATA = "));
    assert!(data_js.contains("\\u2028"));
    assert!(!data_js.contains('\u{2028}'));

    let reread = read_tour_from(Cursor::new(blob.bytes.as_slice())).expect("reread tour");
    assert_eq!(reread, tour);
    let scene = reread.scene("0-lobby").unwrap();
    assert_eq!(scene.link_hotspots[0].target, "1-main-hall");
    assert_eq!(scene.info_hotspots[0].text, "Reception\u{2028}desk");
    assert_eq!(scene.face_size, Some(32));

    let tiles = list_tiles_from(Cursor::new(blob.bytes.as_slice())).unwrap();
    assert_eq!(tiles.len(), 60);
    assert_eq!(tiles.iter().filter(|tile| tile.scene == "1-main-hall").count(), 30);
    assert!(tiles.iter().any(|tile| tile.coord.face == Face::Up && tile.coord.level == 2));
}

#[test]
fn scene_ids_follow_collection_order() {
    let mut collection = PanoramaCollection::new(TilingProcessor::new(config()));
    let first = add(&mut collection, "First", 0);
    let second = add(&mut collection, "Second", 0);
    settle(&mut collection);

    collection.get_mut(second).unwrap().add_link_hotspot(LinkHotspot::new(0.0, 0.0, first));
    assert!(collection.requires_confirmation(first));
    collection.remove(first, |_| true).expect("remove first");

    assert_eq!(collection.unique_id(second).as_deref(), Some("0-second"));
    let tour = build_tour_document(collection.entries(), "Tour", &TourSettings::default());
    assert_eq!(tour.scenes.len(), 1);
    assert!(tour.scenes[0].link_hotspots.is_empty(), "dangling link should be dropped");

    let mut sink = MemorySink::new();
    ArchiveExporter::default().export(&tour, collection.entries(), &[], &mut sink).unwrap();
    let names = zip_names(&sink.last().unwrap().bytes);
    assert!(names.iter().all(|name| !name.contains("first")));
    assert!(names.contains("app-files/tiles/0-second/preview.jpg"));
}

#[test]
fn identical_inputs_export_identical_archives() {
    let mut collection = PanoramaCollection::new(TilingProcessor::new(config()));
    add(&mut collection, "Only", 42);
    settle(&mut collection);

    let tour = build_tour_document(collection.entries(), "Same", &TourSettings::default());
    let exporter = ArchiveExporter::default();
    let mut first = MemorySink::new();
    let mut second = MemorySink::new();
    let a = exporter.export(&tour, collection.entries(), &[], &mut first).unwrap();
    let b = exporter.export(&tour, collection.entries(), &[], &mut second).unwrap();

    assert_eq!(a.digest, b.digest);
    assert_eq!(first.last().unwrap().bytes, second.last().unwrap().bytes);
}
