//! Built-in processor: decodes source imagery and slices it into a JPEG cube-map pyramid on a
//! background thread.

use std::thread;

use anyhow::{Context, anyhow};
use tracing::{debug, info, warn};

use crate::codec::{DecodedImage, decode_primary, encode_jpeg};
use crate::config::ProcessingConfig;
use crate::panorama::SourceFiles;
use crate::tile::TileBlob;
use crate::types::Face;

use super::plan::{PyramidPlan, plan_pyramid};
use super::project::equirect_to_face;
use super::resize::{ResizeFilter, resize_square};
use super::{
    CancellationToken, FailureDetail, PanoramaProcessor, ProcessingJob, ProcessingOutcome, Result,
    UpdateSink,
};

/// Runs every job on its own worker thread.
#[derive(Debug, Clone, Default)]
pub struct TilingProcessor {
    config: ProcessingConfig,
}

impl TilingProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }
}

impl PanoramaProcessor for TilingProcessor {
    fn process(&mut self, job: ProcessingJob) {
        let config = self.config.clone();
        let panorama = job.panorama;
        let spawned = thread::Builder::new()
            .name(format!("panotour-tiler-{}", panorama.as_u64()))
            .spawn(move || run_job(job, &config));

        // On spawn failure the closure, and with it the job's sink, is dropped, which reports
        // the job as failed.
        if let Err(err) = spawned {
            warn!(panorama = %panorama, %err, "failed to spawn tiling worker");
        }
    }
}

/// Why a job stopped early.
enum Interrupt {
    Cancelled,
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Failed(err)
    }
}

/// Process one job to completion on the calling thread.
pub fn run_job(job: ProcessingJob, config: &ProcessingConfig) {
    let ProcessingJob { panorama, name, sources, dimensions, cancel, sink } = job;
    debug!(target: "pipeline::tiler", panorama = %panorama, %name, "tiling started");

    let plan = plan_pyramid(sources.kind(), dimensions, config);
    let outcome = match tile_panorama(&sources, &plan, config, &cancel, &sink) {
        Ok(tiles) => {
            info!(target: "pipeline::tiler", panorama = %panorama, tiles, "tiling finished");
            ProcessingOutcome::Success
        }
        Err(Interrupt::Cancelled) => ProcessingOutcome::Cancelled,
        Err(Interrupt::Failed(err)) => {
            let err = err.context(format!("tiling panorama {name}"));
            ProcessingOutcome::Failed(FailureDetail::from(&err))
        }
    };
    sink.finish(outcome);
}

fn tile_panorama(
    sources: &SourceFiles,
    plan: &PyramidPlan,
    config: &ProcessingConfig,
    cancel: &CancellationToken,
    sink: &UpdateSink,
) -> std::result::Result<usize, Interrupt> {
    check(cancel)?;
    let faces = load_faces(sources, plan.face_size, cancel)?;

    deliver(cancel, sink.levels(plan.levels.clone(), plan.options()))?;

    if let Some(preview_size) = plan.preview_size {
        let strip = preview_strip(&faces, preview_size)?;
        let bytes = encode_jpeg(&strip, config.jpeg_quality)?;
        deliver(cancel, sink.preview(TileBlob::from(bytes)))?;
    }

    let mut count = 0;
    for (i, level) in plan.levels.iter().enumerate() {
        let level_index = plan.level_index(i);
        for face in Face::ALL {
            check(cancel)?;
            let image = resize_square(&faces[face.index()], level.size, ResizeFilter::Lanczos3)?;
            let per_side = level.tiles_per_side();
            for y in 0..per_side {
                for x in 0..per_side {
                    check(cancel)?;
                    let tile = image.crop(x * level.tile_size, y * level.tile_size, level.tile_size, level.tile_size)?;
                    let bytes = encode_jpeg(&tile, config.jpeg_quality)?;
                    deliver(cancel, sink.tile(level_index, face, x, y, TileBlob::from(bytes)))?;
                    count += 1;
                }
            }
        }
        debug!(target: "pipeline::tiler", level = level_index, size = level.size, "level sliced");
    }
    Ok(count)
}

/// Decode sources into six square faces of `face_size`, indexed by [`Face::index`].
fn load_faces(
    sources: &SourceFiles,
    face_size: u32,
    cancel: &CancellationToken,
) -> std::result::Result<Vec<DecodedImage>, Interrupt> {
    let mut faces = Vec::with_capacity(6);
    match sources {
        SourceFiles::Equirectangular(file) => {
            let equirect = decode_primary(file.name(), file.data())?;
            for face in Face::ALL {
                check(cancel)?;
                faces.push(equirect_to_face(&equirect, face, face_size)?);
            }
        }
        SourceFiles::Cube(cube) => {
            for (face, file) in cube.iter() {
                check(cancel)?;
                let image = decode_primary(file.name(), file.data())
                    .with_context(|| format!("decoding {face} face"))?;
                if image.width() != image.height() {
                    return Err(anyhow!(
                        "cube face {} is {}x{}, expected a square image",
                        file.name(),
                        image.width(),
                        image.height()
                    )
                    .into());
                }
                faces.push(resize_square(&image, face_size, ResizeFilter::Lanczos3)?);
            }
        }
    }
    Ok(faces)
}

/// The six faces downscaled to `size` and stacked in preview order.
fn preview_strip(faces: &[DecodedImage], size: u32) -> Result<DecodedImage> {
    let scaled = Face::PREVIEW_ORDER
        .iter()
        .map(|face| resize_square(&faces[face.index()], size, ResizeFilter::Box))
        .collect::<Result<Vec<_>>>()?;
    DecodedImage::stack_vertical(&scaled)
}

fn check(cancel: &CancellationToken) -> std::result::Result<(), Interrupt> {
    if cancel.is_cancelled() { Err(Interrupt::Cancelled) } else { Ok(()) }
}

/// A closed channel means the collection went away; treat it like cancellation.
fn deliver(cancel: &CancellationToken, delivered: bool) -> std::result::Result<(), Interrupt> {
    check(cancel)?;
    if delivered { Ok(()) } else { Err(Interrupt::Cancelled) }
}
