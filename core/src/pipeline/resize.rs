//! Face and preview downscaling on top of `fast_image_resize`.

use anyhow::{anyhow, ensure};
use fast_image_resize as fir;

use crate::codec::DecodedImage;
use crate::types::ImageDimensions;

use super::Result;

/// Kernels used when deriving pyramid levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    Nearest,
    /// Area averaging; cheap and artefact-free for the 2x steps between levels.
    Box,
    Bilinear,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for fir::ResizeAlg {
    fn from(value: ResizeFilter) -> Self {
        use fir::FilterType;
        match value {
            ResizeFilter::Nearest => fir::ResizeAlg::Nearest,
            ResizeFilter::Box => fir::ResizeAlg::Convolution(FilterType::Box),
            ResizeFilter::Bilinear => fir::ResizeAlg::Convolution(FilterType::Bilinear),
            ResizeFilter::Lanczos3 => fir::ResizeAlg::Convolution(FilterType::Lanczos3),
        }
    }
}

/// Resize an RGBA image. Same-size requests return a copy.
pub fn resize_rgba(
    source: &DecodedImage,
    target: ImageDimensions,
    filter: ResizeFilter,
) -> Result<DecodedImage> {
    let (src_width, src_height) = (source.width(), source.height());
    ensure!(src_width > 0 && src_height > 0, "source image has zero dimensions");
    ensure!(target.width > 0 && target.height > 0, "target dimensions must be non-zero");

    if source.dimensions == target {
        return Ok(source.clone());
    }

    ensure!(
        source.pixels().len() >= src_width as usize * src_height as usize * 4,
        "source buffer is smaller than expected"
    );

    let src_view =
        fir::images::ImageRef::new(src_width, src_height, source.pixels(), fir::PixelType::U8x4)
            .map_err(|err| anyhow!("failed to prepare source image: {err}"))?;
    let mut dst_image = fir::images::Image::new(target.width, target.height, fir::PixelType::U8x4);

    // Panorama faces are opaque; skipping premultiplication keeps edges clean.
    let options = fir::ResizeOptions::new().resize_alg(filter.into()).use_alpha(false);
    fir::Resizer::new()
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|err| anyhow!("fast image resize failed: {err}"))?;

    Ok(DecodedImage { dimensions: target, pixels: dst_image.into_vec() })
}

/// Square downscale helper used for faces and previews.
pub fn resize_square(source: &DecodedImage, size: u32, filter: ResizeFilter) -> Result<DecodedImage> {
    resize_rgba(source, ImageDimensions { width: size, height: size }, filter)
}
