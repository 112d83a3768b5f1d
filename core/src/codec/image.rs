//! Source image decoding and tile encoding.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, anyhow, ensure};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ExtendedColorType, ImageDecoder as _, ImageFormat, ImageReader, RgbaImage};
use moxcms::{CmsError, ColorProfile, Layout, TransformOptions};
use tracing::warn;

use crate::types::ImageDimensions;

use super::Result;

/// Straight-alpha RGBA8888 pixels, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: ImageDimensions,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Allocate an opaque black image.
    pub fn blank(width: u32, height: u32) -> Self {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for px in pixels.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self { dimensions: ImageDimensions { width, height }, pixels }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA of the pixel at `(x, y)`, clamped to the image bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width().saturating_sub(1)) as usize;
        let y = y.min(self.height().saturating_sub(1)) as usize;
        let offset = (y * self.width() as usize + x) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[offset..offset + 4]);
        px
    }

    /// Copy out a rectangle. The rectangle is clipped to the image.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<DecodedImage> {
        ensure!(x < self.width() && y < self.height(), "crop origin ({x}, {y}) outside image");
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        let stride = self.width() as usize * 4;
        let row_len = width as usize * 4;
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in y..y + height {
            let start = row as usize * stride + x as usize * 4;
            pixels.extend_from_slice(&self.pixels[start..start + row_len]);
        }
        Ok(DecodedImage { dimensions: ImageDimensions { width, height }, pixels })
    }

    /// Stack images of equal width top to bottom.
    pub fn stack_vertical(images: &[DecodedImage]) -> Result<DecodedImage> {
        let Some(first) = images.first() else {
            return Err(anyhow!("nothing to stack"));
        };
        let width = first.width();
        ensure!(images.iter().all(|img| img.width() == width), "stacked images must share a width");

        let height = images.iter().map(DecodedImage::height).sum();
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for image in images {
            pixels.extend_from_slice(&image.pixels);
        }
        Ok(DecodedImage { dimensions: ImageDimensions { width, height }, pixels })
    }
}

/// Decode the primary frame of a source image into RGBA, honouring EXIF orientation and
/// converting embedded ICC profiles to sRGB.
///
/// `name` is used to pick the decoder by extension; unknown extensions fall back to sniffing.
pub fn decode_primary(name: &str, data: &[u8]) -> Result<DecodedImage> {
    if data.is_empty() {
        return Err(anyhow!("empty image data for {name}"));
    }

    let reader = if let Some(format) = infer_format(Path::new(name)) {
        ImageReader::with_format(Cursor::new(data), format)
    } else {
        ImageReader::new(Cursor::new(data)).with_guessed_format().context("guessing image format")?
    };

    let mut decoder =
        reader.into_decoder().with_context(|| format!("constructing decoder for {name}"))?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let icc_profile = decoder.icc_profile().unwrap_or(None);

    let mut image =
        DynamicImage::from_decoder(decoder).with_context(|| format!("decoding image {name}"))?;
    if orientation != Orientation::NoTransforms {
        image.apply_orientation(orientation);
    }

    let mut rgba = image.into_rgba8();

    if let Some(profile) = icc_profile {
        if let Err(err) = convert_to_srgb_in_place(&mut rgba, &profile) {
            warn!(target: "codec::image", "failed to convert ICC profile for {name}: {err}");
        }
    }

    let dimensions = ImageDimensions { width: rgba.width(), height: rgba.height() };
    Ok(DecodedImage { dimensions, pixels: rgba.into_raw() })
}

/// Read image dimensions from the header without decoding pixels.
pub fn probe_dimensions(name: &str, data: &[u8]) -> Result<ImageDimensions> {
    let reader = match infer_format(Path::new(name)) {
        Some(format) => ImageReader::with_format(Cursor::new(data), format),
        None => ImageReader::new(Cursor::new(data)).with_guessed_format().context("guessing image format")?,
    };
    let (width, height) = reader.into_dimensions().with_context(|| format!("reading dimensions of {name}"))?;
    Ok(ImageDimensions { width, height })
}

/// Encode as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>> {
    ensure!(image.width() > 0 && image.height() > 0, "cannot encode an empty image");

    let rgb: Vec<u8> = image.pixels.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&rgb, image.width(), image.height(), ExtendedColorType::Rgb8)
        .context("encoding jpeg")?;
    Ok(out)
}

fn infer_format(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| ImageFormat::from_extension(&ext))
}

fn convert_to_srgb_in_place(image: &mut RgbaImage, profile_bytes: &[u8]) -> Result<()> {
    let src_profile = ColorProfile::new_from_slice(profile_bytes)
        .map_err(|err| anyhow!("invalid ICC profile: {err}"))?;
    let dest_profile = ColorProfile::new_srgb();
    let raw = image.as_mut();

    match src_profile.create_transform_8bit(
        Layout::Rgba,
        &dest_profile,
        Layout::Rgba,
        TransformOptions::default(),
    ) {
        Ok(transform) => {
            let mut dst = vec![0u8; raw.len()];
            transform.transform(&raw[..], &mut dst).map_err(|err| anyhow!("icc transform failed: {err}"))?;
            raw.copy_from_slice(&dst);
            Ok(())
        }
        // Grey and some CMYK-derived profiles only offer RGB layouts.
        Err(CmsError::InvalidLayout) => {
            let rgb: Vec<u8> = raw.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
            let mut dst_rgb = vec![0u8; rgb.len()];
            let transform = src_profile
                .create_transform_8bit(Layout::Rgb, &dest_profile, Layout::Rgb, TransformOptions::default())
                .map_err(|err| anyhow!("icc transform setup failed: {err}"))?;
            transform.transform(&rgb, &mut dst_rgb).map_err(|err| anyhow!("icc transform failed: {err}"))?;
            for (rgba_px, rgb_px) in raw.chunks_exact_mut(4).zip(dst_rgb.chunks_exact(3)) {
                rgba_px[..3].copy_from_slice(rgb_px);
            }
            Ok(())
        }
        Err(err) => Err(anyhow!("icc transform setup failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use moxcms::RenderingIntent;

    fn quadrants() -> ImageBuffer<Rgba<u8>, Vec<u8>> {
        ImageBuffer::from_fn(2, 2, |x, y| match (x, y) {
            (0, 0) => Rgba([255, 0, 0, 255]),
            (1, 0) => Rgba([0, 255, 0, 255]),
            (0, 1) => Rgba([0, 0, 255, 255]),
            _ => Rgba([255, 255, 0, 255]),
        })
    }

    fn encode(image: &ImageBuffer<Rgba<u8>, Vec<u8>>, format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image.clone()).write_to(&mut cursor, format).expect("encode sample");
        cursor.into_inner()
    }

    #[test]
    fn decodes_png_by_extension() {
        let decoded = decode_primary("pano.png", &encode(&quadrants(), ImageFormat::Png)).unwrap();
        assert_eq!(decoded.dimensions, ImageDimensions { width: 2, height: 2 });
        assert_eq!(decoded.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(decoded.pixel(1, 1), [255, 255, 0, 255]);
    }

    #[test]
    fn probes_dimensions_without_decoding() {
        let bytes = encode(&ImageBuffer::from_pixel(8, 4, Rgba([0, 0, 0, 255])), ImageFormat::Png);
        assert_eq!(probe_dimensions("pano.png", &bytes).unwrap(), ImageDimensions { width: 8, height: 4 });
        assert!(probe_dimensions("pano.png", b"nope").is_err());
    }

    #[test]
    fn sniffs_format_without_extension() {
        let decoded = decode_primary("upload", &encode(&quadrants(), ImageFormat::Png)).unwrap();
        assert_eq!(decoded.pixels().len(), 16);
    }

    #[test]
    fn jpeg_roundtrip_keeps_dimensions() {
        let image = DecodedImage::blank(16, 8);
        let bytes = encode_jpeg(&image, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = decode_primary("tile.jpg", &bytes).unwrap();
        assert_eq!(decoded.dimensions, ImageDimensions { width: 16, height: 8 });
    }

    #[test]
    fn crop_clips_to_bounds() {
        let decoded = decode_primary("q.png", &encode(&quadrants(), ImageFormat::Png)).unwrap();
        let right = decoded.crop(1, 0, 5, 5).unwrap();
        assert_eq!(right.dimensions, ImageDimensions { width: 1, height: 2 });
        assert_eq!(right.pixel(0, 0), [0, 255, 0, 255]);
        assert!(decoded.crop(2, 0, 1, 1).is_err());
    }

    #[test]
    fn stack_vertical_concatenates_rows() {
        let stacked = DecodedImage::stack_vertical(&[DecodedImage::blank(4, 4), DecodedImage::blank(4, 4)])
            .unwrap();
        assert_eq!(stacked.dimensions, ImageDimensions { width: 4, height: 8 });
        assert!(DecodedImage::stack_vertical(&[DecodedImage::blank(4, 4), DecodedImage::blank(2, 4)]).is_err());
    }

    #[test]
    fn icc_conversion_preserves_alpha() {
        let mut image: RgbaImage = ImageBuffer::from_pixel(1, 1, Rgba([200, 100, 50, 128]));
        let mut profile = ColorProfile::new_display_p3();
        profile.rendering_intent = RenderingIntent::RelativeColorimetric;
        let icc_bytes = profile.encode().expect("encode profile");

        convert_to_srgb_in_place(&mut image, &icc_bytes).expect("icc conversion");

        let pixel = image.get_pixel(0, 0);
        assert_eq!(pixel[3], 128);
        assert_ne!(&pixel.0[..3], &[200, 100, 50]);
    }

    #[test]
    fn rejects_empty_input() {
        let err = decode_primary("empty.png", &[]).unwrap_err();
        assert!(err.to_string().contains("empty image data"));
    }
}
