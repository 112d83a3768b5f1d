//! Equirectangular to cube-face reprojection.
//!
//! Faces follow the viewer's convention: the camera looks down -z at yaw 0, +x is right and
//! +y is up. Each face pixel is mapped to a direction, converted to yaw and pitch, and
//! sampled bilinearly from the equirectangular source with horizontal wrap-around.

use std::f64::consts::{PI, TAU};

use anyhow::ensure;

use crate::codec::DecodedImage;
use crate::types::Face;

use super::Result;

/// Render one cube face of `size` pixels from an equirectangular image.
pub fn equirect_to_face(source: &DecodedImage, face: Face, size: u32) -> Result<DecodedImage> {
    ensure!(source.width() > 1 && source.height() > 1, "equirectangular source is too small");
    ensure!(size > 0, "face size must be positive");

    let mut out = Vec::with_capacity(size as usize * size as usize * 4);
    let scale = 2.0 / f64::from(size);

    for j in 0..size {
        let b = (f64::from(j) + 0.5) * scale - 1.0;
        for i in 0..size {
            let a = (f64::from(i) + 0.5) * scale - 1.0;
            let (x, y, z) = direction(face, a, b);
            let yaw = x.atan2(-z);
            let pitch = y.atan2((x * x + z * z).sqrt());

            let u = (yaw / TAU + 0.5) * f64::from(source.width()) - 0.5;
            let v = (0.5 - pitch / PI) * f64::from(source.height()) - 0.5;
            out.extend_from_slice(&sample_bilinear(source, u, v));
        }
    }

    Ok(DecodedImage { dimensions: crate::types::ImageDimensions { width: size, height: size }, pixels: out })
}

/// Direction through face coordinate `(a, b)`, both in `[-1, 1]` with `b` growing downwards.
fn direction(face: Face, a: f64, b: f64) -> (f64, f64, f64) {
    match face {
        Face::Front => (a, -b, -1.0),
        Face::Right => (1.0, -b, a),
        Face::Back => (-a, -b, 1.0),
        Face::Left => (-1.0, -b, -a),
        Face::Up => (a, 1.0, b),
        Face::Down => (a, -1.0, -b),
    }
}

fn sample_bilinear(source: &DecodedImage, u: f64, v: f64) -> [u8; 4] {
    let width = i64::from(source.width());
    let height = i64::from(source.height());

    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;

    let wrap_x = |x: i64| x.rem_euclid(width) as u32;
    let clamp_y = |y: i64| y.clamp(0, height - 1) as u32;

    let (x0, y0) = (x0 as i64, y0 as i64);
    let p00 = source.pixel(wrap_x(x0), clamp_y(y0));
    let p10 = source.pixel(wrap_x(x0 + 1), clamp_y(y0));
    let p01 = source.pixel(wrap_x(x0), clamp_y(y0 + 1));
    let p11 = source.pixel(wrap_x(x0 + 1), clamp_y(y0 + 1));

    let mut px = [0u8; 4];
    for c in 0..4 {
        let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
        let bottom = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
        px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    px
}
