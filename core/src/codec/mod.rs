//! Image decoding and tile encoding.

pub mod image;

pub use image::{DecodedImage, decode_primary, encode_jpeg, probe_dimensions};

pub type Result<T> = crate::Result<T>;
