#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_tools::{CodecError, CodecRegistry, CodecStrategy, RasterPayload, TargetFormat, Upload};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Marker the fake camera codec puts in front of its payload
pub const FAKE_HEIF_MAGIC: &[u8] = b"FAKEHEIF";

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// An opaque gradient, so lossy encoders have something to work with
pub fn opaque_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

/// A red square in the middle of a fully transparent canvas
pub fn transparent_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
        if inside {
            Rgba([200, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

/// Pseudo-random pixels that compress poorly
pub fn noisy_image(width: u32, height: u32) -> DynamicImage {
    let mut state = 0x9e37_79b9u32;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    }))
}

pub fn png_upload(name: &str, img: &DynamicImage) -> Upload {
    Upload::new(name, encode(img, ImageFormat::Png))
}

pub fn jpeg_upload(name: &str, img: &DynamicImage) -> Upload {
    Upload::new(name, encode(img, ImageFormat::Jpeg))
}

/// A stand-in camera container: a magic prefix followed by a PNG or JPEG payload
pub struct FakeHeifCodec;

impl CodecStrategy for FakeHeifCodec {
    fn name(&self) -> &'static str {
        "fake-heif"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        let payload = bytes
            .strip_prefix(FAKE_HEIF_MAGIC)
            .ok_or_else(|| CodecError::Failed("missing container magic".to_string()))?;
        image::load_from_memory(payload).map_err(|e| CodecError::Failed(e.to_string()))
    }

    fn encode(&self, raster: &RasterPayload<'_>) -> Result<Vec<u8>, CodecError> {
        let mut out = FAKE_HEIF_MAGIC.to_vec();
        out.extend_from_slice(raster.bytes);
        Ok(out)
    }
}

pub fn fake_heif_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut out = FAKE_HEIF_MAGIC.to_vec();
    out.extend(encode(img, ImageFormat::Png));
    out
}

pub fn registry_with_fake_heif() -> CodecRegistry {
    let mut codecs = CodecRegistry::with_defaults();
    codecs.register(TargetFormat::Heic, || {
        Ok(Arc::new(FakeHeifCodec) as Arc<dyn CodecStrategy>)
    });
    codecs
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn write_image(dir: &Path, name: &str, img: &DynamicImage, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode(img, format)).unwrap();
    path
}
