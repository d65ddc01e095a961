use crate::codecs::{CodecRegistry, RasterPayload};
use crate::constants::{DEFAULT_CONVERSION_QUALITY, OPAQUE_BACKGROUND};
use crate::error::ConversionError;
use crate::formats::{FormatFamily, TargetFormat};
use crate::session::{EncodedImage, SourceAsset};
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{
    imageops, DynamicImage, ExtendedColorType, GenericImageView, ImageResult, RgbImage, Rgba,
    RgbaImage,
};
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ConversionOptions {
    /// Quality for lossy targets, in (0, 1]
    pub quality: f32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_CONVERSION_QUALITY,
        }
    }
}

/// Maps a quality dial in (0, 1] onto the 1..=100 scale of the JPEG encoder
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Draws `image` unscaled at the origin of a fresh surface of the same size.
///
/// With `opaque_background` the surface is pre-filled white, so transparent
/// source pixels come out white instead of black once alpha is dropped.
pub fn draw_surface(image: &DynamicImage, opaque_background: bool) -> RgbaImage {
    if !opaque_background {
        return image.to_rgba8();
    }
    let (width, height) = image.dimensions();
    let mut surface = RgbaImage::from_pixel(width, height, Rgba(OPAQUE_BACKGROUND));
    imageops::overlay(&mut surface, &image.to_rgba8(), 0, 0);
    surface
}

/// Encodes a surface as baseline JPEG; any alpha left on the surface is dropped
pub fn encode_jpeg(surface: &RgbaImage, quality: f32) -> ImageResult<Vec<u8>> {
    let rgb: RgbImage = surface.convert();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality_percent(quality));
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

fn encode_raster(
    surface: &RgbaImage,
    target: TargetFormat,
    quality: f32,
) -> Result<Vec<u8>, ConversionError> {
    let encode_failed = |reason: String| ConversionError::EncodeFailed {
        format: target.to_string(),
        reason,
    };

    match target {
        TargetFormat::Jpeg => {
            encode_jpeg(surface, quality).map_err(|e| encode_failed(e.to_string()))
        }
        _ => {
            let format = target
                .to_image_format()
                .ok_or_else(|| encode_failed("no built-in encoder".to_string()))?;
            let mut out = Cursor::new(Vec::new());
            surface
                .write_to(&mut out, format)
                .map_err(|e| encode_failed(e.to_string()))?;
            Ok(out.into_inner())
        }
    }
}

/// Re-encodes the source image into `target`.
///
/// Dimensions are preserved for every target. Transparent pixels become white
/// for targets that cannot carry alpha.
pub fn convert(
    source: &SourceAsset,
    target: TargetFormat,
    options: &ConversionOptions,
    codecs: &CodecRegistry,
) -> Result<EncodedImage, ConversionError> {
    if source.bytes.is_empty() {
        return Err(ConversionError::NoInput);
    }

    let decoded = image::load_from_memory(&source.bytes)
        .map_err(|e| ConversionError::DecodeFailed(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    debug!(width, height, %target, "decoded source for conversion");

    let surface = draw_surface(&decoded, !target.supports_alpha());

    let bytes = match target.family() {
        FormatFamily::Raster => encode_raster(&surface, target, options.quality)?,
        FormatFamily::Exotic => {
            let intermediate = encode_raster(&surface, TargetFormat::Jpeg, options.quality)?;
            let payload = RasterPayload {
                bytes: &intermediate,
                mime: TargetFormat::Jpeg.mime_type(),
                width,
                height,
            };
            codecs
                .get(target)
                .and_then(|codec| codec.encode(&payload))
                .map_err(|err| ConversionError::ExoticEncodeFailed {
                    format: target.to_string(),
                    source: err,
                })?
        }
        FormatFamily::Document => {
            let page = encode_raster(&surface, TargetFormat::Jpeg, options.quality)?;
            let payload = RasterPayload {
                bytes: &page,
                mime: TargetFormat::Jpeg.mime_type(),
                width,
                height,
            };
            codecs
                .get(target)
                .and_then(|packager| packager.encode(&payload))
                .map_err(|err| ConversionError::PackagingFailed {
                    format: target.to_string(),
                    source: err,
                })?
        }
    };

    Ok(EncodedImage {
        bytes,
        mime: target.mime_type().to_string(),
        extension: target.extension().to_string(),
        dimensions: Some((width, height)),
    })
}
