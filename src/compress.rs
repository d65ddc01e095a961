use crate::constants::{
    DEFAULT_COMPRESSION_QUALITY, DEFAULT_MAX_BYTES, DEFAULT_MAX_LONG_EDGE, DOWNSCALE_FACTOR,
    LIBDEFLATER_LEVEL, MAX_PALETTE_COLORS, MIN_COMPRESSION_QUALITY, MIN_PALETTE_COLORS,
    NEUQUANT_SAMPLE_FACTOR, OXIPNG_PRESET, QUALITY_STEP,
};
use crate::convert::{draw_surface, encode_jpeg};
use crate::error::CompressionError;
use crate::formats::TargetFormat;
use crate::session::{EncodedImage, SourceAsset};
use color_quant::NeuQuant;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use oxipng::{Deflaters, Options};
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOptions {
    /// Requested quality in (0, 1]; may be undercut to meet `max_bytes`
    pub quality: f32,
    pub max_long_edge: u32,
    pub max_bytes: u64,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_COMPRESSION_QUALITY,
            max_long_edge: DEFAULT_MAX_LONG_EDGE,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl CompressionOptions {
    pub fn new(
        quality: Option<f32>,
        max_long_edge: Option<u32>,
        max_bytes: Option<u64>,
    ) -> Result<Self, CompressionError> {
        let options = Self {
            quality: quality.unwrap_or(DEFAULT_COMPRESSION_QUALITY),
            max_long_edge: max_long_edge.unwrap_or(DEFAULT_MAX_LONG_EDGE),
            max_bytes: max_bytes.unwrap_or(DEFAULT_MAX_BYTES),
        };
        options.validate()?;
        Ok(options)
    }

    /// Same budgets, different quality dial
    pub fn with_quality(&self, quality: f32) -> Result<Self, CompressionError> {
        Self::new(Some(quality), Some(self.max_long_edge), Some(self.max_bytes))
    }

    pub fn validate(&self) -> Result<(), CompressionError> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(CompressionError::InvalidQuality(self.quality));
        }
        if self.max_long_edge == 0 {
            return Err(CompressionError::InvalidBudget(
                "maximum long edge must be at least 1 pixel".to_string(),
            ));
        }
        if self.max_bytes == 0 {
            return Err(CompressionError::InvalidBudget(
                "byte budget must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

/// The family a compressed result is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedFamily {
    Jpeg,
    Png,
    WebP,
}

impl CompressedFamily {
    /// Keeps the source family when it can be re-encoded, otherwise JPEG
    pub fn for_source(bytes: &[u8]) -> Self {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Png) => CompressedFamily::Png,
            Ok(ImageFormat::WebP) => CompressedFamily::WebP,
            _ => CompressedFamily::Jpeg,
        }
    }

    pub fn target(&self) -> TargetFormat {
        match self {
            CompressedFamily::Jpeg => TargetFormat::Jpeg,
            CompressedFamily::Png => TargetFormat::Png,
            CompressedFamily::WebP => TargetFormat::WebP,
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            CompressedFamily::Jpeg => ImageFormat::Jpeg,
            CompressedFamily::Png => ImageFormat::Png,
            CompressedFamily::WebP => ImageFormat::WebP,
        }
    }

    /// Whether `bytes` are already written in this family
    pub fn is_encoded_as(&self, bytes: &[u8]) -> bool {
        image::guess_format(bytes).ok() == Some(self.image_format())
    }
}

/// Palette size for the lossless families; `None` keeps every colour
pub fn palette_size(quality: f32) -> Option<usize> {
    if quality >= 1.0 {
        return None;
    }
    let colors = (MAX_PALETTE_COLORS as f32 * quality * quality).round() as usize;
    Some(colors.clamp(MIN_PALETTE_COLORS, MAX_PALETTE_COLORS))
}

/// Scales the image down so its long edge fits, preserving aspect ratio
pub fn fit_long_edge(img: DynamicImage, max_long_edge: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let long_edge = width.max(height);
    if long_edge <= max_long_edge {
        return img;
    }
    let scale = max_long_edge as f32 / long_edge as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    debug!(width, height, new_width, new_height, "fitting long edge");
    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

fn shrink(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    let new_width = ((width as f32 * DOWNSCALE_FACTOR) as u32).max(1);
    let new_height = ((height as f32 * DOWNSCALE_FACTOR) as u32).max(1);
    img.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Maps every pixel onto a learned palette of at most `colors` entries
fn reduce_palette(img: &DynamicImage, colors: usize) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let quant = NeuQuant::new(NEUQUANT_SAMPLE_FACTOR, colors, rgba.as_raw());
    for pixel in rgba.chunks_exact_mut(4) {
        quant.map_pixel(pixel);
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Snaps each colour channel to one of `levels` evenly spaced values. Alpha is kept.
fn posterize(img: &DynamicImage, levels: usize) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let step = 255.0 / (levels.max(2) - 1) as f32;
    for pixel in rgba.chunks_exact_mut(4) {
        for channel in pixel.iter_mut().take(3) {
            *channel = ((*channel as f32 / step).round() * step).round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

fn optimize_png(img: &DynamicImage) -> Result<Vec<u8>, CompressionError> {
    let mut raw = Cursor::new(Vec::new());
    img.write_to(&mut raw, ImageFormat::Png)
        .map_err(|e| CompressionError::EncodeFailed(e.to_string()))?;

    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.deflate = Deflaters::Libdeflater {
        compression: LIBDEFLATER_LEVEL,
    };
    oxipng::optimize_from_memory(&raw.into_inner(), &options)
        .map_err(|e| CompressionError::PngOptimization(e.to_string()))
}

fn encode_family(
    img: &DynamicImage,
    family: CompressedFamily,
    quality: f32,
) -> Result<Vec<u8>, CompressionError> {
    match family {
        CompressedFamily::Jpeg => encode_jpeg(&draw_surface(img, true), quality)
            .map_err(|e| CompressionError::EncodeFailed(e.to_string())),
        CompressedFamily::Png => match palette_size(quality) {
            Some(colors) => optimize_png(&reduce_palette(img, colors)),
            None => optimize_png(img),
        },
        CompressedFamily::WebP => {
            let reduced = palette_size(quality).map(|levels| posterize(img, levels));
            let mut out = Cursor::new(Vec::new());
            reduced
                .as_ref()
                .unwrap_or(img)
                .write_to(&mut out, ImageFormat::WebP)
                .map_err(|e| CompressionError::EncodeFailed(e.to_string()))?;
            Ok(out.into_inner())
        }
    }
}

/// Re-encodes the source within the long-edge and byte budgets.
///
/// The byte budget always wins: quality is lowered first, then the image is
/// shrunk until the result fits. A source that already meets both budgets is
/// handed back as-is whenever re-encoding would not make it smaller.
pub fn compress(
    source: &SourceAsset,
    options: &CompressionOptions,
) -> Result<EncodedImage, CompressionError> {
    if source.bytes.is_empty() {
        return Err(CompressionError::NoInput);
    }
    options.validate()?;

    let family = CompressedFamily::for_source(&source.bytes);
    let decoded = image::load_from_memory(&source.bytes)
        .map_err(|e| CompressionError::DecodeFailed(e.to_string()))?;
    let original_dimensions = decoded.dimensions();

    let mut img = fit_long_edge(decoded, options.max_long_edge);
    let source_ceiling = (img.dimensions() == original_dimensions
        && source.size() <= options.max_bytes
        && family.is_encoded_as(&source.bytes))
    .then(|| source.bytes.len());

    let target = family.target();
    let mut quality = options.quality;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let bytes = encode_family(&img, family, quality)?;
        let size = bytes.len() as u64;
        debug!(attempts, size, quality, ?family, "compression attempt");

        if source_ceiling.is_some_and(|ceiling| bytes.len() >= ceiling) {
            debug!(size = source.bytes.len(), "re-encoding would grow the source, keeping it");
            return Ok(EncodedImage {
                bytes: source.bytes.to_vec(),
                mime: target.mime_type().to_string(),
                extension: target.extension().to_string(),
                dimensions: Some(original_dimensions),
            });
        }

        if size <= options.max_bytes {
            return Ok(EncodedImage {
                bytes,
                mime: target.mime_type().to_string(),
                extension: target.extension().to_string(),
                dimensions: Some(img.dimensions()),
            });
        }

        if quality > MIN_COMPRESSION_QUALITY {
            quality = (quality - QUALITY_STEP).max(MIN_COMPRESSION_QUALITY);
            continue;
        }

        if img.dimensions() == (1, 1) {
            return Err(CompressionError::BudgetUnreachable(options.max_bytes));
        }
        img = shrink(&img);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::HandleRegistry;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        let mut state = 0x2545_f491u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        }))
    }

    fn source(img: &DynamicImage, format: ImageFormat) -> SourceAsset {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        let bytes: Arc<[u8]> = Arc::from(out.into_inner());
        SourceAsset {
            handle: HandleRegistry::new().allocate(Arc::clone(&bytes), "image/png"),
            bytes,
            mime: format.to_mime_type().to_string(),
            file_name: "sample".to_string(),
            base_name: "sample".to_string(),
        }
    }

    #[test]
    fn test_compression_options_default() {
        let options = CompressionOptions::new(None, None, None).unwrap();
        assert_eq!(options.quality, 0.8);
        assert_eq!(options.max_long_edge, 1920);
        assert_eq!(options.max_bytes, 1024 * 1024);
    }

    #[test]
    fn test_compression_options_invalid_quality() {
        for quality in [0.0, -0.5, 1.01, f32::NAN] {
            let result = CompressionOptions::new(Some(quality), None, None);
            assert!(matches!(result, Err(CompressionError::InvalidQuality(_))));
        }
        assert!(CompressionOptions::new(Some(1.0), None, None).is_ok());
    }

    #[test]
    fn test_compression_options_invalid_budget() {
        assert!(matches!(
            CompressionOptions::new(None, Some(0), None),
            Err(CompressionError::InvalidBudget(_))
        ));
        assert!(matches!(
            CompressionOptions::new(None, None, Some(0)),
            Err(CompressionError::InvalidBudget(_))
        ));
    }

    #[test]
    fn test_family_selection() {
        let png = source(&DynamicImage::new_rgb8(2, 2), ImageFormat::Png);
        let jpeg = source(&DynamicImage::new_rgb8(2, 2), ImageFormat::Jpeg);
        let gif = source(&DynamicImage::new_rgba8(2, 2), ImageFormat::Gif);
        assert_eq!(CompressedFamily::for_source(&png.bytes), CompressedFamily::Png);
        assert_eq!(CompressedFamily::for_source(&jpeg.bytes), CompressedFamily::Jpeg);
        assert_eq!(CompressedFamily::for_source(&gif.bytes), CompressedFamily::Jpeg);
        assert_eq!(CompressedFamily::for_source(b"??"), CompressedFamily::Jpeg);
    }

    #[test]
    fn test_fit_long_edge() {
        let img = fit_long_edge(DynamicImage::new_rgb8(4000, 2000), 1920);
        assert_eq!(img.dimensions(), (1920, 960));

        let img = fit_long_edge(DynamicImage::new_rgb8(1000, 3000), 1500);
        assert_eq!(img.dimensions(), (500, 1500));

        let img = fit_long_edge(DynamicImage::new_rgb8(800, 600), 1920);
        assert_eq!(img.dimensions(), (800, 600));
    }

    #[test]
    fn test_gif_source_falls_back_to_jpeg() {
        let src = source(&DynamicImage::new_rgba8(16, 16), ImageFormat::Gif);
        let out = compress(&src, &CompressionOptions::default()).unwrap();
        assert_eq!(out.mime, "image/jpeg");
        assert_eq!(out.extension, "jpg");
    }

    #[test]
    fn test_png_source_stays_png() {
        let src = source(&noisy_image(32, 32), ImageFormat::Png);
        let out = compress(&src, &CompressionOptions::default()).unwrap();
        assert_eq!(out.mime, "image/png");
        assert_eq!(out.dimensions, Some((32, 32)));
    }

    #[test]
    fn test_byte_budget_is_never_exceeded() {
        let src = source(&noisy_image(256, 256), ImageFormat::Jpeg);
        let options = CompressionOptions::new(Some(1.0), None, Some(8 * 1024)).unwrap();
        let out = compress(&src, &options).unwrap();
        assert!(out.bytes.len() as u64 <= 8 * 1024);
    }

    #[test]
    fn test_budget_shrinks_dimensions_after_quality_floor() {
        let src = source(&noisy_image(128, 128), ImageFormat::Png);
        let options = CompressionOptions::new(None, None, Some(1024)).unwrap();
        let out = compress(&src, &options).unwrap();
        assert!(out.bytes.len() as u64 <= 1024);
        assert_eq!(out.mime, "image/png");
        let (width, height) = out.dimensions.unwrap();
        assert!(width < 128 && height < 128);
    }

    #[test]
    fn test_palette_size() {
        assert_eq!(palette_size(1.0), None);
        assert_eq!(palette_size(0.9), Some(207));
        assert_eq!(palette_size(0.2), Some(10));
        assert_eq!(palette_size(0.05), Some(MIN_PALETTE_COLORS));
    }

    #[test]
    fn test_png_quality_reduces_size() {
        let src = source(&noisy_image(64, 64), ImageFormat::Png);
        let base = CompressionOptions::default();
        let high = compress(&src, &base.with_quality(0.9).unwrap()).unwrap();
        let low = compress(&src, &base.with_quality(0.2).unwrap()).unwrap();

        assert_eq!(low.mime, "image/png");
        assert!(low.bytes.len() < high.bytes.len());
        let decoded = image::load_from_memory(&low.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 64));
    }

    #[test]
    fn test_webp_quality_reduces_size() {
        let src = source(&noisy_image(64, 64), ImageFormat::WebP);
        let base = CompressionOptions::default();
        let high = compress(&src, &base.with_quality(0.9).unwrap()).unwrap();
        let low = compress(&src, &base.with_quality(0.2).unwrap()).unwrap();

        assert_eq!(low.mime, "image/webp");
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn test_compact_jpeg_never_grows() {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 30)
            .encode_image(&noisy_image(256, 256).to_rgb8())
            .unwrap();
        let bytes: Arc<[u8]> = Arc::from(out);
        let src = SourceAsset {
            handle: HandleRegistry::new().allocate(Arc::clone(&bytes), "image/jpeg"),
            bytes,
            mime: "image/jpeg".to_string(),
            file_name: "compact.jpg".to_string(),
            base_name: "compact".to_string(),
        };

        let result = compress(&src, &CompressionOptions::default()).unwrap();
        assert!(result.bytes.len() <= src.bytes.len());
        assert_eq!(result.mime, "image/jpeg");
        assert_eq!(result.dimensions, Some((256, 256)));
    }

    #[test]
    fn test_oversized_source_is_still_resized() {
        let src = source(&DynamicImage::new_rgb8(64, 32), ImageFormat::Png);
        let options = CompressionOptions::new(None, Some(16), None).unwrap();
        let out = compress(&src, &options).unwrap();
        assert_eq!(out.dimensions, Some((16, 8)));
    }

    #[test]
    fn test_unreachable_budget() {
        let src = source(&noisy_image(8, 8), ImageFormat::Jpeg);
        let options = CompressionOptions::new(None, None, Some(10)).unwrap();
        assert!(matches!(
            compress(&src, &options),
            Err(CompressionError::BudgetUnreachable(10))
        ));
    }

    #[test]
    fn test_corrupt_source() {
        let mut src = source(&DynamicImage::new_rgb8(1, 1), ImageFormat::Png);
        src.bytes = Arc::from(&b"garbage"[..]);
        assert!(matches!(
            compress(&src, &CompressionOptions::default()),
            Err(CompressionError::DecodeFailed(_))
        ));
    }
}
