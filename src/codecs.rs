//! Optional codec strategies, keyed by target format.
//!
//! The built-in raster encoders cover PNG, JPEG, WebP and GIF. Everything
//! else (camera-native containers, page documents) goes through a strategy
//! looked up here. Strategies are created on first use and then shared; a
//! format with no registered strategy is an ordinary error for the caller.

use crate::error::CodecError;
use crate::formats::TargetFormat;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An already-encoded raster handed to a strategy
#[derive(Debug, Clone, Copy)]
pub struct RasterPayload<'a> {
    pub bytes: &'a [u8],
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

pub trait CodecStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decodes a container into pixels. Packaging-only strategies keep the default.
    fn decode(&self, _bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        Err(CodecError::Unsupported(self.name(), "decoding"))
    }

    fn encode(&self, raster: &RasterPayload<'_>) -> Result<Vec<u8>, CodecError>;
}

type Factory = Box<dyn Fn() -> Result<Arc<dyn CodecStrategy>, CodecError> + Send + Sync>;

struct Slot {
    factory: Factory,
    instance: OnceCell<Arc<dyn CodecStrategy>>,
}

#[derive(Default)]
pub struct CodecRegistry {
    slots: HashMap<TargetFormat, Slot>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("formats", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// PDF packaging, plus HEIF when built with the `heif` feature
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(TargetFormat::Pdf, || {
            Ok(Arc::new(PdfPackager) as Arc<dyn CodecStrategy>)
        });
        #[cfg(feature = "heif")]
        registry.register(TargetFormat::Heic, || {
            Ok(Arc::new(heif::LibheifCodec::new()) as Arc<dyn CodecStrategy>)
        });
        registry
    }

    /// Registers (or replaces) the strategy factory for `format`
    pub fn register<F>(&mut self, format: TargetFormat, factory: F)
    where
        F: Fn() -> Result<Arc<dyn CodecStrategy>, CodecError> + Send + Sync + 'static,
    {
        self.slots.insert(
            format,
            Slot {
                factory: Box::new(factory),
                instance: OnceCell::new(),
            },
        );
    }

    pub fn is_registered(&self, format: TargetFormat) -> bool {
        self.slots.contains_key(&format)
    }

    /// Whether the strategy for `format` has been created yet
    pub fn is_loaded(&self, format: TargetFormat) -> bool {
        self.slots
            .get(&format)
            .map(|slot| slot.instance.get().is_some())
            .unwrap_or(false)
    }

    /// Returns the strategy for `format`, creating it on first use.
    ///
    /// A factory that fails is not cached; the next lookup tries again.
    pub fn get(&self, format: TargetFormat) -> Result<Arc<dyn CodecStrategy>, CodecError> {
        let slot = self
            .slots
            .get(&format)
            .ok_or_else(|| CodecError::NotRegistered(format.to_string()))?;
        slot.instance
            .get_or_try_init(|| {
                debug!(%format, "loading codec strategy");
                (slot.factory)()
            })
            .map(Arc::clone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
}

impl PageOrientation {
    /// Square pages count as portrait
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if height >= width {
            PageOrientation::Portrait
        } else {
            PageOrientation::Landscape
        }
    }
}

/// Wraps a JPEG raster as the single page of a PDF, one user unit per pixel
#[derive(Debug, Default)]
pub struct PdfPackager;

impl CodecStrategy for PdfPackager {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn encode(&self, raster: &RasterPayload<'_>) -> Result<Vec<u8>, CodecError> {
        if raster.mime != "image/jpeg" {
            return Err(CodecError::Failed(format!(
                "pdf pages embed JPEG rasters, got {}",
                raster.mime
            )));
        }
        if raster.width == 0 || raster.height == 0 {
            return Err(CodecError::Failed("empty raster".to_string()));
        }
        package_single_page(raster)
    }
}

fn package_single_page(raster: &RasterPayload<'_>) -> Result<Vec<u8>, CodecError> {
    let failed = |e: lopdf::Error| CodecError::Failed(e.to_string());
    let width = i64::from(raster.width);
    let height = i64::from(raster.height);
    debug!(
        width,
        height,
        orientation = ?PageOrientation::for_dimensions(raster.width, raster.height),
        "packaging pdf page"
    );

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        raster.bytes.to_vec(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_stream = content.encode().map_err(failed)?;
    let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content_stream));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| CodecError::Failed(e.to_string()))?;
    Ok(out)
}

#[cfg(feature = "heif")]
mod heif {
    use super::{CodecStrategy, RasterPayload};
    use crate::constants::DEFAULT_CONVERSION_QUALITY;
    use crate::error::CodecError;
    use image::{DynamicImage, RgbaImage};
    use libheif_rs::{
        Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif,
        RgbChroma,
    };

    fn failed(e: impl std::fmt::Display) -> CodecError {
        CodecError::Failed(e.to_string())
    }

    pub struct LibheifCodec {
        lib: LibHeif,
    }

    impl LibheifCodec {
        pub fn new() -> Self {
            Self { lib: LibHeif::new() }
        }
    }

    impl CodecStrategy for LibheifCodec {
        fn name(&self) -> &'static str {
            "libheif"
        }

        fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
            let ctx = HeifContext::read_from_bytes(bytes).map_err(failed)?;
            let handle = ctx.primary_image_handle().map_err(failed)?;
            let image = self
                .lib
                .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
                .map_err(failed)?;
            let planes = image.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| failed("decoded image has no interleaved plane"))?;

            let (width, height) = (plane.width, plane.height);
            let row_len = width as usize * 4;
            let mut pixels = Vec::with_capacity(row_len * height as usize);
            for row in plane.data.chunks(plane.stride).take(height as usize) {
                let row = row
                    .get(..row_len)
                    .ok_or_else(|| failed("decoded row is shorter than the image width"))?;
                pixels.extend_from_slice(row);
            }
            RgbaImage::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| failed("decoded plane is truncated"))
        }

        fn encode(&self, raster: &RasterPayload<'_>) -> Result<Vec<u8>, CodecError> {
            let rgb = image::load_from_memory(raster.bytes)
                .map_err(failed)?
                .to_rgb8();
            let (width, height) = rgb.dimensions();

            let mut heif_image =
                Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).map_err(failed)?;
            heif_image
                .create_plane(Channel::Interleaved, width, height, 8)
                .map_err(failed)?;
            {
                let planes = heif_image.planes_mut();
                let plane = planes
                    .interleaved
                    .ok_or_else(|| failed("encoder image has no interleaved plane"))?;
                let row_len = width as usize * 3;
                for (y, row) in rgb.as_raw().chunks(row_len).enumerate() {
                    let start = y * plane.stride;
                    plane
                        .data
                        .get_mut(start..start + row_len)
                        .ok_or_else(|| failed("encoder plane is smaller than the image"))?
                        .copy_from_slice(row);
                }
            }

            let mut ctx = HeifContext::new().map_err(failed)?;
            let mut encoder = self
                .lib
                .encoder_for_format(CompressionFormat::Hevc)
                .map_err(failed)?;
            encoder
                .set_quality(EncoderQuality::Lossy(
                    (DEFAULT_CONVERSION_QUALITY * 100.0) as u8,
                ))
                .map_err(failed)?;
            ctx.encode_image(&heif_image, &mut encoder, None)
                .map_err(failed)?;
            ctx.write_to_bytes().map_err(failed)
        }
    }

}
