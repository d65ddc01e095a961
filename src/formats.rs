/// Image format utilities and type-safe format handling
///
/// Every output format a transform can produce belongs to one family, and the
/// family decides which encoding path the conversion engine takes.
use crate::constants::EXOTIC_EXTENSIONS;
use image::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// How a target format is produced from a raster surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    /// Encoded directly by the built-in raster encoders
    Raster,
    /// Round-tripped through an optional codec strategy
    Exotic,
    /// The encoded raster is wrapped as a page of a document
    Document,
}

/// Formats a conversion can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Heic,
    Pdf,
}

impl TargetFormat {
    /// Returns the file extension used for downloads
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::WebP => "webp",
            TargetFormat::Gif => "gif",
            TargetFormat::Heic => "heic",
            TargetFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Png => "image/png",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::WebP => "image/webp",
            TargetFormat::Gif => "image/gif",
            TargetFormat::Heic => "image/heic",
            TargetFormat::Pdf => "application/pdf",
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            TargetFormat::Png | TargetFormat::Jpeg | TargetFormat::WebP | TargetFormat::Gif => {
                FormatFamily::Raster
            }
            TargetFormat::Heic => FormatFamily::Exotic,
            TargetFormat::Pdf => FormatFamily::Document,
        }
    }

    /// Whether the encoded output can carry transparency.
    ///
    /// Exotic and document targets go through an intermediate JPEG, so they
    /// are opaque as well.
    pub fn supports_alpha(&self) -> bool {
        matches!(
            self,
            TargetFormat::Png | TargetFormat::WebP | TargetFormat::Gif
        )
    }

    /// The built-in encoder for raster targets
    pub fn to_image_format(&self) -> Option<ImageFormat> {
        match self {
            TargetFormat::Png => Some(ImageFormat::Png),
            TargetFormat::Jpeg => Some(ImageFormat::Jpeg),
            TargetFormat::WebP => Some(ImageFormat::WebP),
            TargetFormat::Gif => Some(ImageFormat::Gif),
            TargetFormat::Heic | TargetFormat::Pdf => None,
        }
    }

    pub fn all_formats() -> Vec<TargetFormat> {
        vec![
            TargetFormat::Png,
            TargetFormat::Jpeg,
            TargetFormat::WebP,
            TargetFormat::Gif,
            TargetFormat::Heic,
            TargetFormat::Pdf,
        ]
    }

    /// Get format names for CLI help text
    pub fn format_names() -> Vec<&'static str> {
        vec!["png", "jpg", "webp", "gif", "heic", "pdf"]
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetFormat::Png => "PNG",
            TargetFormat::Jpeg => "JPEG",
            TargetFormat::WebP => "WebP",
            TargetFormat::Gif => "GIF",
            TargetFormat::Heic => "HEIC",
            TargetFormat::Pdf => "PDF",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpeg),
            "webp" => Ok(TargetFormat::WebP),
            "gif" => Ok(TargetFormat::Gif),
            "heic" | "heif" => Ok(TargetFormat::Heic),
            "pdf" => Ok(TargetFormat::Pdf),
            other => Err(format!(
                "unsupported format '{}', expected one of: {}",
                other,
                TargetFormat::format_names().join(", ")
            )),
        }
    }
}

/// Returns the lowercase extension of a file name, if any
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_lowercase())
}

/// Strips the last extension from a file name: `holiday.final.png` -> `holiday.final`
pub fn base_name(file_name: &str) -> String {
    let name = file_name
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(file_name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Camera-native containers that need normalization before they can be decoded
pub fn is_exotic(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| EXOTIC_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Best-effort MIME type for an upload, from its extension
pub fn mime_from_file_name(file_name: &str) -> Option<String> {
    let ext = extension_of(file_name)?;
    if EXOTIC_EXTENSIONS.contains(&ext.as_str()) {
        return Some(format!("image/{}", ext));
    }
    ImageFormat::from_extension(&ext).map(|format| format.to_mime_type().to_string())
}
