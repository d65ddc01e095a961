use crate::codecs::CodecRegistry;
use crate::constants::DEFAULT_CONVERSION_QUALITY;
use crate::convert::{draw_surface, encode_jpeg};
use crate::error::IngestionError;
use crate::formats::{self, TargetFormat};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const UNKNOWN_MIME: &str = "application/octet-stream";

/// A user-supplied file, before any validation
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Builds an upload whose MIME type is guessed from `file_name`
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = formats::mime_from_file_name(&file_name);
        Self {
            file_name,
            mime,
            bytes,
        }
    }

    /// Overrides the declared MIME type
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub async fn from_path(path: &Path) -> Result<Self, IngestionError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Bytes accepted as the new source image, not yet bound to a handle
#[derive(Debug, Clone)]
pub struct IngestedSource {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    pub file_name: String,
    pub base_name: String,
    /// Set when an exotic container was decoded into a displayable raster
    pub normalized: bool,
}

/// Accepts an upload as a source image.
///
/// Ordinary images are taken as-is; nothing beyond the MIME type is checked
/// here, so a corrupt file is only caught when a transform decodes it.
/// Camera-native containers are decoded through the registered exotic codec
/// and re-encoded as JPEG.
pub fn ingest(
    upload: Option<Upload>,
    codecs: &CodecRegistry,
) -> Result<IngestedSource, IngestionError> {
    let upload = upload.ok_or(IngestionError::Empty)?;
    if upload.bytes.is_empty() {
        return Err(IngestionError::Empty);
    }

    let base_name = formats::base_name(&upload.file_name);

    if formats::is_exotic(&upload.file_name) {
        let bytes = normalize_exotic(&upload, codecs)?;
        debug!(
            file = %upload.file_name,
            original = upload.bytes.len(),
            normalized = bytes.len(),
            "normalized exotic container"
        );
        return Ok(IngestedSource {
            bytes: Arc::from(bytes),
            mime: TargetFormat::Jpeg.mime_type().to_string(),
            file_name: upload.file_name,
            base_name,
            normalized: true,
        });
    }

    let mime = upload.mime.unwrap_or_else(|| UNKNOWN_MIME.to_string());
    if !mime.starts_with("image/") {
        return Err(IngestionError::NotAnImage {
            file_name: upload.file_name,
            mime,
        });
    }

    debug!(file = %upload.file_name, %mime, size = upload.bytes.len(), "accepted upload");
    Ok(IngestedSource {
        bytes: Arc::from(upload.bytes),
        mime,
        file_name: upload.file_name,
        base_name,
        normalized: false,
    })
}

fn normalize_exotic(upload: &Upload, codecs: &CodecRegistry) -> Result<Vec<u8>, IngestionError> {
    let extension = formats::extension_of(&upload.file_name).unwrap_or_default();
    let unsupported = |reason: String| IngestionError::UnsupportedContainer {
        extension: extension.clone(),
        reason,
    };

    let codec = codecs
        .get(TargetFormat::Heic)
        .map_err(|e| unsupported(e.to_string()))?;
    let decoded = codec
        .decode(&upload.bytes)
        .map_err(|e| unsupported(e.to_string()))?;

    let surface = draw_surface(&decoded, true);
    encode_jpeg(&surface, DEFAULT_CONVERSION_QUALITY).map_err(|e| unsupported(e.to_string()))
}
