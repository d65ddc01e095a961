//! Client for the remote background-removal service.
//!
//! One multipart POST per call and no retries. The provider answers with PNG
//! bytes on success or a JSON `errors` array on failure.

use crate::config::RemoveBgConfig;
use crate::constants::{
    API_KEY_HEADER, FALLBACK_SERVICE_ERROR, QUOTA_ERROR_CODE, REMOVE_BG_IMAGE_FIELD,
};
use crate::error::{ConfigError, RemoteServiceError};
use crate::formats::{is_exotic, TargetFormat};
use crate::session::{EncodedImage, SourceAsset};
use image::ImageReader;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::io::Cursor;
use tracing::{debug, instrument, warn};

const QUOTA_STATUS: u16 = 402;

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    errors: Vec<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    title: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoveBgClient {
    inner: Client,
    config: RemoveBgConfig,
}

impl RemoveBgClient {
    pub fn new(config: RemoveBgConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let inner = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &RemoveBgConfig {
        &self.config
    }

    /// Sends the source image to the provider and returns the cut-out as PNG
    #[instrument(skip(self, source), fields(file = %source.file_name, size = source.bytes.len()))]
    pub async fn remove_background(
        &self,
        source: &SourceAsset,
    ) -> Result<EncodedImage, RemoteServiceError> {
        if source.bytes.is_empty() {
            return Err(RemoteServiceError::NoInput);
        }

        let part = Part::bytes(source.bytes.to_vec())
            .file_name(upload_file_name(source))
            .mime_str(&source.mime)
            .map_err(|e| RemoteServiceError::TransportFailure(e.to_string()))?;
        let form = Form::new()
            .part(REMOVE_BG_IMAGE_FIELD, part)
            .text("size", self.config.size.clone());

        let response = self
            .inner
            .post(&self.config.endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_failure)?;
        debug!(status = status.as_u16(), body = body.len(), "provider responded");

        let bytes = interpret_response(status, &body)?;
        let dimensions = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());

        Ok(EncodedImage {
            bytes,
            mime: TargetFormat::Png.mime_type().to_string(),
            extension: TargetFormat::Png.extension().to_string(),
            dimensions,
        })
    }
}

fn transport_failure(err: reqwest::Error) -> RemoteServiceError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    warn!(%reason, "background removal transport failure");
    RemoteServiceError::TransportFailure(reason)
}

/// Maps a provider response onto the result bytes or the error taxonomy
pub fn interpret_response(status: StatusCode, body: &[u8]) -> Result<Vec<u8>, RemoteServiceError> {
    if status.is_success() {
        if body.is_empty() {
            return Err(RemoteServiceError::ServiceRejected {
                status: status.as_u16(),
                message: FALLBACK_SERVICE_ERROR.to_string(),
            });
        }
        return Ok(body.to_vec());
    }

    if status.as_u16() == QUOTA_STATUS {
        return Err(RemoteServiceError::QuotaExceeded);
    }

    let first = serde_json::from_slice::<ProviderErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next());

    match first {
        Some(ProviderError {
            code: Some(code), ..
        }) if code == QUOTA_ERROR_CODE => Err(RemoteServiceError::QuotaExceeded),
        Some(ProviderError { title, .. }) => Err(RemoteServiceError::ServiceRejected {
            status: status.as_u16(),
            message: title.unwrap_or_else(|| FALLBACK_SERVICE_ERROR.to_string()),
        }),
        None => Err(RemoteServiceError::ServiceRejected {
            status: status.as_u16(),
            message: FALLBACK_SERVICE_ERROR.to_string(),
        }),
    }
}

/// The file name sent with the image part.
///
/// Exotic containers were normalized to JPEG at ingestion, so their original
/// suffix no longer describes the bytes.
pub fn upload_file_name(source: &SourceAsset) -> String {
    if is_exotic(&source.file_name) {
        format!("{}.{}", source.base_name, TargetFormat::Jpeg.extension())
    } else {
        source.file_name.clone()
    }
}
