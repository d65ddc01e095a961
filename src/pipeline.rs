use crate::codecs::CodecRegistry;
use crate::compress::{compress, CompressionOptions};
use crate::convert::{convert, ConversionOptions};
use crate::error::{IngestionError, TransformError};
use crate::ingest::{ingest, Upload};
use crate::remote::RemoveBgClient;
use crate::session::{Completion, EncodedImage, Session, SourceAsset, TransformRequest};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::debug;

/// Runs transforms for a [`Session`].
///
/// Decoding and encoding happen on the blocking pool; the remote call is the
/// only stage awaited in place.
#[derive(Debug, Clone)]
pub struct Pipeline {
    codecs: Arc<CodecRegistry>,
    conversion: ConversionOptions,
    compression: CompressionOptions,
    remote: Option<Arc<RemoveBgClient>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn aborted(err: JoinError) -> TransformError {
    TransformError::Aborted(err.to_string())
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            codecs: Arc::new(CodecRegistry::with_defaults()),
            conversion: ConversionOptions::default(),
            compression: CompressionOptions::default(),
            remote: None,
        }
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn with_conversion(mut self, options: ConversionOptions) -> Self {
        self.conversion = options;
        self
    }

    pub fn with_compression(mut self, options: CompressionOptions) -> Self {
        self.compression = options;
        self
    }

    pub fn with_remote(mut self, client: RemoveBgClient) -> Self {
        self.remote = Some(Arc::new(client));
        self
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn compression(&self) -> &CompressionOptions {
        &self.compression
    }

    /// Ingests an upload and installs it as the session's source
    pub async fn ingest<'s>(
        &self,
        session: &'s mut Session,
        upload: Option<Upload>,
    ) -> Result<&'s SourceAsset, IngestionError> {
        let codecs = Arc::clone(&self.codecs);
        let ingested = tokio::task::spawn_blocking(move || ingest(upload, &codecs))
            .await
            .map_err(|e| IngestionError::Aborted(e.to_string()))??;
        Ok(session.install_source(ingested))
    }

    /// Produces the bytes for `request` without touching any session
    pub async fn execute(
        &self,
        source: SourceAsset,
        request: TransformRequest,
    ) -> Result<EncodedImage, TransformError> {
        debug!(%request, file = %source.file_name, "executing transform");
        match request {
            TransformRequest::Convert { target } => {
                let codecs = Arc::clone(&self.codecs);
                let options = self.conversion;
                let encoded = tokio::task::spawn_blocking(move || {
                    convert(&source, target, &options, &codecs)
                })
                .await
                .map_err(aborted)??;
                Ok(encoded)
            }
            TransformRequest::Compress { quality } => {
                let options = self.compression.with_quality(quality)?;
                let encoded = tokio::task::spawn_blocking(move || compress(&source, &options))
                    .await
                    .map_err(aborted)??;
                Ok(encoded)
            }
            TransformRequest::RemoveBackground => {
                let client = self.remote.as_ref().ok_or_else(|| {
                    TransformError::RemoteNotConfigured("no API key was supplied".to_string())
                })?;
                Ok(client.remove_background(&source).await?)
            }
        }
    }

    /// Begins, executes and completes one request against the session.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn run(
        &self,
        session: &mut Session,
        request: TransformRequest,
    ) -> Result<Completion, TransformError> {
        let ticket = session.begin(request)?;
        let encoded = self.execute(ticket.source.clone(), request).await?;
        Ok(session.complete(&ticket, encoded))
    }
}
