use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("No file supplied")]
    Empty,

    #[error("Not an image: {file_name} ({mime})")]
    NotAnImage { file_name: String, mime: String },

    #[error("Unsupported container {extension}: {reason}")]
    UnsupportedContainer { extension: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ingestion task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("No source image to convert")]
    NoInput,

    #[error("Failed to decode source image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode {format}: {reason}")]
    EncodeFailed { format: String, reason: String },

    #[error("Exotic encoder for {format} failed: {source}")]
    ExoticEncodeFailed {
        format: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to package {format} document: {source}")]
    PackagingFailed {
        format: String,
        #[source]
        source: CodecError,
    },
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("No source image to compress")]
    NoInput,

    #[error("Invalid quality value: {0}. Must be in (0, 1]")]
    InvalidQuality(f32),

    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    #[error("Failed to decode source image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode compressed image: {0}")]
    EncodeFailed(String),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Cannot fit image into {0} bytes")]
    BudgetUnreachable(u64),
}

#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("No image provided")]
    NoInput,

    #[error("You have run out of free credits")]
    QuotaExceeded,

    #[error("{message}")]
    ServiceRejected { status: u16, message: String },

    #[error("Background removal service unreachable: {0}")]
    TransportFailure(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("No codec registered for {0}")]
    NotRegistered(String),

    #[error("Codec {0} failed to initialize: {1}")]
    Unavailable(String, String),

    #[error("{0} does not support {1}")]
    Unsupported(&'static str, &'static str),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("There is no result to download")]
    NoResult,

    #[error("Result handle {0} is no longer live")]
    HandleRevoked(String),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing API key; set {0} or pass --api-key")]
    MissingApiKey(&'static str),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Any failure of a single transform attempt. None of these is fatal to the session.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Remote(#[from] RemoteServiceError),

    #[error("Background removal is not configured: {0}")]
    RemoteNotConfigured(String),

    #[error("Transform task aborted: {0}")]
    Aborted(String),
}

pub type Result<T, E = TransformError> = std::result::Result<T, E>;
