pub mod cli;
pub mod codecs;
pub mod compress;
pub mod config;
pub mod constants;
pub mod convert;
pub mod download;
pub mod error;
pub mod formats;
pub mod handles;
pub mod ingest;
pub mod logger;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod utils;

pub use codecs::{CodecRegistry, CodecStrategy, PageOrientation, PdfPackager, RasterPayload};
pub use compress::{compress, CompressedFamily, CompressionOptions};
pub use config::RemoveBgConfig;
pub use convert::{convert, draw_surface, ConversionOptions};
pub use download::{build_file_name, trigger_download};
pub use error::{
    CodecError, CompressionError, ConfigError, ConversionError, DownloadError, IngestionError,
    RemoteServiceError, Result, TransformError,
};
pub use formats::{FormatFamily, TargetFormat};
pub use handles::{HandleRegistry, ReferenceHandle};
pub use ingest::{ingest, IngestedSource, Upload};
pub use pipeline::Pipeline;
pub use remote::{interpret_response, upload_file_name, RemoveBgClient};
pub use session::{
    Completion, EncodedImage, ResultAsset, Session, SourceAsset, Ticket, TransformRequest,
};
pub use utils::SizeReport;
