use std::time::Duration;

/// Quality used when re-encoding lossy targets during format conversion.
pub const DEFAULT_CONVERSION_QUALITY: f32 = 0.9;
pub const DEFAULT_COMPRESSION_QUALITY: f32 = 0.8;

pub const DEFAULT_MAX_LONG_EDGE: u32 = 1920;
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

pub const QUALITY_STEP: f32 = 0.05;
pub const MIN_COMPRESSION_QUALITY: f32 = 0.05;
pub const DOWNSCALE_FACTOR: f32 = 0.8;

pub const LIBDEFLATER_LEVEL: u8 = 12;
pub const OXIPNG_PRESET: u8 = 4;

/// Palette bounds for quality-driven colour reduction of lossless families.
pub const MAX_PALETTE_COLORS: usize = 256;
pub const MIN_PALETTE_COLORS: usize = 2;
pub const NEUQUANT_SAMPLE_FACTOR: i32 = 10;

/// White, painted under transparent pixels for targets without alpha.
pub const OPAQUE_BACKGROUND: [u8; 4] = [255, 255, 255, 255];

pub const EXOTIC_EXTENSIONS: &[&str] = &["heic", "heif"];

pub const HANDLE_SCHEME: &str = "blob:img-tools/";

pub const DEFAULT_REMOVE_BG_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(60);
pub const REMOVE_BG_SIZE: &str = "auto";
pub const REMOVE_BG_IMAGE_FIELD: &str = "image_file";
pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const QUOTA_ERROR_CODE: &str = "insufficient_credits";
pub const FALLBACK_SERVICE_ERROR: &str = "AI Service Error";

pub const ENV_API_KEY: &str = "REMOVE_BG_API_KEY";
pub const ENV_ENDPOINT: &str = "REMOVE_BG_ENDPOINT";
pub const ENV_TIMEOUT_SECS: &str = "REMOVE_BG_TIMEOUT_SECS";

pub const PROGRESS_SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

// Common output message prefixes
pub const ORIGINAL_SIZE_PREFIX: &str = "📊 Original size:";
pub const RESULT_SIZE_PREFIX: &str = "📈 Result size:";
pub const COMPRESSION_RATIO_PREFIX: &str = "🎯 Size change:";
pub const SUCCESS_PREFIX: &str = "✅";
pub const WARNING_PREFIX: &str = "⚠️";
pub const INFO_PREFIX: &str = "📋";
pub const SAVED_PREFIX: &str = "💾";
