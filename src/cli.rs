use crate::constants::{ENV_API_KEY, ENV_ENDPOINT, ENV_TIMEOUT_SECS};
use crate::formats::TargetFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "img-tools",
    about = "Convert, compress, or remove the background of a single image",
    long_about = "img-tools takes one image and produces a derived image: a format conversion \
                  (PNG, JPEG, WebP, GIF, HEIC, PDF), a size-budgeted compression, or a \
                  background removal through a remote service.",
    version,
    after_help = "EXAMPLES:\n  \
    img-tools convert photo.png --to jpg\n  \
    img-tools convert scan.jpg --to pdf -o ./out -n invoice\n  \
    img-tools compress holiday.jpg -q 0.7 --max-bytes 500000\n  \
    REMOVE_BG_API_KEY=... img-tools remove-bg portrait.jpg"
)]
pub struct Args {
    #[arg(long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print debug diagnostics")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct OutputArgs {
    #[arg(
        short = 'o',
        long,
        default_value = ".",
        help = "Directory the result is saved into"
    )]
    pub out_dir: PathBuf,

    #[arg(
        short = 'n',
        long,
        help = "Output base name (default: the input's base name)",
        long_help = "Output base name without extension. Surrounding whitespace is trimmed; \
                     a blank name falls back to the input's base name. The extension always \
                     matches the produced format."
    )]
    pub name: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Convert an image to another format")]
    Convert {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(
            short = 't',
            long = "to",
            help = "Target format (png, jpg, webp, gif, heic, pdf)",
            long_help = "Target format. Dimensions are preserved; transparent areas become white \
                         for formats without alpha (jpg, heic, pdf). heic needs the `heif` build \
                         feature."
        )]
        target: TargetFormat,

        #[command(flatten)]
        output: OutputArgs,
    },

    #[command(
        about = "Compress an image within a size budget",
        long_about = "Re-encode an image so its long edge and byte size fit the given budgets. \
                      The byte budget always wins: quality and then dimensions are reduced \
                      until the result fits."
    )]
    Compress {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(short = 'q', long, help = "Quality in (0, 1] (default: 0.8)")]
        quality: Option<f32>,

        #[arg(long = "max-edge", help = "Maximum long edge in pixels (default: 1920)")]
        max_edge: Option<u32>,

        #[arg(long = "max-bytes", help = "Maximum result size in bytes (default: 1048576)")]
        max_bytes: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    #[command(
        name = "remove-bg",
        about = "Remove the background through the remote service",
        long_about = "Send the image to the background-removal service and save the \
                      transparent PNG it returns. The API key is read from the environment \
                      or --api-key; it is never stored."
    )]
    RemoveBg {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(long, env = ENV_API_KEY, hide_env_values = true, help = "Service API key")]
        api_key: Option<String>,

        #[arg(long, env = ENV_ENDPOINT, help = "Service endpoint URL")]
        endpoint: Option<String>,

        #[arg(long, env = ENV_TIMEOUT_SECS, help = "Request timeout in seconds (default: 60)")]
        timeout: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
}
