use anyhow::{Context, Result};
use clap::Parser;
use img_tools::cli::{Args, Commands, OutputArgs};
use img_tools::config::RemoveBgConfig;
use img_tools::constants::{INFO_PREFIX, SAVED_PREFIX, SUCCESS_PREFIX, WARNING_PREFIX};
use img_tools::utils::create_progress_spinner;
use img_tools::{
    logger, status, CompressionOptions, Completion, Pipeline, RemoveBgClient, Session,
    TransformRequest, Upload,
};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    match args.command {
        Commands::Convert {
            input,
            target,
            output,
        } => {
            let request = TransformRequest::Convert { target };
            transform(Pipeline::new(), &input, request, &output).await
        }
        Commands::Compress {
            input,
            quality,
            max_edge,
            max_bytes,
            output,
        } => {
            let options = CompressionOptions::new(quality, max_edge, max_bytes)?;
            let request = TransformRequest::Compress {
                quality: options.quality,
            };
            let pipeline = Pipeline::new().with_compression(options);
            transform(pipeline, &input, request, &output).await
        }
        Commands::RemoveBg {
            input,
            api_key,
            endpoint,
            timeout,
            output,
        } => {
            let config = RemoveBgConfig::new(
                api_key.unwrap_or_default(),
                endpoint,
                timeout.map(Duration::from_secs),
            )
            .context("Background removal is not configured")?;
            let client = RemoveBgClient::new(config)?;
            let pipeline = Pipeline::new().with_remote(client);
            transform(pipeline, &input, TransformRequest::RemoveBackground, &output).await
        }
    }
}

async fn transform(
    pipeline: Pipeline,
    input: &Path,
    request: TransformRequest,
    output: &OutputArgs,
) -> Result<()> {
    status!("{} Processing: {:?}", INFO_PREFIX, input);

    let upload = Upload::from_path(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let mut session = Session::new();
    pipeline
        .ingest(&mut session, Some(upload))
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;
    if let Some(name) = &output.name {
        session.set_output_name(name.as_str());
    }

    let spinner = (!logger::is_quiet()).then(|| create_progress_spinner(&format!("{}...", request)));
    let outcome = pipeline.run(&mut session, request).await;
    if let Some(spinner) = spinner {
        match &outcome {
            Ok(_) => spinner.finish_with_message(format!("{} Done: {}", SUCCESS_PREFIX, request)),
            Err(_) => spinner.abandon(),
        }
    }

    match outcome.with_context(|| format!("Failed to {}", request))? {
        Completion::Applied => {}
        Completion::Stale => {
            status!("{}  Result was superseded and discarded", WARNING_PREFIX);
            return Ok(());
        }
    }

    let path = session
        .download(&output.out_dir)
        .context("Failed to save result")?;

    if let Some(report) = session.size_report() {
        for line in report.lines() {
            status!("{}", line);
        }
    }
    status!("{} Saved: {}", SAVED_PREFIX, path.display());
    Ok(())
}
