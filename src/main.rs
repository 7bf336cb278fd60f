mod download;
mod error;
mod http;
mod job;
mod merge;
mod part;
mod progress;
mod store;
#[cfg(test)]
mod testing;
mod types;
mod utils;

use clap::Parser;
use std::{process::ExitCode, sync::Arc};
use tracing::{info, warn};

use download::Downloader;
use error::ProgramError;
use http::ReqwestSource;
use job::DownloadJob;
use progress::{NoProgress, ProgressSink, download_bar, format_bytes};
use store::Storage;
use types::{Args, DownloadOutcome};
use utils::{build_client, effective_proxy_mode, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing with log level control
    init_tracing(args.log_level, args.debug);

    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<DownloadOutcome, ProgramError> {
    let job = DownloadJob::prepare(
        &args.url,
        &args.output,
        args.concurrency,
        Storage::new(&args.dir),
    )
    .await?;

    info!("Starting download: {}", job.url());
    info!("Output: {:?}", job.destination());
    if job.resume_offset() > 0 {
        info!("Resuming after {}", format_bytes(job.resume_offset()));
    }

    let proxy_mode = effective_proxy_mode(args.proxy_mode, args.proxy.as_deref());
    let client = build_client(&args.user_agent, proxy_mode, args.proxy.as_deref())?;

    let progress: Arc<dyn ProgressSink> = if args.no_progress {
        Arc::new(NoProgress)
    } else {
        Arc::new(download_bar())
    };

    let outcome = Downloader::new(ReqwestSource::new(client))
        .with_progress(progress)
        .run(&job)
        .await?;

    match outcome {
        DownloadOutcome::Completed {
            resumed_from,
            total,
        } => info!(
            "Fetched {} of {}, file saved to {:?}",
            format_bytes(total - resumed_from),
            format_bytes(total),
            job.destination()
        ),
        DownloadOutcome::AlreadyComplete { total } => {
            info!("Nothing to do, {} already downloaded", format_bytes(total))
        }
        DownloadOutcome::Unsupported => {
            warn!("Server does not accept byte ranges; no file was written")
        }
    }

    Ok(outcome)
}
