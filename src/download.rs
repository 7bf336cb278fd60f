use std::{path::PathBuf, sync::Arc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProgramError;
use crate::http::RangeSource;
use crate::job::DownloadJob;
use crate::merge::{MergeCoordinator, TokenPass, TokenRing, TokenWait};
use crate::part::{fetch_part, plan_ranges};
use crate::progress::{NoProgress, ProgressSink, format_bytes};
use crate::types::{DownloadOutcome, RangeSpec};

/// Drives one download: probe, plan, fetch in parallel, merge in order.
pub struct Downloader<S> {
    source: Arc<S>,
    progress: Arc<dyn ProgressSink>,
}

impl<S: RangeSource> Downloader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the job to completion.
    ///
    /// Servers that do not advertise byte ranges are left alone and reported
    /// as [`DownloadOutcome::Unsupported`]. On any error the destination keeps
    /// whatever prefix was merged, so the next run resumes from there.
    #[instrument(skip(self, job), fields(url = %job.url(), key = %job.storage_key()))]
    pub async fn run(&self, job: &DownloadJob) -> Result<DownloadOutcome, ProgramError> {
        let probe = self.source.probe(job.url()).await?;
        if !probe.supports_ranges() {
            warn!(
                status = %probe.status,
                accept_ranges = probe.accept_ranges,
                "Server does not support range requests, nothing downloaded"
            );
            return Ok(DownloadOutcome::Unsupported);
        }

        let total = probe
            .content_length
            .ok_or(ProgramError::MissingContentLength)?;
        let resumed_from = job.resume_offset();
        info!(
            "File size: {} (resuming from {})",
            format_bytes(total),
            format_bytes(resumed_from)
        );

        if resumed_from > total {
            warn!(
                resumed_from,
                total, "Destination is larger than the remote file, leaving it untouched"
            );
        }

        let plan = plan_ranges(total, resumed_from, job.concurrency());
        if plan.is_empty() {
            info!("Destination already complete");
            return Ok(DownloadOutcome::AlreadyComplete { total });
        }

        let storage = job.storage();
        storage.ensure_base_dir().await?;

        self.progress.start(total, resumed_from);
        let result = match storage.create_temp_dir().await {
            Ok(temp_dir) => self.fetch_and_merge(job, plan, temp_dir).await,
            Err(e) => Err(e),
        };

        if let Err(e) = storage.remove_temp_dir().await {
            warn!(error = %e, "Failed to remove temp directory");
        }

        if let Err(e) = result {
            self.progress.abandon();
            return Err(e);
        }
        self.progress.finish();
        info!(destination = ?job.destination(), "Download completed");
        Ok(DownloadOutcome::Completed {
            resumed_from,
            total,
        })
    }

    /// Spawns one worker per range, releases the first token and waits for
    /// the chain to finish.
    ///
    /// The first failing worker aborts the rest. Workers that only saw a
    /// broken token chain are reported only when there is no better error.
    async fn fetch_and_merge(
        &self,
        job: &DownloadJob,
        plan: Vec<RangeSpec>,
        temp_dir: PathBuf,
    ) -> Result<(), ProgramError> {
        let ring = TokenRing::new(plan.len());
        let merger = Arc::new(MergeCoordinator::new(
            job.destination(),
            job.resume_offset(),
        ));

        let mut workers = JoinSet::new();
        for (range, tokens) in plan.into_iter().zip(ring.workers) {
            let worker = Worker {
                source: self.source.clone(),
                progress: self.progress.clone(),
                merger: merger.clone(),
                url: job.url().to_string(),
                part_path: temp_dir.join(range.part_file_name(job.output_name())),
                range,
                wait: tokens.wait,
                pass: tokens.pass,
            };
            workers.spawn(worker.run());
        }
        debug!(workers = workers.len(), "Workers spawned, releasing first token");
        ring.start.release();

        let mut failure: Option<ProgramError> = None;
        while let Some(joined) = workers.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => ProgramError::from(e),
            };

            if failure.is_none() {
                error!(error = %err, "Worker failed, aborting remaining parts");
                workers.abort_all();
            }
            failure = match failure {
                Some(ProgramError::TokenChainBroken { .. })
                    if !matches!(err, ProgramError::TokenChainBroken { .. }) =>
                {
                    Some(err)
                }
                Some(prev) => Some(prev),
                None => Some(err),
            };
        }
        if let Some(err) = failure {
            return Err(err);
        }

        ring.finish.acquire().await?;
        debug!(bytes_merged = merger.bytes_merged(), "All parts merged");
        Ok(())
    }
}

/// Everything one spawned worker owns.
struct Worker<S> {
    source: Arc<S>,
    progress: Arc<dyn ProgressSink>,
    merger: Arc<MergeCoordinator>,
    url: String,
    range: RangeSpec,
    part_path: PathBuf,
    wait: TokenWait,
    pass: TokenPass,
}

impl<S: RangeSource> Worker<S> {
    /// Fetch, wait for the token, merge, pass the token on.
    #[instrument(skip(self), fields(part = self.range.index))]
    async fn run(self) -> Result<(), ProgramError> {
        fetch_part(
            self.source.as_ref(),
            &self.url,
            &self.range,
            &self.part_path,
            self.progress.as_ref(),
        )
        .await?;

        debug!(slot = self.wait.index(), "Waiting for merge token");
        self.wait.acquire().await?;
        let merged = self.merger.merge(&self.range, &self.part_path).await?;

        let next = self.pass.index();
        self.pass.release();
        debug!(next_slot = next, bytes_merged = merged, "Token passed");
        Ok(())
    }
}
