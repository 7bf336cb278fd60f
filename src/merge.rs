use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, copy},
    sync::oneshot,
};
use tracing::{debug, instrument};

use crate::error::ProgramError;
use crate::types::RangeSpec;

/// Receiving end of one ring slot.
#[derive(Debug)]
pub struct TokenWait {
    index: usize,
    rx: oneshot::Receiver<()>,
}

impl TokenWait {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Waits until the token lands in this slot.
    ///
    /// Fails with [`ProgramError::TokenChainBroken`] if the holder of the
    /// previous slot went away without passing it.
    pub async fn acquire(self) -> Result<(), ProgramError> {
        self.rx
            .await
            .map_err(|_| ProgramError::TokenChainBroken { index: self.index })
    }
}

/// Sending end of one ring slot.
#[derive(Debug)]
pub struct TokenPass {
    index: usize,
    tx: oneshot::Sender<()>,
}

impl TokenPass {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Puts the token into this slot. Does nothing if the waiter is gone.
    pub fn release(self) {
        if self.tx.send(()).is_err() {
            debug!(slot = self.index, "Token waiter already gone");
        }
    }
}

/// The handles a single worker needs: wait on slot `i`, then pass to slot `i + 1`.
#[derive(Debug)]
pub struct WorkerTokens {
    pub wait: TokenWait,
    pub pass: TokenPass,
}

/// `workers + 1` single-use slots that serialize merges in index order.
///
/// Slot 0 is filled by the orchestrator, slot `i + 1` by worker `i`, and the
/// orchestrator waits on the last slot. Every slot is used exactly once, so at
/// most one token is ever in flight.
#[derive(Debug)]
pub struct TokenRing {
    /// Fills slot 0.
    pub start: TokenPass,
    /// One entry per worker, in plan order.
    pub workers: Vec<WorkerTokens>,
    /// Slot `workers`: the chain is complete once this fires.
    pub finish: TokenWait,
}

impl TokenRing {
    pub fn new(workers: usize) -> Self {
        let (tx, mut prev_rx) = oneshot::channel();
        let start = TokenPass { index: 0, tx };

        let workers = (0..workers)
            .map(|index| {
                let (tx, rx) = oneshot::channel();
                let wait = TokenWait {
                    index,
                    rx: std::mem::replace(&mut prev_rx, rx),
                };
                let pass = TokenPass {
                    index: index + 1,
                    tx,
                };
                WorkerTokens { wait, pass }
            })
            .collect::<Vec<_>>();

        let finish = TokenWait {
            index: workers.len(),
            rx: prev_rx,
        };

        Self {
            start,
            workers,
            finish,
        }
    }
}

/// Appends finished parts to the destination, one range at a time.
///
/// Only the current token holder calls [`MergeCoordinator::merge`], so appends
/// never overlap and the destination is always a prefix of the resource.
#[derive(Debug)]
pub struct MergeCoordinator {
    destination: PathBuf,
    bytes_merged: AtomicU64,
}

impl MergeCoordinator {
    /// `resume_offset` is the destination's size at the start of the run.
    pub fn new(destination: impl Into<PathBuf>, resume_offset: u64) -> Self {
        Self {
            destination: destination.into(),
            bytes_merged: AtomicU64::new(resume_offset),
        }
    }

    pub fn bytes_merged(&self) -> u64 {
        self.bytes_merged.load(Ordering::Acquire)
    }

    /// Appends the part file for `range` and deletes it.
    ///
    /// `range.start` must equal the current merged byte count. Empty ranges
    /// advance nothing and touch no part file. Returns the new merged count.
    #[instrument(skip(self, part_path), fields(part = range.index, start = range.start, end = range.end))]
    pub async fn merge(&self, range: &RangeSpec, part_path: &Path) -> Result<u64, ProgramError> {
        let next = range.start + range.len();
        self.bytes_merged
            .compare_exchange(range.start, next, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|expected| ProgramError::MergeOutOfOrder {
                expected,
                start: range.start,
            })?;

        let dest_io = |source: std::io::Error| ProgramError::MergeIo {
            path: self.destination.clone(),
            source,
        };
        let part_io = |source: std::io::Error| ProgramError::MergeIo {
            path: part_path.to_path_buf(),
            source,
        };

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.destination)
            .await
            .map_err(dest_io)?;

        if !range.is_empty() {
            let mut part = File::open(part_path).await.map_err(part_io)?;
            let copied = copy(&mut part, &mut out).await.map_err(dest_io)?;
            drop(part);
            fs::remove_file(part_path).await.map_err(part_io)?;
            debug!(bytes = copied, "Part merged");
        }

        out.flush().await.map_err(dest_io)?;
        Ok(next)
    }
}
