//! In-memory HTTP server and progress sink shared by the unit tests.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use std::{
    collections::HashMap,
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::error::ProgramError;
use crate::http::{BodyStream, RangeSource, range_header};
use crate::progress::ProgressSink;
use crate::types::{ProbeResult, RangeSpec};

/// Deterministic, non-repeating-looking test payload.
pub fn sample_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Serves one resource from memory and records every ranged GET.
pub struct MemorySource {
    body: Bytes,
    status: StatusCode,
    accept_ranges: bool,
    advertise_length: bool,
    chunk_size: usize,
    truncate_by: usize,
    failing_starts: Vec<u64>,
    delays: HashMap<u64, Duration>,
    requests: Mutex<Vec<String>>,
    probes: AtomicU64,
}

impl MemorySource {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            status: StatusCode::OK,
            accept_ranges: true,
            advertise_length: true,
            chunk_size: 16,
            truncate_by: 0,
            failing_starts: Vec::new(),
            delays: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            probes: AtomicU64::new(0),
        }
    }

    /// HEAD answers without `Accept-Ranges: bytes`.
    pub fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    /// HEAD answers without `Content-Length`.
    pub fn without_content_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Every ranged body comes back `by` bytes short.
    pub fn truncating_bodies_by(mut self, by: usize) -> Self {
        self.truncate_by = by;
        self
    }

    /// The GET for the range starting at `start` drops the connection after one chunk.
    pub fn failing_at(mut self, start: u64) -> Self {
        self.failing_starts.push(start);
        self
    }

    /// The GET for the range starting at `start` answers after `delay`.
    pub fn delaying(mut self, start: u64, delay: Duration) -> Self {
        self.delays.insert(start, delay);
        self
    }

    /// `Range` header values in the order the requests arrived.
    pub fn requested_ranges(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl RangeSource for MemorySource {
    async fn probe(&self, _url: &str) -> Result<ProbeResult, ProgramError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeResult {
            status: self.status,
            content_length: self.advertise_length.then_some(self.body.len() as u64),
            accept_ranges: self.accept_ranges,
        })
    }

    async fn fetch_range(&self, _url: &str, range: &RangeSpec) -> Result<BodyStream, ProgramError> {
        self.requests.lock().unwrap().push(range_header(range));
        if let Some(delay) = self.delays.get(&range.start) {
            tokio::time::sleep(*delay).await;
        }

        let start = range.start as usize;
        let end = (range.end as usize + 1).min(self.body.len());
        let end = end.saturating_sub(self.truncate_by).max(start);
        let slice = self.body.slice(start..end);

        let mut chunks: Vec<Result<Bytes, ProgramError>> = slice
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if self.failing_starts.contains(&range.start) {
            chunks.truncate(1);
            chunks.push(Err(ProgramError::Transport(Box::new(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))));
        }
        Ok(stream::iter(chunks).boxed())
    }
}

/// Sums every delta it receives and remembers how the run ended.
#[derive(Default)]
pub struct CountingSink {
    total: AtomicU64,
    finished: AtomicBool,
    abandoned: AtomicBool,
}

impl CountingSink {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl ProgressSink for CountingSink {
    fn add(&self, delta: u64) {
        self.total.fetch_add(delta, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }
}
