use futures::StreamExt;
use std::path::Path;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::ProgramError;
use crate::http::RangeSource;
use crate::progress::ProgressSink;
use crate::types::RangeSpec;

impl RangeSpec {
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// `{output_name}-{start}-{end}`
    pub fn part_file_name(&self, output_name: &str) -> String {
        format!("{}-{}-{}", output_name, self.start, self.end)
    }
}

/// Splits `[resume_offset, content_length)` into exactly `concurrency` ranges.
///
/// Each range spans `page_size + 1` bytes where
/// `page_size = ceil((content_length - resume_offset) / concurrency)`; the
/// last non-empty range is clamped to `content_length - 1`. Ranges past the
/// end collapse to `(content_length, content_length - 1)` so that every
/// `start` equals the previous `end + 1`.
///
/// Returns an empty plan when there is nothing left to fetch.
pub fn plan_ranges(content_length: u64, resume_offset: u64, concurrency: usize) -> Vec<RangeSpec> {
    if resume_offset >= content_length {
        return Vec::new();
    }

    let threads = concurrency.max(1);
    let page_size = (content_length - resume_offset).div_ceil(threads as u64);
    let last = content_length - 1;

    let parts: Vec<RangeSpec> = (0..threads)
        .map(|index| {
            let stride = page_size.saturating_add(1);
            let start = resume_offset.saturating_add((index as u64).saturating_mul(stride));
            RangeSpec {
                index,
                start: start.min(content_length),
                end: start.saturating_add(page_size).min(last),
            }
        })
        .collect();

    debug!(
        content_length,
        resume_offset,
        page_size,
        threads,
        empty_parts = parts.iter().filter(|p| p.is_empty()).count(),
        "Range plan computed"
    );

    parts
}

/// Streams one range into its part file.
///
/// Empty ranges are a no-op: no request, no file. The part file is flushed and
/// closed before this returns, and its size must match the range exactly.
/// Returns the number of bytes written.
#[instrument(skip(source, sink), fields(part = range.index, start = range.start, end = range.end))]
pub async fn fetch_part<S: RangeSource>(
    source: &S,
    url: &str,
    range: &RangeSpec,
    path: &Path,
    sink: &dyn ProgressSink,
) -> Result<u64, ProgramError> {
    if range.is_empty() {
        debug!("Empty range, nothing to fetch");
        return Ok(0);
    }

    let part_io = |source: std::io::Error| ProgramError::PartIo {
        path: path.to_path_buf(),
        source,
    };

    let mut stream = source.fetch_range(url, range).await?;
    let mut file = File::create(path).await.map_err(part_io)?;
    let mut written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        file.write_all(&chunk).await.map_err(part_io)?;
        written += chunk.len() as u64;
        sink.add(chunk.len() as u64);
    }
    file.flush().await.map_err(part_io)?;
    drop(file);

    let expected = range.len();
    if written != expected {
        return Err(ProgramError::PartSizeMismatch {
            path: path.to_path_buf(),
            expected,
            got: written,
        });
    }

    debug!(bytes = written, "Part fetched");
    Ok(written)
}
