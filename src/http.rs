use bytes::Bytes;
use futures::{
    TryStreamExt,
    stream::{BoxStream, StreamExt},
};
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE},
};
use std::future::Future;
use tracing::{debug, instrument, trace};

use crate::error::ProgramError;
use crate::types::{ProbeResult, RangeSpec};

/// Response body of a ranged GET, as a stream of chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, ProgramError>>;

/// The two HTTP operations the downloader needs.
///
/// The orchestrator is generic over this trait; [`ReqwestSource`] is the real
/// network implementation.
pub trait RangeSource: Send + Sync + 'static {
    /// Issues a HEAD request and reports status, size and range support.
    fn probe(&self, url: &str) -> impl Future<Output = Result<ProbeResult, ProgramError>> + Send;

    /// Issues a GET with `Range: bytes={start}-{end}` and returns the body.
    fn fetch_range(
        &self,
        url: &str,
        range: &RangeSpec,
    ) -> impl Future<Output = Result<BodyStream, ProgramError>> + Send;
}

/// [`RangeSource`] backed by a configured reqwest [`Client`].
#[derive(Clone)]
pub struct ReqwestSource {
    client: Client,
}

impl ReqwestSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl RangeSource for ReqwestSource {
    #[instrument(skip(self), fields(url = %url))]
    async fn probe(&self, url: &str) -> Result<ProbeResult, ProgramError> {
        debug!("Sending HEAD request");
        let resp = self.client.head(url).send().await?;

        debug!(status = %resp.status(), "HEAD response received");
        trace!("HEAD response headers:");
        for (name, value) in resp.headers().iter() {
            trace!(header_name = %name, header_value = ?value);
        }

        let accept_ranges = accepts_byte_ranges(resp.headers());

        Ok(ProbeResult {
            status: resp.status(),
            content_length: parse_content_length(&resp),
            accept_ranges,
        })
    }

    #[instrument(skip(self), fields(url = %url, part = range.index))]
    async fn fetch_range(&self, url: &str, range: &RangeSpec) -> Result<BodyStream, ProgramError> {
        let resp = self
            .client
            .get(url)
            .header(RANGE, range_header(range))
            .send()
            .await?;

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(ProgramError::UnexpectedStatus {
                request: "ranged GET",
                status: resp.status(),
            });
        }

        Ok(resp.bytes_stream().map_err(ProgramError::from).boxed())
    }
}

/// `bytes={start}-{end}`, both ends inclusive.
pub fn range_header(range: &RangeSpec) -> String {
    format!("bytes={}-{}", range.start, range.end)
}

/// True only for `Accept-Ranges: bytes`, ignoring case and surrounding whitespace.
fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("bytes"))
}

/// Reads the Content-Length header directly; HEAD responses carry no body
/// for reqwest to measure.
fn parse_content_length(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}
