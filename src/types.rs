use clap::{Parser, ValueEnum};
use reqwest::StatusCode;
use std::path::PathBuf;

use crate::utils::default_concurrency;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A resumable, concurrent HTTP range downloader."
)]
pub struct Args {
    /// URL to download
    #[arg(long, short = 'u')]
    pub url: String,

    /// Output file name (stored as <dir>/<sha256(url)>_<output>)
    #[arg(long, short = 'o')]
    pub output: String,

    /// Number of concurrent range requests
    #[arg(long, short = 'n', default_value_t = default_concurrency())]
    pub concurrency: usize,

    /// Base directory for downloads and temporary part files
    #[arg(long, default_value = "abcDownloader")]
    pub dir: PathBuf,

    /// User-Agent to send in every request
    #[arg(long, short = 'A', default_value = concat!("rangeget/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Enable debug mode (sets log level to debug and enables detailed output)
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Proxy URL (automatically enables --proxy-mode custom)
    #[arg(long, short = 'x')]
    pub proxy: Option<String>,

    /// Proxy mode: auto (env), off (disable), custom (use --proxy)
    #[arg(long, value_enum, default_value_t = ProxyMode::Auto)]
    pub proxy_mode: ProxyMode,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ProxyMode {
    Auto,
    Off,
    Custom,
}

/// One inclusive byte range of the plan.
///
/// `start > end` marks an empty range: nothing is fetched for it, but it still
/// holds a slot in the merge chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

/// What the HEAD probe told us about the resource.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
}

impl ProbeResult {
    /// Ranged mode needs `200 OK` together with `Accept-Ranges: bytes`.
    pub fn supports_ranges(&self) -> bool {
        self.status == StatusCode::OK && self.accept_ranges
    }
}

/// How a successful run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes `[resume_offset, total)` were fetched and appended.
    Completed { resumed_from: u64, total: u64 },
    /// The destination already held the whole resource.
    AlreadyComplete { total: u64 },
    /// The server does not advertise byte ranges; nothing was written.
    Unsupported,
}
