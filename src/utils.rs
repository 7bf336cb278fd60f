use reqwest::{
    Client, Proxy,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::ProgramError;
use crate::types::{LogLevel, ProxyMode};

/// Level the downloader logs at, or `None` when logging is off.
///
/// `--debug` lifts anything below DEBUG to DEBUG but keeps TRACE.
fn effective_level(level: LogLevel, debug_mode: bool) -> Option<Level> {
    if debug_mode {
        return Some(if level == LogLevel::Trace {
            Level::TRACE
        } else {
            Level::DEBUG
        });
    }
    match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Sends download logs to stderr.
///
/// Normal runs print bare `LEVEL message` lines. `--debug` adds timestamps,
/// targets and source locations to the per-part worker spans. A `RUST_LOG` directive replaces the level filter
/// (e.g. `RUST_LOG=rangeget::merge=trace`) but `--log-level off` still wins.
pub fn init_tracing(level: LogLevel, debug_mode: bool) {
    let Some(level) = effective_level(level, debug_mode) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_ascii_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if debug_mode {
        builder
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        builder
            .with_target(false)
            .without_time()
            .with_level(true)
            .init();
    }
}

/// Giving `--proxy` implies `--proxy-mode custom`; otherwise the URL would be
/// silently ignored under the default `auto` mode.
pub fn effective_proxy_mode(mode: ProxyMode, proxy: Option<&str>) -> ProxyMode {
    if proxy.is_some() {
        ProxyMode::Custom
    } else {
        mode
    }
}

/// Builds the client shared by the HEAD probe and every ranged GET.
///
/// `auto` leaves reqwest reading `HTTP(S)_PROXY`/`ALL_PROXY` from the
/// environment, `off` ignores them, and `custom` routes everything through
/// `proxy` (http, https or socks5 URLs). An unusable User-Agent or proxy URL
/// is reported as an argument error before any request is made.
pub fn build_client(
    ua: &str,
    proxy_mode: ProxyMode,
    proxy: Option<&str>,
) -> Result<Client, ProgramError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(ua)?);

    debug!(
        user_agent = %ua,
        proxy_mode = ?proxy_mode,
        proxy = ?proxy,
        "Building HTTP client"
    );

    let mut builder = Client::builder().default_headers(headers);

    match proxy_mode {
        ProxyMode::Auto => {}
        ProxyMode::Off => {
            builder = builder.no_proxy();
            debug!("Proxy disabled");
        }
        ProxyMode::Custom => {
            let proxy_url = proxy.ok_or_else(|| {
                ProgramError::ArgNotValid("proxy-mode custom requires --proxy <URL>".to_string())
            })?;
            builder = builder.no_proxy();
            let custom = Proxy::all(proxy_url).map_err(|e| {
                ProgramError::ArgNotValid(format!("invalid proxy {:?}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(custom);
            debug!(proxy = %proxy_url, "Proxy enabled (custom)");
        }
    }

    builder
        .build()
        .map_err(|e| ProgramError::ArgNotValid(format!("cannot build HTTP client: {}", e)))
}

/// Default worker count: the host's available parallelism plus one.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_mode_raises_level_but_keeps_trace() {
        assert_eq!(effective_level(LogLevel::Warn, false), Some(Level::WARN));
        assert_eq!(effective_level(LogLevel::Off, false), None);
        assert_eq!(effective_level(LogLevel::Off, true), Some(Level::DEBUG));
        assert_eq!(effective_level(LogLevel::Trace, true), Some(Level::TRACE));
    }

    #[test]
    fn proxy_url_forces_custom_mode() {
        assert_eq!(
            effective_proxy_mode(ProxyMode::Off, Some("socks5://127.0.0.1:1080")),
            ProxyMode::Custom
        );
        assert_eq!(effective_proxy_mode(ProxyMode::Off, None), ProxyMode::Off);
    }

    #[test]
    fn default_concurrency_exceeds_cpu_count() {
        assert!(default_concurrency() >= 2);
    }

    #[test]
    fn custom_proxy_mode_requires_url() {
        let err = build_client("rangeget/test", ProxyMode::Custom, None).unwrap_err();
        assert!(matches!(err, ProgramError::ArgNotValid(_)));
    }

    #[test]
    fn invalid_user_agent_is_rejected() {
        let err = build_client("bad\nagent", ProxyMode::Off, None).unwrap_err();
        assert!(matches!(err, ProgramError::ArgNotValid(_)));
    }

    #[test]
    fn builds_client_with_custom_proxy() {
        assert!(build_client("rangeget/test", ProxyMode::Custom, Some("http://127.0.0.1:8080")).is_ok());
    }
}
