//! HTTP fetching with a shared client, request timeout and gzip decoding.
//!
//! Uses async reqwest internally but presents a blocking interface, since
//! every pipeline stage is a plain iterator pulled from one thread.

use std::io::{self, Read};
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use flate2::read::GzDecoder;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP behaviour shared by every remote collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Whole-request timeout, body included
    pub read_timeout: Duration,
    /// Retry attempts for retryable failures
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the process-wide HTTP settings. Only the first call wins.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring {config:?}");
    }
}

/// Current HTTP settings (defaults until `set_http_config` is called).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// URL that could not be built; never retried
    InvalidUrl(String),
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => match status {
                // Throttled or server-side trouble
                Some(429) => true,
                Some(s) => *s >= 500,
                // Connect/timeout failures carry no status
                None => true,
            },
            Self::InvalidUrl(_) => false,
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<Result<reqwest::Client, String>> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .user_agent(concat!("pubflow/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.to_string())
});

/// Get shared HTTP client.
pub fn http_client() -> Result<&'static reqwest::Client, StreamError> {
    SHARED_CLIENT.as_ref().map_err(|message| StreamError::Http {
        status: None,
        message: format!("failed to build HTTP client: {message}"),
    })
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// HTTP GET with query parameters, returning the full body.
pub fn fetch_bytes(url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, StreamError> {
    let url = reqwest::Url::parse_with_params(url, params)
        .map_err(|e| StreamError::InvalidUrl(format!("{url}: {e}")))?;
    let client = http_client()?;
    let timeout = http_config().read_timeout;

    SHARED_RUNTIME.handle().block_on(async {
        let request = async {
            let response = client
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StreamError::from_reqwest(&e))?;
            let body = response
                .bytes()
                .await
                .map_err(|e| StreamError::from_reqwest(&e))?;
            Ok::<_, StreamError>(body.to_vec())
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("request to {url} timed out after {}s", timeout.as_secs()),
            ))),
        }
    })
}

/// HTTP GET returning the body as UTF-8 text.
pub fn fetch_text(url: &str, params: &[(&str, &str)]) -> Result<String, StreamError> {
    let bytes = fetch_bytes(url, params)?;
    String::from_utf8(bytes).map_err(|e| {
        StreamError::Io(io::Error::new(io::ErrorKind::InvalidData, e.utf8_error()))
    })
}

/// Decompress a gzip payload held in memory.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, StreamError> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn client_errors_not_retryable() {
        assert!(!http_err(400).is_retryable());
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn server_errors_retryable() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn http_429_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn http_none_status_retryable() {
        let err = StreamError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
        let err = StreamError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn display_variants() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
        let err = StreamError::Http {
            status: None,
            message: "timeout".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: timeout");
    }

    #[test]
    fn invalid_url_fails_fast() {
        let err = fetch_bytes("not a url", &[]).unwrap_err();
        assert!(matches!(err, StreamError::InvalidUrl(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn gunzip_roundtrip() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"<PubmedArticleSet/>").unwrap();
        let compressed = enc.finish().unwrap();
        assert_eq!(gunzip(&compressed).unwrap(), b"<PubmedArticleSet/>");
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        assert!(gunzip(b"not gzip at all").is_err());
    }

    #[test]
    fn http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
    }
}
