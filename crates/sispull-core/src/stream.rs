//! Shared HTTP client and sync facade over async reqwest.
//!
//! The pull pipeline is a single sequential thread of control, so the async
//! client is driven through a small shared runtime with `block_on`. Streamed
//! response bodies get a per-read stall timeout instead of a whole-request
//! timeout, which would be meaningless for a multi-minute chunked transfer.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunable HTTP behavior, installed once by the CLI before the first request.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout for buffered (non-streaming) requests
    pub request_timeout: Duration,
    /// Per-read stall timeout for streamed bodies
    pub read_timeout: Duration,
    /// Silent pool-level retry budget for transport failures
    pub pool_retries: u32,
    /// Backoff factor: sleeps `factor * 2^(n-1)` seconds between pool retries
    pub backoff_factor: u64,
    /// Status codes that force a silent pool-level retry
    pub retry_statuses: Vec<u16>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(600),
            read_timeout: Duration::from_secs(30),
            pool_retries: 5,
            backoff_factor: 2,
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the global HTTP config. A no-op if one was already installed.
pub fn set_http_config(config: HttpConfig) {
    let _ = HTTP_CONFIG.set(config);
}

/// Get the global HTTP config, falling back to defaults.
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// A chunked response body being consumed outside the runtime.
pub struct StreamBody {
    pub reader: TimeoutReader,
    /// Content-Length, when the server sent one
    pub total_bytes: Option<u64>,
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Turn a successful response into a blocking byte reader.
pub fn body_reader(response: reqwest::Response) -> StreamBody {
    let total_bytes = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let stream = response.bytes_stream();
    let async_reader =
        tokio_util::io::StreamReader::new(stream.map(|result| result.map_err(io::Error::other)));

    StreamBody {
        reader: TimeoutReader::new(Box::pin(async_reader)),
        total_bytes,
    }
}

/// Async-to-sync bridge with read timeout.
///
/// Wraps an async reader and provides a sync `Read` interface. Each read has
/// a timeout - if no data arrives within `read_timeout`, returns a TimedOut
/// error so the caller can give up on the stalled transfer.
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self { inner }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read_timeout = http_config().read_timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(read_timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read timeout: no data from server",
                )),
            }
        })
    }
}
