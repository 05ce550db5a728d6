//! Engine seam: daemon endpoints, transport counters and connection handles
//!
//! The RPC client itself lives outside this crate. Tools only see the
//! [`Engine`] handle the lifecycle hands them, and the usage counters the
//! transport keeps in [`RpcStats`].

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Concrete address of a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// SCGI over TCP (`scgi://host:port` or bare `host:port`)
    Tcp { host: String, port: u16 },
    /// SCGI over a local unix domain socket
    Unix { path: PathBuf },
}

impl Endpoint {
    /// Parse a connection string.
    ///
    /// Socket paths start with `/` or `~` (expanded), optionally behind a
    /// `scgi+unix://` scheme. Anything else must be `host:port`.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let raw = raw.trim();
        let invalid = |reason: &str| EngineError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let socket = raw.strip_prefix("scgi+unix://").unwrap_or(raw);
        if socket.starts_with('/') || socket.starts_with('~') {
            let path = shellexpand::tilde(socket).into_owned();
            return Ok(Endpoint::Unix {
                path: PathBuf::from(path),
            });
        }

        let address = raw.strip_prefix("scgi://").unwrap_or(raw);
        let address = address.strip_suffix('/').unwrap_or(address);
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port or a socket path"))?;
        if host.is_empty() || host.contains('/') {
            return Err(invalid("missing host name"));
        }
        let port = port.parse::<u16>().map_err(|e| invalid(&e.to_string()))?;
        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "scgi://{}:{}", host, port),
            Endpoint::Unix { path } => write!(f, "scgi+unix://{}", path.display()),
        }
    }
}

/// One sample of a summary metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub value: f64,
}

/// Observation count and running sum of response times.
#[derive(Debug, Default)]
pub struct ResponseTimeSummary {
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl ResponseTimeSummary {
    pub fn observe(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Samples in exposition order: `count`, then `sum` (seconds).
    pub fn samples(&self) -> [Sample; 2] {
        [
            Sample {
                name: "count",
                value: self.count.load(Ordering::Relaxed) as f64,
            },
            Sample {
                name: "sum",
                value: self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            },
        ]
    }
}

/// Cumulative RPC usage counters, updated by the transport.
#[derive(Debug, Default)]
pub struct RpcStats {
    requests: AtomicU64,
    request_bytes: AtomicU64,
    response_bytes: AtomicU64,
    response_time: ResponseTimeSummary,
}

impl RpcStats {
    /// Account one completed request/response exchange.
    pub fn record(&self, request_bytes: u64, response_bytes: u64, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.request_bytes.fetch_add(request_bytes, Ordering::Relaxed);
        self.response_bytes.fetch_add(response_bytes, Ordering::Relaxed);
        self.response_time.observe(elapsed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn request_bytes(&self) -> u64 {
        self.request_bytes.load(Ordering::Relaxed)
    }

    pub fn response_bytes(&self) -> u64 {
        self.response_bytes.load(Ordering::Relaxed)
    }

    pub fn response_time(&self) -> &ResponseTimeSummary {
        &self.response_time
    }
}

/// Handle to a daemon, as seen by tools.
pub trait Engine {
    /// Endpoint this handle is bound to.
    fn endpoint(&self) -> &Endpoint;

    /// Usage counters of the underlying transport.
    fn stats(&self) -> &RpcStats;
}

/// Builds engine handles for endpoints.
pub trait Connector {
    /// Construct a handle for `endpoint`.
    fn connect(&self, endpoint: &Endpoint) -> EngineResult<Box<dyn Engine>>;

    /// Process-wide usage counters shared by every handle this connector made.
    fn stats(&self) -> &RpcStats;
}

/// Default handle: an endpoint bound to the shared transport counters.
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    stats: Arc<RpcStats>,
}

impl Session {
    pub fn new(endpoint: Endpoint, stats: Arc<RpcStats>) -> Self {
        Self { endpoint, stats }
    }
}

impl Engine for Session {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn stats(&self) -> &RpcStats {
        &self.stats
    }
}

#[derive(Debug, Default)]
pub struct SessionConnector {
    stats: Arc<RpcStats>,
}

impl Connector for SessionConnector {
    fn connect(&self, endpoint: &Endpoint) -> EngineResult<Box<dyn Engine>> {
        debug!("connect: {}", endpoint);
        Ok(Box::new(Session::new(endpoint.clone(), Arc::clone(&self.stats))))
    }

    fn stats(&self) -> &RpcStats {
        &self.stats
    }
}
