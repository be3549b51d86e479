//! Network attempt layer
//!
//! The executor talks to the network through the [`Transport`] trait: open a
//! connection for a route, then send one request on it. Failures are
//! reported as a [`TransportError`] whose [`ErrorKind`] drives the retry
//! decision.

pub mod http1;
pub mod message;

pub use http1::{HttpConnection, HyperTransport};
pub use message::{Request, RequestError, Response};

use crate::pool::Route;
use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

/// Closed classification of transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The peer closed the connection without sending a response
    NoResponseFromPeer,
    /// The host name could not be resolved
    UnknownHost,
    /// The connection was not established within the connect timeout
    ConnectTimeout,
    /// The TLS handshake failed
    TlsHandshakeFailure,
    /// Any other TLS failure
    TlsError,
    /// A read or write did not complete within the transfer timeout
    IoTimeout,
    /// Any other I/O failure
    Io,
}

impl ErrorKind {
    /// Whether the connection that produced this error must not be reused
    ///
    /// Failures before a connection exists (resolution, connect timeout)
    /// leave nothing broken behind; everything after that leaves the stream
    /// in an unknown state.
    pub fn breaks_connection(self) -> bool {
        !matches!(self, ErrorKind::UnknownHost | ErrorKind::ConnectTimeout)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NoResponseFromPeer => "no_response_from_peer",
            ErrorKind::UnknownHost => "unknown_host",
            ErrorKind::ConnectTimeout => "connect_timeout",
            ErrorKind::TlsHandshakeFailure => "tls_handshake_failure",
            ErrorKind::TlsError => "tls_error",
            ErrorKind::IoTimeout => "io_timeout",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure of one network attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Classify a raw I/O failure
///
/// The TLS layer reports record and alert failures on an established stream
/// as `Other` or `InvalidData` I/O errors, so on a `secure` stream those are
/// TLS failures. A wrapped `native_tls::Error` is one on any stream.
pub(crate) fn classify_io(err: &std::io::Error, secure: bool) -> ErrorKind {
    let wraps_tls = err
        .get_ref()
        .map(|inner| inner as &(dyn StdError + 'static))
        .and_then(find_cause::<native_tls::Error>)
        .is_some();
    if wraps_tls {
        return ErrorKind::TlsError;
    }

    match err.kind() {
        std::io::ErrorKind::TimedOut => ErrorKind::IoTimeout,
        std::io::ErrorKind::UnexpectedEof => ErrorKind::NoResponseFromPeer,
        std::io::ErrorKind::Other | std::io::ErrorKind::InvalidData if secure => {
            ErrorKind::TlsError
        }
        _ => ErrorKind::Io,
    }
}

/// First error of type `E` in the chain starting at `err`
pub(crate) fn find_cause<'a, E: StdError + 'static>(
    err: &'a (dyn StdError + 'static),
) -> Option<&'a E> {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(found) = cause.downcast_ref::<E>() {
            return Some(found);
        }
        current = cause.source();
    }
    None
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::new(classify_io(&err, false), err.to_string())
    }
}

/// Opens connections and performs request/response exchanges
///
/// Implementations do not enforce timeouts themselves; the executor bounds
/// `connect` by the connect timeout and `send` by the transfer timeout.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Live connection handle stored in the pool between requests
    type Connection: Send + 'static;

    /// Open a new connection to `route`
    async fn connect(&self, route: &Route) -> Result<Self::Connection, TransportError>;

    /// Send `request` on `conn` and read the full response
    async fn send(
        &self,
        conn: &mut Self::Connection,
        request: &Request,
    ) -> Result<Response, TransportError>;

    /// Whether an idle connection can still carry a request
    fn is_reusable(&self, _conn: &Self::Connection) -> bool {
        true
    }
}
