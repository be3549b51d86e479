//! HTTP/1.1 transport over TCP with optional TLS
//!
//! Each pooled connection owns one hyper HTTP/1.1 `SendRequest`. The
//! connection driver runs in its own task and ends when the handle is
//! dropped, which is how closing a pooled connection releases the socket.

use super::{classify_io, find_cause, ErrorKind, Request, Response, Transport, TransportError};
use crate::pool::Route;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderValue, HOST};
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use tracing::debug;

/// An open HTTP/1.1 connection
pub struct HttpConnection {
    sender: SendRequest<Full<Bytes>>,
    route: Route,
}

impl HttpConnection {
    pub fn route(&self) -> &Route {
        &self.route
    }
}

/// Production transport: DNS, TCP, TLS for `https`, then HTTP/1.1
#[derive(Clone)]
pub struct HyperTransport {
    tls: TlsConnector,
}

impl HyperTransport {
    /// Create a transport using the platform's default TLS settings
    pub fn new() -> Result<Self, TransportError> {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| TransportError::new(ErrorKind::TlsError, e.to_string()))?;
        Ok(Self::with_tls(tls))
    }

    /// Create a transport with a custom TLS connector
    pub fn with_tls(tls: native_tls::TlsConnector) -> Self {
        Self {
            tls: TlsConnector::from(tls),
        }
    }

    async fn open_tcp(route: &Route) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(route.authority())
            .await
            .map_err(|e| {
                TransportError::new(
                    ErrorKind::UnknownHost,
                    format!("{}: {}", route.host(), e),
                )
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::new(
                ErrorKind::UnknownHost,
                format!("{}: no addresses", route.host()),
            ));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    socket2::SockRef::from(&stream).set_keepalive(true)?;
                    debug!(route = %route, addr = %addr, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(route = %route, addr = %addr, error = %e, "TCP connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(TransportError::from)
            .unwrap_or_else(|| TransportError::new(ErrorKind::Io, "connect failed")))
    }

    async fn handshake<I>(route: &Route, io: I) -> Result<HttpConnection, TransportError>
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let secure = route.is_secure();
        let (sender, conn) = http1::handshake(io)
            .await
            .map_err(|e| classify_hyper_error(e, secure))?;

        let label = route.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(route = %label, error = %e, "HTTP/1.1 connection ended with error");
            }
        });

        Ok(HttpConnection {
            sender,
            route: route.clone(),
        })
    }

    fn build_request(request: &Request) -> Result<hyper::Request<Full<Bytes>>, TransportError> {
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target: Uri = target
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| TransportError::new(ErrorKind::Io, e.to_string()))?;

        let mut req = hyper::Request::new(Full::new(request.body().clone()));
        *req.method_mut() = request.method().clone();
        *req.uri_mut() = target;
        *req.headers_mut() = request.headers().clone();

        if !req.headers().contains_key(HOST) {
            let route = request.route();
            let default_port = if route.is_secure() { 443 } else { 80 };
            let host = if route.port() == default_port {
                route.host().to_string()
            } else {
                route.authority()
            };
            let value = HeaderValue::from_str(&host)
                .map_err(|e| TransportError::new(ErrorKind::Io, e.to_string()))?;
            req.headers_mut().insert(HOST, value);
        }

        Ok(req)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    type Connection = HttpConnection;

    async fn connect(&self, route: &Route) -> Result<HttpConnection, TransportError> {
        let stream = Self::open_tcp(route).await?;

        if route.is_secure() {
            let tls_stream = self.tls.connect(route.host(), stream).await.map_err(|e| {
                TransportError::new(ErrorKind::TlsHandshakeFailure, e.to_string())
            })?;
            Self::handshake(route, TokioIo::new(tls_stream)).await
        } else {
            Self::handshake(route, TokioIo::new(stream)).await
        }
    }

    async fn send(
        &self,
        conn: &mut HttpConnection,
        request: &Request,
    ) -> Result<Response, TransportError> {
        let secure = conn.route.is_secure();
        conn.sender
            .ready()
            .await
            .map_err(|e| classify_hyper_error(e, secure))?;

        let req = Self::build_request(request)?;
        let response = conn
            .sender
            .send_request(req)
            .await
            .map_err(|e| classify_hyper_error(e, secure))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| classify_hyper_error(e, secure))?
            .to_bytes();

        Ok(Response {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    fn is_reusable(&self, conn: &HttpConnection) -> bool {
        !conn.sender.is_closed()
    }
}

/// Map a hyper error onto the retry classification
fn classify_hyper_error(err: hyper::Error, secure: bool) -> TransportError {
    let kind = if err.is_incomplete_message() || err.is_closed() || err.is_canceled() {
        ErrorKind::NoResponseFromPeer
    } else if err.is_timeout() {
        ErrorKind::IoTimeout
    } else if find_cause::<native_tls::Error>(&err).is_some() {
        ErrorKind::TlsError
    } else if let Some(io) = find_cause::<std::io::Error>(&err) {
        classify_io(io, secure)
    } else {
        ErrorKind::Io
    };
    TransportError::new(kind, err.to_string())
}
