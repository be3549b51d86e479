//! Pooling key: the destination a connection is bound to

use hyper::Uri;
use std::fmt;
use std::str::FromStr;

/// Error returned when a URI cannot be turned into a route
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("URI has no host: {0}")]
    MissingHost(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

/// Destination of a pooled connection (scheme, host, port)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    scheme: String,
    host: String,
    port: u16,
}

impl Route {
    /// Create a route from its parts. Scheme and host are lowercased.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Derive the route of a request URI, filling in the scheme's default port
    pub fn from_uri(uri: &Uri) -> Result<Self, RouteError> {
        let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            other => return Err(RouteError::UnsupportedScheme(other.to_string())),
        };
        let host = uri
            .host()
            .ok_or_else(|| RouteError::MissingHost(uri.to_string()))?;
        let port = uri.port_u16().unwrap_or(default_port);

        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether connections on this route need a TLS handshake
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// `host:port`, suitable for socket address resolution
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| RouteError::InvalidUri(e.to_string()))?;
        Self::from_uri(&uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let http: Route = "http://example.com/s?word=java".parse().unwrap();
        assert_eq!(http.port(), 80);
        assert!(!http.is_secure());

        let https: Route = "https://example.com".parse().unwrap();
        assert_eq!(https.port(), 443);
        assert!(https.is_secure());
    }

    #[test]
    fn test_equality_by_value() {
        let a: Route = "https://Example.com:443/a".parse().unwrap();
        let b = Route::new("https", "example.com", 443);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "https://example.com:443");
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let err = "ftp://example.com".parse::<Route>().unwrap_err();
        assert_eq!(err, RouteError::UnsupportedScheme("ftp".to_string()));
    }

    #[test]
    fn test_rejects_relative_uri() {
        let err = "/just/a/path".parse::<Route>().unwrap_err();
        assert!(matches!(err, RouteError::MissingHost(_)));
    }
}
