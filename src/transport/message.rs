//! Request and response values exchanged with a transport

use crate::pool::{Route, RouteError};
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, StatusCode, Uri};

/// Errors building a request
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("Invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// An outgoing HTTP request, bound to the route it will be pooled under
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    route: Route,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Result<Self, RequestError> {
        let route = Route::from_uri(&uri)?;
        Ok(Self {
            method,
            uri,
            route,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// Build a GET request for `url`
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::GET, url.parse()?)
    }

    /// Build a POST request for `url` carrying `body`
    pub fn post(url: &str, body: impl Into<Bytes>) -> Result<Self, RequestError> {
        Ok(Self::new(Method::POST, url.parse()?)?.with_body(body))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RequestError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| RequestError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the request encloses an entity (POST, PUT, PATCH or a body)
    pub fn encloses_entity(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH) || !self.body.is_empty()
    }

    /// Whether repeating the request is safe for generic I/O failures
    pub fn is_idempotent(&self) -> bool {
        !self.encloses_entity()
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
