//! Incoming HTTP request type.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// An incoming HTTP request.
///
/// Steps only ever see it behind a shared reference: the request is fixed
/// for the lifetime of its [`Context`](crate::Context).
#[derive(Clone, Debug)]
pub struct Request {
    method: String,
    url: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// A request with no headers and an empty body.
    ///
    /// `url` is the request target as received: path plus optional query or
    /// fragment.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header. Names or values that are not valid HTTP are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "ignoring invalid request header"),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        // HTTP/2 requests carry an absolute URI; routing only cares about the
        // origin-form target.
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
        Self {
            method: parts.method.as_str().to_owned(),
            url,
            headers: parts.headers,
            body,
        }
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// The request path with any query string or fragment removed.
    pub fn path(&self) -> &str {
        route_path(&self.url)
    }

    /// The query string, without the leading `?` or any fragment.
    pub fn query(&self) -> Option<&str> {
        let (_, rest) = self.url.split_once('?')?;
        Some(rest.split_once('#').map_or(rest, |(query, _)| query))
    }

    /// Case-insensitive header lookup. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Strips everything from the first `?` or `#` onward.
pub(crate) fn route_path(url: &str) -> &str {
    url.find(|c| c == '?' || c == '#').map_or(url, |end| &url[..end])
}
