//! Inbound request metadata.

use std::net::SocketAddr;

use http::{HeaderMap, Uri, Version};

use crate::method::Method;

/// The request line, headers and peer address of an inbound request.
///
/// The body is not kept here: it has already been read into
/// [`Context::body`](crate::Context::body) (or `form` / the form files).
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) remote_addr: SocketAddr,
}

/// A `name=value` pair from a `Cookie` request header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Request {
    pub(crate) fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, remote_addr: SocketAddr) -> Self {
        Self { method, uri, version, headers, remote_addr }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Case-insensitive header lookup. Returns the first value, if it is
    /// visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The `Host` header, or the URI authority for HTTP/2 requests.
    pub fn host(&self) -> &str {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or_default()
    }

    /// The protocol string, e.g. `"HTTP/1.1"`.
    pub fn proto(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2  => "HTTP/2.0",
            Version::HTTP_3  => "HTTP/3.0",
            _                => "HTTP/1.1",
        }
    }

    /// Path and query, as sent on the request line.
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Every cookie sent with the request, in header order.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = value.trim().trim_matches('"');
                Some(Cookie { name: name.to_owned(), value: value.to_owned() })
            })
            .collect()
    }

    /// The first cookie named `name`.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|c| c.name == name)
    }
}
