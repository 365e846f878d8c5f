//! Outgoing response bodies and content types.
//!
//! Handles never build a response themselves: they write into the
//! [`Context`](crate::Context), and the server turns the context into an
//! `http::Response` once the chain has finished. This module holds the
//! pieces that conversion and the static file server share.

use std::convert::Infallible;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::status::Status;

/// The response body type: a buffered body for plain routes, a stream for
/// server-sent events.
pub type Body = UnsyncBoxBody<Bytes, Infallible>;

/// The outgoing response handed to hyper.
pub type Response = http::Response<Body>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types the context and the static file server write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css; charset=utf-8
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Gif,          // image/gif
    Html,         // text/html; charset=utf-8
    Ico,          // image/x-icon
    Jpeg,         // image/jpeg
    JavaScript,   // text/javascript; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    Wasm,         // application/wasm
    Webp,         // image/webp
    Xml,          // application/xml
    Yaml,         // application/yaml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Ico         => "image/x-icon",
            Self::Jpeg        => "image/jpeg",
            Self::JavaScript  => "text/javascript; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Wasm        => "application/wasm",
            Self::Webp        => "image/webp",
            Self::Xml         => "application/xml",
            Self::Yaml        => "application/yaml",
        }
    }

    /// Guesses the content type from a file extension (case-insensitive).
    /// Unknown extensions are served as `application/octet-stream`.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css"                 => Self::Css,
            "csv"                 => Self::Csv,
            "gif"                 => Self::Gif,
            "htm" | "html"        => Self::Html,
            "ico"                 => Self::Ico,
            "jpeg" | "jpg"        => Self::Jpeg,
            "js" | "mjs"          => Self::JavaScript,
            "json"                => Self::Json,
            "pdf"                 => Self::Pdf,
            "png"                 => Self::Png,
            "svg"                 => Self::Svg,
            "txt" | "md"          => Self::Text,
            "wasm"                => Self::Wasm,
            "webp"                => Self::Webp,
            "xml"                 => Self::Xml,
            "yaml" | "yml"        => Self::Yaml,
            _                     => Self::OctetStream,
        }
    }
}

impl From<ContentType> for HeaderValue {
    fn from(ct: ContentType) -> Self {
        HeaderValue::from_static(ct.as_str())
    }
}

// ── Body helpers ──────────────────────────────────────────────────────────────

pub(crate) fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).boxed_unsync()
}

pub(crate) fn empty() -> Body {
    Empty::new().boxed_unsync()
}

/// A response the router writes on its own (404, 405, failed handshakes).
pub(crate) fn plain(status: Status, text: &'static str) -> Response {
    let mut res = http::Response::new(full(text));
    *res.status_mut() = status.into();
    res.headers_mut().insert(CONTENT_TYPE, ContentType::Text.into());
    res
}

pub(crate) fn status_only(status: Status) -> Response {
    let mut res = http::Response::new(empty());
    *res.status_mut() = status.into();
    res
}
