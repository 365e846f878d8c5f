//! Helpers shared by the unit tests.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Uri, Version};
use http_body_util::{BodyExt, Full};

use crate::context::Context;
use crate::handler::BoxedHandle;
use crate::method::Method;
use crate::params::Params;
use crate::request::Request;
use crate::router::Router;
use crate::server::dispatch;

pub(crate) const PEER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 40000);

/// A context for `uri` with no path parameters; the route is the URI path.
pub(crate) fn context(method: Method, uri: &str, headers: &[(&str, &str)], handles: Vec<BoxedHandle>) -> Context {
    let uri: Uri = uri.parse().unwrap();
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(HeaderName::try_from(*name).unwrap(), HeaderValue::try_from(*value).unwrap());
    }
    let route = uri.path().to_owned();
    let request = Request::new(method, uri, Version::HTTP_11, map, PEER);
    Context::new(request, route, Params::new(), handles)
}

/// Dispatches one in-process request and returns status, headers and body.
pub(crate) async fn call(
    router: impl Into<Arc<Router>>,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (u16, HeaderMap, String) {
    let mut req = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    let req = req.body(Full::new(Bytes::copy_from_slice(body.as_bytes()))).unwrap();

    let res = dispatch(router.into(), req, PEER).await;
    let (parts, body) = res.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    (parts.status.as_u16(), parts.headers, String::from_utf8_lossy(&bytes).into_owned())
}
