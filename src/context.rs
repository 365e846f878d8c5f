//! Per-request context: parsed inputs, the middleware chain, and the
//! response being written.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, Uri};
use http_body_util::{BodyExt, Limited};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::data::{Cache, Data};
use crate::error::{BoxError, Error, Result};
use crate::format::Format;
use crate::handler::{BoxFuture, BoxedHandle};
use crate::method::Method;
use crate::params::Params;
use crate::request::{Cookie, Request};
use crate::response::{self, ContentType, Response};

pub(crate) type WebSocket = WebSocketStream<TokioIo<Upgraded>>;

/// A file uploaded in a `multipart/form-data` body.
#[derive(Clone, Debug)]
pub struct FormFile {
    /// The form field name.
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Everything a handle sees of one request, and what it writes back.
///
/// A context is built for each request before the chain runs. Router
/// middlewares, group middlewares, route middlewares and the route handle
/// all receive the same `&mut Context`, in that order.
///
/// ```rust
/// use easierweb::{Context, Result, Status};
///
/// async fn hello(ctx: &mut Context) -> Result<()> {
///     let name = ctx.path.get("name").unwrap_or("world").to_owned();
///     ctx.write_string(Status::Ok, format!("hello {name}"));
///     Ok(())
/// }
/// ```
pub struct Context {
    /// The registered route pattern, root path included (e.g. `/api/members/{id}`).
    pub route: String,
    /// Request headers, lower-case names, first value per name.
    pub header: Params,
    pub path: Params,
    pub query: Params,
    pub form: Params,
    /// The raw body, unless it was consumed as a form.
    pub body: Data,
    /// The status written, 0 until something is written.
    pub code: u16,
    /// The bytes written.
    pub result: Data,
    pub cache: Cache,

    request: Request,
    files: Vec<FormFile>,
    response_headers: HeaderMap,
    written: bool,
    handles: Vec<BoxedHandle>,
    index: usize,
    websocket: Option<WebSocket>,
    closed: bool,
    stream: Option<mpsc::Sender<Bytes>>,
    /// XML root element for the reply an easy handle is writing.
    pub(crate) reply_root: Option<&'static str>,
}

impl Context {
    pub(crate) fn new(request: Request, route: String, path: Params, handles: Vec<BoxedHandle>) -> Self {
        let mut header = Params::new();
        for (name, value) in request.headers() {
            header.insert_first(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let query = Params::from_urlencoded(request.uri().query().unwrap_or_default().as_bytes());

        Self {
            route,
            header,
            path,
            query,
            form: Params::new(),
            body: Data::new(),
            code: 0,
            result: Data::new(),
            cache: Cache::default(),
            request,
            files: Vec::new(),
            response_headers: HeaderMap::new(),
            written: false,
            handles,
            index: 0,
            websocket: None,
            closed: false,
            stream: None,
            reply_root: None,
        }
    }

    /// Reads the request body into `form`/files or `body`, depending on
    /// the request content type. Multipart bodies above `multipart_limit`
    /// bytes are rejected.
    pub(crate) async fn load_body<B>(&mut self, body: B, multipart_limit: usize) -> Result<()>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let content_type = self.request.header("content-type").unwrap_or_default().to_owned();

        if content_type.contains("multipart/form-data") {
            let bytes = match Limited::new(body, multipart_limit).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.is::<http_body_util::LengthLimitError>() => {
                    return Err(Error::PayloadTooLarge { limit: multipart_limit });
                }
                Err(e) => return Err(Error::Body(e)),
            };
            return self.load_multipart(&content_type, bytes).await;
        }

        let bytes = body.collect().await.map_err(|e| Error::Body(e.into()))?.to_bytes();
        if content_type.contains("application/x-www-form-urlencoded") {
            self.form = Params::from_urlencoded(&bytes);
        } else {
            self.body = Data::from(bytes);
        }
        Ok(())
    }

    async fn load_multipart(&mut self, content_type: &str, bytes: Bytes) -> Result<()> {
        let boundary = multer::parse_boundary(content_type)?;
        let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(bytes) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field.bytes().await?;
                    self.files.push(FormFile { name, file_name: Some(file_name), content_type, data });
                }
                None => {
                    let value = field.text().await?;
                    self.form.insert_first(name, value);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn attach_websocket(&mut self, ws: WebSocket) {
        self.websocket = Some(ws);
        self.code = u16::from(crate::Status::SwitchingProtocols);
        self.written = true;
    }

    pub(crate) fn attach_stream(&mut self, tx: mpsc::Sender<Bytes>) {
        self.stream = Some(tx);
        self.code = u16::from(crate::Status::Ok);
        self.written = true;
    }

    // ── Chain ─────────────────────────────────────────────────────────────────

    /// Runs the whole chain from the first handle.
    pub(crate) async fn run(&mut self) -> Result<()> {
        self.index = 0;
        self.proceed().await
    }

    /// Runs every handle after the current one, then returns to the caller.
    ///
    /// Middleware that needs to act after the route handle awaits this:
    ///
    /// ```rust
    /// use easierweb::{Context, Result};
    ///
    /// async fn timing(ctx: &mut Context) -> Result<()> {
    ///     let start = std::time::Instant::now();
    ///     let outcome = ctx.next().await;
    ///     tracing::debug!(elapsed = ?start.elapsed(), route = %ctx.route);
    ///     outcome
    /// }
    /// ```
    pub fn next(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.index += 1;
            self.proceed().await
        })
    }

    /// Stops the chain: no handle after the current one runs.
    pub fn abort(&mut self) {
        self.index = self.handles.len() + 1;
    }

    async fn proceed(&mut self) -> Result<()> {
        while self.index < self.handles.len() {
            let handle = Arc::clone(&self.handles[self.index]);
            handle.call(self).await?;
            self.index += 1;
        }
        Ok(())
    }

    // ── Form files ────────────────────────────────────────────────────────────

    pub fn file_keys(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    /// The first uploaded file under the form field `key`.
    pub fn file(&self, key: &str) -> Result<&FormFile> {
        self.files
            .iter()
            .find(|f| f.name == key)
            .ok_or_else(|| Error::FileNotFound(key.to_owned()))
    }

    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    // ── Binding ───────────────────────────────────────────────────────────────

    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T> {
        self.query.bind()
    }

    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T> {
        self.form.bind()
    }

    pub fn bind_path<T: DeserializeOwned>(&self) -> Result<T> {
        self.path.bind()
    }

    pub fn bind_header<T: DeserializeOwned>(&self) -> Result<T> {
        self.header.bind()
    }

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.body.parse_json()
    }

    pub fn bind_yaml<T: DeserializeOwned>(&self) -> Result<T> {
        self.body.parse_yaml()
    }

    pub fn bind_xml<T: DeserializeOwned>(&self) -> Result<T> {
        self.body.parse_xml()
    }

    // ── Writing ───────────────────────────────────────────────────────────────

    /// Writes the status and body. Only the first write of a request takes
    /// effect; later ones are ignored.
    pub fn write(&mut self, code: impl Into<u16>, data: impl Into<Data>) {
        if self.written {
            return;
        }
        self.code = code.into();
        self.result = data.into();
        self.written = true;
    }

    pub fn write_as<T: Serialize + ?Sized>(&mut self, format: Format, code: impl Into<u16>, value: &T) -> Result<()> {
        if self.written {
            return Ok(());
        }
        let bytes = match self.reply_root {
            Some(root) => format.encode_with_root(root, value)?,
            None => format.encode(value)?,
        };
        self.default_content_type(format.content_type());
        self.write(code, bytes);
        Ok(())
    }

    pub fn write_json<T: Serialize + ?Sized>(&mut self, code: impl Into<u16>, value: &T) -> Result<()> {
        self.write_as(Format::Json, code, value)
    }

    pub fn write_yaml<T: Serialize + ?Sized>(&mut self, code: impl Into<u16>, value: &T) -> Result<()> {
        self.write_as(Format::Yaml, code, value)
    }

    pub fn write_xml<T: Serialize + ?Sized>(&mut self, code: impl Into<u16>, value: &T) -> Result<()> {
        self.write_as(Format::Xml, code, value)
    }

    pub fn write_string(&mut self, code: impl Into<u16>, text: impl Into<String>) {
        if self.written {
            return;
        }
        self.default_content_type(ContentType::Text.as_str());
        self.write(code, text.into());
    }

    pub fn write_html(&mut self, code: impl Into<u16>, html: impl Into<String>) {
        if self.written {
            return;
        }
        self.default_content_type(ContentType::Html.as_str());
        self.write(code, html.into());
    }

    pub fn no_content(&mut self, code: impl Into<u16>) {
        self.write(code, Data::new());
    }

    pub fn redirect(&mut self, code: impl Into<u16>, url: &str) -> Result<()> {
        if self.written {
            return Ok(());
        }
        let location = HeaderValue::try_from(url).map_err(Error::header)?;
        self.response_headers.insert(LOCATION, location);
        self.write(code, Data::new());
        Ok(())
    }

    /// Sends `data` as a download. Without a file name the current unix
    /// timestamp is used; without a content type,
    /// `application/octet-stream`.
    pub fn write_file(&mut self, content_type: Option<&str>, file_name: Option<&str>, data: impl Into<Data>) -> Result<()> {
        if self.written {
            return Ok(());
        }
        let file_name = match file_name.filter(|n| !n.is_empty()) {
            Some(name) => name.to_owned(),
            None => unix_timestamp().to_string(),
        };
        self.set_content_disposition(&format!("attachment; filename=\"{file_name}\""))?;
        self.set_content_type(content_type.filter(|c| !c.is_empty()).unwrap_or(ContentType::OctetStream.as_str()))?;
        self.write(crate::Status::Ok, data);
        Ok(())
    }

    pub async fn write_local_file(
        &mut self,
        content_type: Option<&str>,
        file_name: Option<&str>,
        path: impl AsRef<std::path::Path>,
    ) -> Result<()> {
        if self.written {
            return Ok(());
        }
        let bytes = tokio::fs::read(path).await?;
        self.write_file(content_type, file_name, bytes)
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(key, value)?;
        self.response_headers.insert(name, value);
        Ok(())
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(key, value)?;
        self.response_headers.append(name, value);
        Ok(())
    }

    pub fn set_content_type(&mut self, value: &str) -> Result<()> {
        self.set_header(CONTENT_TYPE.as_str(), value)
    }

    pub fn set_content_disposition(&mut self, value: &str) -> Result<()> {
        self.set_header(CONTENT_DISPOSITION.as_str(), value)
    }

    /// Whether a response has been written.
    pub fn written(&self) -> bool {
        self.written
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    fn default_content_type(&mut self, value: &'static str) {
        self.response_headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(value));
    }

    pub(crate) fn into_response(self) -> Response {
        let status = if self.written { self.code } else { u16::from(crate::Status::Ok) };
        let mut res = http::Response::new(response::full(self.result.into_bytes()));
        *res.status_mut() = http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::OK);
        *res.headers_mut() = self.response_headers;
        res
    }

    // ── WebSocket ─────────────────────────────────────────────────────────────

    /// Waits for the next text or binary message. Ping and pong frames are
    /// skipped; a close frame yields [`Error::WebSocketClosed`].
    pub async fn receive(&mut self) -> Result<Data> {
        let ws = self.websocket.as_mut().ok_or(Error::NotWebSocket)?;
        let outcome = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break Ok(Data::from(text.as_str())),
                Some(Ok(Message::Binary(bytes))) => break Ok(Data::from(bytes)),
                Some(Ok(Message::Close(_))) | None => break Err(Error::WebSocketClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(Error::WebSocket(e)),
            }
        };
        if matches!(outcome, Err(Error::WebSocketClosed)) {
            self.closed = true;
        }
        outcome
    }

    pub async fn receive_string(&mut self) -> Result<String> {
        Ok(self.receive().await?.to_string_lossy().into_owned())
    }

    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.receive().await?.parse_json()
    }

    pub async fn receive_yaml<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.receive().await?.parse_yaml()
    }

    pub async fn receive_xml<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.receive().await?.parse_xml()
    }

    /// Sends `msg` as a text frame when it is valid UTF-8, as a binary
    /// frame otherwise.
    pub async fn send(&mut self, msg: impl Into<Data>) -> Result<()> {
        let ws = self.websocket.as_mut().ok_or(Error::NotWebSocket)?;
        let message = match String::from_utf8(msg.into().into_vec()) {
            Ok(text) => Message::text(text),
            Err(e) => Message::binary(e.into_bytes()),
        };
        ws.send(message).await?;
        Ok(())
    }

    pub async fn send_string(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(text.into()).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = Format::Json.encode(value)?;
        self.send(bytes).await
    }

    pub async fn send_yaml<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = Format::Yaml.encode(value)?;
        self.send(bytes).await
    }

    pub async fn send_xml<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = Format::Xml.encode(value)?;
        self.send(bytes).await
    }

    /// Closes the WebSocket connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let ws = self.websocket.as_mut().ok_or(Error::NotWebSocket)?;
        match ws.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(e.into()),
        }
        self.closed = true;
        Ok(())
    }

    // ── Server-sent events ────────────────────────────────────────────────────

    /// Sends `msg` followed by `split` to the client and flushes it.
    ///
    /// ```rust
    /// use easierweb::{Context, Result};
    ///
    /// async fn ticker(ctx: &mut Context) -> Result<()> {
    ///     for i in 0..3 {
    ///         ctx.push(&format!("data: tick {i}"), "\n\n").await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn push(&mut self, msg: &str, split: &str) -> Result<()> {
        let tx = self.stream.as_ref().ok_or(Error::NotEventStream)?;
        tx.send(Bytes::from(format!("{msg}{split}")))
            .await
            .map_err(|_| Error::StreamClosed)
    }

    pub async fn push_json<T: Serialize + ?Sized>(&mut self, value: &T, split: &str) -> Result<()> {
        let bytes = Data::from(Format::Json.encode(value)?);
        self.push(&bytes.to_string_lossy(), split).await
    }

    pub async fn push_yaml<T: Serialize + ?Sized>(&mut self, value: &T, split: &str) -> Result<()> {
        let bytes = Data::from(Format::Yaml.encode(value)?);
        self.push(&bytes.to_string_lossy(), split).await
    }

    pub async fn push_xml<T: Serialize + ?Sized>(&mut self, value: &T, split: &str) -> Result<()> {
        let bytes = Data::from(Format::Xml.encode(value)?);
        self.push(&bytes.to_string_lossy(), split).await
    }

    // ── Request info ──────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method() }
    pub fn uri(&self) -> &Uri { self.request.uri() }
    pub fn request_uri(&self) -> &str { self.request.request_uri() }
    pub fn remote_addr(&self) -> SocketAddr { self.request.remote_addr() }
    pub fn host(&self) -> &str { self.request.host() }
    pub fn proto(&self) -> &'static str { self.request.proto() }
    pub fn cookie(&self, name: &str) -> Option<Cookie> { self.request.cookie(name) }
    pub fn cookies(&self) -> Vec<Cookie> { self.request.cookies() }
}

fn header_pair(key: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(key).map_err(Error::header)?;
    let value = HeaderValue::try_from(value).map_err(Error::header)?;
    Ok((name, value))
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;
    use serde::Deserialize;

    use super::*;
    use crate::handler::boxed;
    use crate::test_support::context;
    use crate::Status;

    #[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
    struct Member {
        id: i64,
        name: String,
    }

    #[test]
    fn parses_headers_and_query() {
        let ctx = context(Method::Get, "/members?page=2&page=3&name=a%20b", &[("X-Token", "t1")], Vec::new());
        assert_eq!(ctx.header.get("x-token"), Some("t1"));
        assert_eq!(ctx.query.get("page"), Some("2"));
        assert_eq!(ctx.query.get("name"), Some("a b"));
    }

    #[tokio::test]
    async fn urlencoded_body_goes_to_form() {
        let mut ctx = context(
            Method::Post,
            "/members",
            &[("content-type", "application/x-www-form-urlencoded")],
            Vec::new(),
        );
        ctx.load_body(Full::new(Bytes::from_static(b"id=1&name=dpwgc")), 1024).await.unwrap();
        assert!(ctx.body.is_empty());
        assert_eq!(ctx.bind_form::<Member>().unwrap(), Member { id: 1, name: "dpwgc".into() });
    }

    #[tokio::test]
    async fn raw_body_is_kept() {
        let mut ctx = context(Method::Post, "/members", &[("content-type", "application/json")], Vec::new());
        ctx.load_body(Full::new(Bytes::from_static(br#"{"id":2,"name":"x"}"#)), 1024).await.unwrap();
        assert_eq!(ctx.bind_json::<Member>().unwrap(), Member { id: 2, name: "x".into() });
        assert!(ctx.form.is_empty());
    }

    const MULTIPART: &str = "--X\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        dpwgc\r\n\
        --X\r\n\
        Content-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        file body\r\n\
        --X--\r\n";

    #[tokio::test]
    async fn multipart_splits_fields_and_files() {
        let mut ctx = context(Method::Post, "/upload", &[("content-type", "multipart/form-data; boundary=X")], Vec::new());
        ctx.load_body(Full::new(Bytes::from_static(MULTIPART.as_bytes())), 1 << 20).await.unwrap();
        assert_eq!(ctx.form.get("name"), Some("dpwgc"));
        assert_eq!(ctx.file_keys(), vec!["avatar"]);
        let file = ctx.file("avatar").unwrap();
        assert_eq!(file.file_name.as_deref(), Some("a.txt"));
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(&file.data[..], b"file body");
        assert!(matches!(ctx.file("missing"), Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn multipart_over_limit_is_rejected() {
        let mut ctx = context(Method::Post, "/upload", &[("content-type", "multipart/form-data; boundary=X")], Vec::new());
        let err = ctx.load_body(Full::new(Bytes::from_static(MULTIPART.as_bytes())), 16).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 16 }));
    }

    #[test]
    fn first_write_wins() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        ctx.write_json(Status::Created, &Member { id: 1, name: "a".into() }).unwrap();
        ctx.write_string(Status::Ok, "ignored");
        assert_eq!(ctx.code, 201);
        assert_eq!(ctx.result.as_str(), Some(r#"{"id":1,"name":"a"}"#));
        assert_eq!(ctx.response_headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        ctx.set_content_type("application/vnd.member+json").unwrap();
        ctx.write_json(Status::Ok, &Member::default()).unwrap();
        assert_eq!(ctx.response_headers()[CONTENT_TYPE], "application/vnd.member+json");
    }

    #[test]
    fn write_file_sets_disposition() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        ctx.write_file(None, Some("report.csv"), "a,b").unwrap();
        assert_eq!(ctx.response_headers()[CONTENT_DISPOSITION], "attachment; filename=\"report.csv\"");
        assert_eq!(ctx.response_headers()[CONTENT_TYPE], "application/octet-stream");

        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        ctx.write_file(Some("text/csv"), None, "a,b").unwrap();
        let disposition = ctx.response_headers()[CONTENT_DISPOSITION].to_str().unwrap().to_owned();
        assert!(disposition.starts_with("attachment; filename=\""), "{disposition}");
        assert_eq!(ctx.response_headers()[CONTENT_TYPE], "text/csv");
    }

    #[test]
    fn invalid_header_is_an_error() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        assert!(matches!(ctx.set_header("bad header", "v"), Err(Error::Header(_))));
        assert!(matches!(ctx.add_header("x-ok", "line\nbreak"), Err(Error::Header(_))));
    }

    #[test]
    fn unwritten_context_answers_200() {
        let ctx = context(Method::Get, "/", &[], Vec::new());
        assert_eq!(ctx.into_response().status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn websocket_and_sse_calls_need_their_route() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        assert!(matches!(ctx.send_string("x").await, Err(Error::NotWebSocket)));
        assert!(matches!(ctx.receive().await, Err(Error::NotWebSocket)));
        assert!(matches!(ctx.push("x", "\n").await, Err(Error::NotEventStream)));
    }

    #[tokio::test]
    async fn push_appends_split() {
        let mut ctx = context(Method::Get, "/", &[], Vec::new());
        let (tx, mut rx) = mpsc::channel(4);
        ctx.attach_stream(tx);
        ctx.push("data: 1", "\n\n").await.unwrap();
        ctx.push_json(&Member { id: 3, name: "c".into() }, "\n").await.unwrap();
        assert_eq!(&rx.recv().await.unwrap()[..], b"data: 1\n\n");
        assert_eq!(&rx.recv().await.unwrap()[..], b"{\"id\":3,\"name\":\"c\"}\n");
        assert!(ctx.written());
    }

    async fn first(ctx: &mut Context) -> Result<()> {
        ctx.cache.set("order", vec!["first-in"]);
        ctx.next().await?;
        if let Some(order) = ctx.cache.get::<Vec<&'static str>>("order").cloned() {
            let mut order = order;
            order.push("first-out");
            ctx.cache.set("order", order);
        }
        Ok(())
    }

    async fn second(ctx: &mut Context) -> Result<()> {
        if let Some(order) = ctx.cache.get::<Vec<&'static str>>("order").cloned() {
            let mut order = order;
            order.push("second");
            ctx.cache.set("order", order);
        }
        Ok(())
    }

    async fn gate(ctx: &mut Context) -> Result<()> {
        ctx.write_string(Status::Unauthorized, "no");
        ctx.abort();
        Ok(())
    }

    #[tokio::test]
    async fn next_runs_the_rest_before_returning() {
        let mut ctx = context(Method::Get, "/", &[], vec![boxed(first), boxed(second)]);
        ctx.run().await.unwrap();
        assert_eq!(ctx.cache.get::<Vec<&'static str>>("order").unwrap(), &vec!["first-in", "second", "first-out"]);
    }

    #[tokio::test]
    async fn abort_skips_remaining_handles() {
        let mut ctx = context(Method::Get, "/", &[], vec![boxed(gate), boxed(second)]);
        ctx.cache.set("order", Vec::<&str>::new());
        ctx.run().await.unwrap();
        assert_eq!(ctx.code, 401);
        assert!(ctx.cache.get::<Vec<&'static str>>("order").unwrap().is_empty());
    }
}
