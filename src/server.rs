//! HTTP server, request dispatch and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! The server stops on Ctrl-C, SIGTERM, or [`Closer::close`](crate::Closer::close).
//! It then:
//! 1. Stops `listener.accept()`, so no new connections are made.
//! 2. Asks every open connection to finish its in-flight requests and close.
//! 3. Waits for every connection task, then returns from `run` / `serve`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::method::Method;
use crate::request::Request;
use crate::response::{self, ContentType, Response};
use crate::router::{Lookup, RouteKind, Router};
use crate::status::Status;
use crate::tls;

/// Messages buffered between an SSE handle and the client.
const EVENT_STREAM_BUFFER: usize = 32;

const BANNER: &str = r"  ______          _        __          __  _
 |  ____|        (_)       \ \        / / | |
 | |__   __ _ ___ _  ___ _ _\ \  /\  / /__| |__
 |  __| / _` / __| |/ _ \ '__\ \/  \/ / _ \ '_ \
 | |___| (_| \__ \ |  __/ |   \  /\  /  __/ |_) |
 |______\__,_|___/_|\___|_|    \/  \/ \___|_.__/";

/// The HTTP server. [`Router::run`] and [`Router::run_tls`] are shorthands
/// for the common cases.
///
/// ```rust,no_run
/// use easierweb::{Router, Server};
///
/// # async fn start(router: Router) -> easierweb::Result<()> {
/// Server::bind(":8443")
///     .tls("cert.pem", "key.pem")?
///     .serve(router)
///     .await
/// # }
/// ```
pub struct Server {
    addr: String,
    tls: Option<TlsAcceptor>,
}

impl Server {
    /// Configures the address to listen on. A bare port such as `":8080"`
    /// listens on every interface.
    pub fn bind(addr: &str) -> Self {
        let addr = if addr.starts_with(':') { format!("0.0.0.0{addr}") } else { addr.to_owned() };
        Self { addr, tls: None }
    }

    /// Serves HTTPS with the PEM certificate chain and private key.
    pub fn tls(mut self, cert_file: impl AsRef<Path>, key_file: impl AsRef<Path>) -> Result<Self> {
        self.tls = Some(tls::acceptor(cert_file.as_ref(), key_file.as_ref())?);
        Ok(self)
    }

    /// Binds, then serves `router` until shutdown.
    pub async fn serve(self, router: Router) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        serve_listener(listener, router, self.tls).await
    }
}

impl Router {
    /// Serves plain HTTP on `addr` until shutdown.
    pub async fn run(self, addr: &str) -> Result<()> {
        Server::bind(addr).serve(self).await
    }

    /// Serves HTTPS on `addr` until shutdown.
    pub async fn run_tls(self, addr: &str, cert_file: impl AsRef<Path>, key_file: impl AsRef<Path>) -> Result<()> {
        Server::bind(addr).tls(cert_file, key_file)?.serve(self).await
    }

    /// Serves plain HTTP on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        serve_listener(listener, self, None).await
    }
}

async fn serve_listener(listener: TcpListener, router: Router, tls: Option<TlsAcceptor>) -> Result<()> {
    let local_addr = listener.local_addr()?;
    if !router.options.close_console_print {
        println!("{BANNER}");
        println!("\x1b[1;32;40m >>> http server started on [{local_addr}] \x1b[0m");
    }
    info!(addr = %local_addr, tls = tls.is_some(), "http server started");

    let shutdown_tx = Arc::clone(&router.shutdown);
    let router = Arc::new(router);

    // JoinSet tracks every connection task so shutdown can wait for them.
    let mut tasks = JoinSet::new();

    let shutdown = shutdown_signal(shutdown_tx.subscribe());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so a signal stops accepting immediately,
            // even if more connections are queued.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let router = Arc::clone(&router);
                let closed = shutdown_tx.subscribe();
                let tls = tls.clone();

                tasks.spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, remote_addr, router, closed).await,
                            Err(e) => warn!(peer = %remote_addr, "tls handshake failed: {e}"),
                        },
                        None => serve_connection(stream, remote_addr, router, closed).await,
                    }
                });
            }

            // Reap finished connection tasks so the set does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    // Tell open connections to finish, then wait for all of them.
    shutdown_tx.send_replace(true);
    while tasks.join_next().await.is_some() {}

    info!("http server stopped");
    Ok(())
}

async fn serve_connection<S>(stream: S, remote_addr: SocketAddr, router: Arc<Router>, closed: watch::Receiver<bool>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(dispatch(router, req, remote_addr).await) }
    });

    // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever the client
    // negotiates; upgrades are needed for WebSocket handshakes.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                debug!(peer = %remote_addr, "connection error: {e}");
            }
        }
        () = wait_closed(closed) => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(peer = %remote_addr, "connection error during shutdown: {e}");
            }
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Every failure is turned
/// into a response here, so hyper never sees an error.
pub(crate) async fn dispatch<B>(router: Arc<Router>, mut req: http::Request<B>, remote_addr: SocketAddr) -> Response
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let Ok(method) = Method::try_from(req.method()) else {
        return response::plain(Status::MethodNotAllowed, "405 method not allowed");
    };

    let (kind, pattern, params, handles) = match router.lookup(method, req.uri().path()) {
        Lookup::Found(route, params) => {
            let handles = router.middlewares.iter().chain(route.handles.iter()).cloned().collect();
            (route.kind, route.pattern.to_string(), params, handles)
        }
        Lookup::NotFound => return response::plain(Status::NotFound, "404 page not found"),
        Lookup::NotAllowed(methods) => return not_allowed(&methods),
    };

    let request = Request::new(method, req.uri().clone(), req.version(), req.headers().clone(), remote_addr);
    let mut ctx = Context::new(request, pattern, params, handles);

    match kind {
        RouteKind::Http => {
            if load_body(&router, &mut ctx, req.into_body()).await {
                run_chain(&router, &mut ctx).await;
            }
            ctx.into_response()
        }
        RouteKind::WebSocket => {
            let on_upgrade = hyper::upgrade::on(&mut req);
            upgrade_websocket(router, ctx, on_upgrade)
        }
        RouteKind::EventStream => {
            if !load_body(&router, &mut ctx, req.into_body()).await {
                return ctx.into_response();
            }
            open_event_stream(router, ctx)
        }
    }
}

/// Reads the body into the context. A failure is reported through the
/// error handle and `false` is returned.
async fn load_body<B>(router: &Router, ctx: &mut Context, body: B) -> bool
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match ctx.load_body(body, router.options.multipart_form_max_size).await {
        Ok(()) => true,
        Err(err) => {
            handle_error(router, ctx, &err);
            false
        }
    }
}

/// Runs the chain; an error or a panic goes to the error handle.
async fn run_chain(router: &Router, ctx: &mut Context) {
    let outcome = match AssertUnwindSafe(ctx.run()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::from_panic(payload)),
    };
    if let Err(err) = outcome {
        handle_error(router, ctx, &err);
    }
}

fn handle_error(router: &Router, ctx: &mut Context, err: &Error) {
    let error_handle = &router.error_handle;
    ctx.reply_root = None;
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| error_handle(ctx, err))) {
        error!(route = %ctx.route, error = %err, panic = %Error::from_panic(payload), "error handle panicked");
    }
}

fn not_allowed(methods: &[Method]) -> Response {
    let mut res = response::plain(Status::MethodNotAllowed, "405 method not allowed");
    let allow = methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::try_from(allow) {
        res.headers_mut().insert(http::header::ALLOW, value);
    }
    res
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

/// Answers the handshake with `101 Switching Protocols` and runs the chain
/// on the upgraded connection in its own task.
fn upgrade_websocket(router: Arc<Router>, mut ctx: Context, on_upgrade: hyper::upgrade::OnUpgrade) -> Response {
    let is_upgrade = ctx
        .header
        .get("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let Some(key) = ctx.header.get(SEC_WEBSOCKET_KEY.as_str()).filter(|_| is_upgrade) else {
        return response::plain(Status::BadRequest, "400 expected a websocket handshake");
    };
    let Ok(accept) = HeaderValue::try_from(derive_accept_key(key.as_bytes())) else {
        return response::plain(Status::BadRequest, "400 invalid websocket key");
    };

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!(route = %ctx.route, "websocket upgrade failed: {e}");
                return;
            }
        };
        let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        ctx.attach_websocket(ws);
        run_chain(&router, &mut ctx).await;
        if let Err(e) = ctx.close().await {
            debug!(route = %ctx.route, "websocket close: {e}");
        }
    });

    let mut res = response::status_only(Status::SwitchingProtocols);
    let headers = res.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    res
}

// ── Server-sent events ────────────────────────────────────────────────────────

/// Streams whatever the chain pushes. The stream ends when the chain
/// returns and the context, holding the only sender, is dropped.
fn open_event_stream(router: Arc<Router>, mut ctx: Context) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(EVENT_STREAM_BUFFER);
    ctx.attach_stream(tx);

    tokio::spawn(async move {
        run_chain(&router, &mut ctx).await;
        debug!(route = %ctx.route, "event stream finished");
    });

    let frames = futures::stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((Ok::<_, Infallible>(Frame::data(chunk)), rx))
    });

    let mut res = http::Response::new(StreamBody::new(frames).boxed_unsync());
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, ContentType::EventStream.into());
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// Resolves on Ctrl-C, SIGTERM (Unix), or [`Closer::close`](crate::Closer::close).
async fn shutdown_signal(closed: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // SIGTERM does not exist outside Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
        () = wait_closed(closed) => {}
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::handler::boxed;
    use crate::plugins::{self, ErrorHandleOptions};
    use crate::router::{EasyOptions, RouterOptions};
    use crate::test_support::call;

    #[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
    struct Member {
        id: i64,
        name: String,
    }

    async fn hello(ctx: &mut Context) -> Result<()> {
        let name = ctx.path.get("name").unwrap_or_default().to_owned();
        ctx.write_string(Status::Ok, format!("hello {name}"));
        Ok(())
    }

    async fn fails(_ctx: &mut Context) -> Result<()> {
        Err("db down".into())
    }

    async fn panics(_ctx: &mut Context) -> Result<()> {
        panic!("bad state")
    }

    async fn tag(ctx: &mut Context) -> Result<()> {
        ctx.set_header("x-tag", "router")?;
        ctx.next().await
    }

    async fn create(_ctx: &mut Context, cmd: Member) -> Result<Option<Member>> {
        Ok(Some(cmd))
    }

    async fn remove(_ctx: &mut Context, _cmd: Member) -> Result<()> {
        Ok(())
    }

    async fn quiet(_ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    #[tokio::test]
    async fn routes_with_path_params() {
        let (status, _, body) = call(Router::new().get("/hello/:name", hello), "GET", "/hello/dpwgc", &[], "").await;
        assert_eq!(status, 200);
        assert_eq!(body, "hello dpwgc");
    }

    #[tokio::test]
    async fn path_params_arrive_decoded() {
        let (status, _, body) = call(Router::new().get("/hello/:name", hello), "GET", "/hello/a%20b", &[], "").await;
        assert_eq!((status, body.as_str()), (200, "hello a b"));
    }

    #[tokio::test]
    async fn not_found_and_not_allowed() {
        let router = Router::new().get("/hello/:name", hello).delete("/hello/:name", hello);
        let (status, _, body) = call(Router::new(), "GET", "/missing", &[], "").await;
        assert_eq!((status, body.as_str()), (404, "404 page not found"));

        let (status, headers, _) = call(router, "POST", "/hello/x", &[], "").await;
        assert_eq!(status, 405);
        assert_eq!(headers["allow"], "GET, DELETE");
    }

    #[tokio::test]
    async fn unknown_method_is_405() {
        let (status, _, _) = call(Router::new().get("/", hello), "PURGE", "/", &[], "").await;
        assert_eq!(status, 405);
    }

    #[tokio::test]
    async fn errors_and_panics_reach_the_error_handle() {
        let router = Router::new().get("/fails", fails).get("/panics", panics);
        let router = Arc::new(router);

        let (status, _, body) = call(Arc::clone(&router), "GET", "/fails", &[], "").await;
        assert_eq!((status, body.as_str()), (500, r#"{"error":"db down"}"#));

        let (status, _, body) = call(router, "GET", "/panics", &[], "").await;
        assert_eq!((status, body.as_str()), (500, r#"{"error":"panic: bad state"}"#));
    }

    #[tokio::test]
    async fn panicking_error_handle_is_contained() {
        let broken: plugins::ErrorHandle = Arc::new(|_: &mut Context, _: &Error| panic!("error handle broke"));
        let router = Router::with_options(RouterOptions { error_handle: Some(broken), ..Default::default() })
        .get("/fails", fails);
        let (status, _, body) = call(router, "GET", "/fails", &[], "").await;
        assert_eq!((status, body.as_str()), (200, ""));
    }

    #[tokio::test]
    async fn router_middleware_applies_to_earlier_routes() {
        let router = Router::new().get("/hello/:name", hello).middleware(tag);
        let (_, headers, _) = call(router, "GET", "/hello/x", &[], "").await;
        assert_eq!(headers["x-tag"], "router");
    }

    #[tokio::test]
    async fn easy_handles_end_to_end() {
        let router = Router::with_options(RouterOptions { root_path: "/api".into(), ..Default::default() })
            .easy_post("/members", create)
            .easy_delete("/members/:id", remove)
            .easy_route_with(
                Method::Put,
                "/members",
                create,
                EasyOptions {
                    request_handle: Some(plugins::yaml_request_handle()),
                    response_handle: Some(plugins::yaml_response_handle()),
                    middlewares: vec![boxed(tag)],
                },
            );
        let router = Arc::new(router);

        let json = &[("content-type", "application/json")];
        let (status, _, body) = call(Arc::clone(&router), "POST", "/api/members", json, r#"{"id":1,"name":"a"}"#).await;
        assert_eq!((status, body.as_str()), (200, r#"{"id":1,"name":"a"}"#));

        let form = &[("content-type", "application/x-www-form-urlencoded")];
        let (status, _, body) = call(Arc::clone(&router), "POST", "/api/members?name=q", form, "id=2&name=f").await;
        assert_eq!((status, body.as_str()), (200, r#"{"id":2,"name":"q"}"#));

        let (status, _, body) = call(Arc::clone(&router), "DELETE", "/api/members/3", &[], "").await;
        assert_eq!((status, body.as_str()), (204, ""));

        let (status, _, body) = call(Arc::clone(&router), "POST", "/api/members", json, "{oops").await;
        assert_eq!(status, 500);
        assert!(body.starts_with(r#"{"error":"json:"#), "{body}");

        let (status, headers, body) = call(router, "PUT", "/api/members", &[], "id: 4\nname: y\n").await;
        assert_eq!((status, body.as_str()), (200, "id: 4\nname: y\n"));
        assert_eq!(headers["x-tag"], "router");
        assert_eq!(headers["content-type"], "application/yaml");
    }

    #[tokio::test]
    async fn partial_payloads_bind_over_defaults() {
        let router = Router::new()
            .easy_get("/members", create)
            .easy_post("/members", create)
            .easy_route_with(
                Method::Patch,
                "/members",
                create,
                EasyOptions {
                    request_handle: Some(plugins::xml_request_handle()),
                    response_handle: Some(plugins::xml_response_handle()),
                    ..Default::default()
                },
            );
        let router = Arc::new(router);
        let json = &[("content-type", "application/json")];

        let (status, _, body) = call(Arc::clone(&router), "POST", "/members", json, r#"{"name":"a"}"#).await;
        assert_eq!((status, body.as_str()), (200, r#"{"id":0,"name":"a"}"#));

        let (status, _, body) = call(Arc::clone(&router), "POST", "/members?id=3", json, r#"{"id":1,"name":"a"}"#).await;
        assert_eq!((status, body.as_str()), (200, r#"{"id":3,"name":"a"}"#));

        let (status, _, body) = call(Arc::clone(&router), "GET", "/members?name=a", &[], "").await;
        assert_eq!((status, body.as_str()), (200, r#"{"id":0,"name":"a"}"#));

        let (status, headers, body) =
            call(router, "PATCH", "/members?id=2", &[], "<Member><name>x</name></Member>").await;
        assert_eq!((status, body.as_str()), (200, "<Member><id>2</id><name>x</name></Member>"));
        assert_eq!(headers["content-type"], "application/xml");
    }

    #[tokio::test]
    async fn hidden_errors_with_string_handle() {
        let router = Router::with_options(RouterOptions {
            error_handle: Some(plugins::string_error_handle(ErrorHandleOptions::default())),
            ..Default::default()
        })
        .get("/fails", fails);
        let (status, _, body) = call(router, "GET", "/fails", &[], "").await;
        assert_eq!((status, body.as_str()), (500, "unexpected error"));
    }

    #[tokio::test]
    async fn oversized_multipart_goes_to_error_handle() {
        let router = Router::with_options(RouterOptions { multipart_form_max_size: 8, ..Default::default() })
            .post("/upload", quiet);
        let headers = &[("content-type", "multipart/form-data; boundary=X")];
        let (status, _, body) = call(router, "POST", "/upload", headers, "--X\r\n0123456789abcdef\r\n--X--\r\n").await;
        assert_eq!((status, body.as_str()), (500, r#"{"error":"request body exceeds 8 bytes"}"#));
    }

    #[tokio::test]
    async fn websocket_route_requires_handshake_headers() {
        let (status, _, _) = call(Router::new().ws("/ws", quiet), "GET", "/ws", &[], "").await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn static_dir_serves_files() {
        let dir = std::env::temp_dir().join(format!("easierweb-static-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(dir.join("app.js"), "console.log(1)").unwrap();
        std::fs::write(dir.join("read me.txt"), "spaced").unwrap();
        std::fs::write(dir.join("docs/index.html"), "<h1>docs</h1>").unwrap();

        let router = Arc::new(Router::new().static_dir("/assets/*filepath", &dir));

        let (status, headers, body) = call(Arc::clone(&router), "GET", "/assets/app.js", &[], "").await;
        assert_eq!((status, body.as_str()), (200, "console.log(1)"));
        assert_eq!(headers["content-type"], "text/javascript; charset=utf-8");

        let (_, _, body) = call(Arc::clone(&router), "GET", "/assets/docs", &[], "").await;
        assert_eq!(body, "<h1>docs</h1>");

        let (status, _, body) = call(Arc::clone(&router), "GET", "/assets/read%20me.txt", &[], "").await;
        assert_eq!((status, body.as_str()), (200, "spaced"));

        let (status, _, _) = call(Arc::clone(&router), "GET", "/assets/missing.css", &[], "").await;
        assert_eq!(status, 404);

        let (status, _, _) = call(router, "GET", "/assets/../secret", &[], "").await;
        assert_eq!(status, 404);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn bare_port_listens_everywhere() {
        assert_eq!(Server::bind(":8080").addr, "0.0.0.0:8080");
        assert_eq!(Server::bind("127.0.0.1:80").addr, "127.0.0.1:80");
    }
}
