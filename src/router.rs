//! Route registration and lookup.
//!
//! One radix tree per HTTP method, each mapping a pattern to an index into
//! the route table. Registration consumes and returns the router so calls
//! chain; build it once at startup and hand it to [`Router::run`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tokio::sync::watch;

use crate::group::Group;
use crate::handler::{BoxedHandle, EasyHandle, Handle};
use crate::method::Method;
use crate::params::Params;
use crate::plugins::{self, ErrorHandle, Plugins, RequestHandle, ResponseHandle};
use crate::static_files::StaticDir;

/// Default cap on a `multipart/form-data` body: 32 MiB.
pub const DEFAULT_MULTIPART_FORM_MAX_SIZE: usize = 32 << 20;

/// Router-wide settings.
///
/// The plain fields can be loaded from a config file:
///
/// ```rust,no_run
/// use easierweb::{read_yaml_config, Router, RouterOptions};
///
/// # fn main() -> easierweb::Result<()> {
/// // root_path: /api
/// // multipart_form_max_size: 1048576
/// let options: RouterOptions = read_yaml_config("router.yaml")?;
/// let router = Router::with_options(options);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Prefix added to every registered pattern, e.g. `/api`.
    pub root_path: String,
    /// Largest accepted `multipart/form-data` body, in bytes.
    pub multipart_form_max_size: usize,
    /// Skip the startup banner on stdout.
    pub close_console_print: bool,
    #[serde(skip)]
    pub error_handle: Option<ErrorHandle>,
    /// Request handle used by easy handles unless overridden per route.
    #[serde(skip)]
    pub request_handle: Option<RequestHandle>,
    /// Response handle used by easy handles unless overridden per route.
    #[serde(skip)]
    pub response_handle: Option<ResponseHandle>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            root_path: String::new(),
            multipart_form_max_size: DEFAULT_MULTIPART_FORM_MAX_SIZE,
            close_console_print: false,
            error_handle: None,
            request_handle: None,
            response_handle: None,
        }
    }
}

/// Per-route overrides for easy handles.
#[derive(Clone, Default)]
pub struct EasyOptions {
    pub request_handle: Option<RequestHandle>,
    pub response_handle: Option<ResponseHandle>,
    /// Middlewares run before this route's easy handle.
    pub middlewares: Vec<BoxedHandle>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RouteKind {
    Http,
    WebSocket,
    EventStream,
}

pub(crate) struct Route {
    pub(crate) pattern: Arc<str>,
    pub(crate) kind: RouteKind,
    /// Route-level handles: group middlewares, route middlewares, the handle.
    pub(crate) handles: Arc<[BoxedHandle]>,
}

pub(crate) enum Lookup<'r> {
    Found(&'r Route, Params),
    /// The path exists under these other methods.
    NotAllowed(Vec<Method>),
    NotFound,
}

/// Stops a running server gracefully. Obtained from [`Router::closer`].
#[derive(Clone)]
pub struct Closer(Arc<watch::Sender<bool>>);

impl Closer {
    /// Stops accepting connections, lets in-flight requests finish, and
    /// makes `run`/`serve` return.
    pub fn close(&self) {
        self.0.send_replace(true);
    }
}

/// The application router.
///
/// ```rust,no_run
/// use easierweb::{middleware, Context, Result, Router, Status};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     Router::new()
///         .middleware(middleware::logger)
///         .get("/hello/:name", hello)
///         .run(":8080")
///         .await
/// }
///
/// async fn hello(ctx: &mut Context) -> Result<()> {
///     let name = ctx.path.get("name").unwrap_or_default().to_owned();
///     ctx.write_string(Status::Ok, format!("hello {name}"));
///     Ok(())
/// }
/// ```
pub struct Router {
    pub(crate) options: RouterOptions,
    pub(crate) error_handle: ErrorHandle,
    plugins: Plugins,
    pub(crate) middlewares: Vec<BoxedHandle>,
    pub(crate) routes: Vec<Route>,
    trees: HashMap<Method, MatchitRouter<usize>>,
    pub(crate) shutdown: Arc<watch::Sender<bool>>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        let error_handle = options.error_handle.clone().unwrap_or_else(plugins::default_error_handle);
        let plugins = Plugins {
            request_handle: options.request_handle.clone().unwrap_or_else(plugins::default_request_handle),
            response_handle: options.response_handle.clone().unwrap_or_else(plugins::default_response_handle),
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            error_handle,
            plugins,
            middlewares: Vec::new(),
            routes: Vec::new(),
            trees: HashMap::new(),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Adds a middleware that runs before every route's handles, including
    /// routes registered earlier.
    pub fn middleware(mut self, handle: impl Handle) -> Self {
        self.middlewares.push(handle.into_boxed_handle());
        self
    }

    // ── Plain handles ─────────────────────────────────────────────────────────

    /// Registers a handle. Path parameters use `:name` or `{name}`, catch-alls
    /// `*name` or `{*name}`; both are read from [`Context::path`](crate::Context::path).
    pub fn route(self, method: Method, path: &str, handle: impl Handle) -> Self {
        self.route_with(method, path, handle, [])
    }

    /// Registers a handle behind route-specific middlewares.
    pub fn route_with(
        self,
        method: Method,
        path: &str,
        handle: impl Handle,
        middlewares: impl IntoIterator<Item = BoxedHandle>,
    ) -> Self {
        let handles = chain(middlewares, handle.into_boxed_handle());
        self.register(&[method], path, RouteKind::Http, handles)
    }

    pub fn get(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Get, path, handle)
    }

    pub fn head(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Head, path, handle)
    }

    pub fn options(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Options, path, handle)
    }

    pub fn post(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Post, path, handle)
    }

    pub fn put(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Put, path, handle)
    }

    pub fn patch(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Patch, path, handle)
    }

    pub fn delete(self, path: &str, handle: impl Handle) -> Self {
        self.route(Method::Delete, path, handle)
    }

    /// Registers `handle` for every method in [`Method::ANY`].
    pub fn any(self, path: &str, handle: impl Handle) -> Self {
        self.register(&Method::ANY, path, RouteKind::Http, vec![handle.into_boxed_handle()])
    }

    // ── Easy handles ──────────────────────────────────────────────────────────

    /// Registers an easy handle with the router's request/response handles.
    ///
    /// ```rust
    /// use easierweb::{Context, Result, Router};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Default, Deserialize, Serialize)]
    /// struct Member { id: i64, name: String }
    ///
    /// async fn create_member(_ctx: &mut Context, cmd: Member) -> Result<Option<Member>> {
    ///     Ok(Some(cmd))
    /// }
    ///
    /// let router = Router::new().easy_post("/members", create_member);
    /// ```
    pub fn easy_route<M>(self, method: Method, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route_with(method, path, handle, EasyOptions::default())
    }

    pub fn easy_route_with<M>(self, method: Method, path: &str, handle: impl EasyHandle<M>, opts: EasyOptions) -> Self {
        let handles = self.easy_handles(handle, opts);
        self.register(&[method], path, RouteKind::Http, handles)
    }

    pub fn easy_get<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Get, path, handle)
    }

    pub fn easy_head<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Head, path, handle)
    }

    pub fn easy_options<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Options, path, handle)
    }

    pub fn easy_post<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Post, path, handle)
    }

    pub fn easy_put<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Put, path, handle)
    }

    pub fn easy_patch<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Patch, path, handle)
    }

    pub fn easy_delete<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route(Method::Delete, path, handle)
    }

    pub fn easy_any<M>(self, path: &str, handle: impl EasyHandle<M>) -> Self {
        let handles = self.easy_handles(handle, EasyOptions::default());
        self.register(&Method::ANY, path, RouteKind::Http, handles)
    }

    // ── WebSocket, SSE, static files ──────────────────────────────────────────

    /// Registers a WebSocket route (GET). The chain runs once the handshake
    /// completes; the connection closes when it returns.
    pub fn ws(self, path: &str, handle: impl Handle) -> Self {
        self.ws_with(path, handle, [])
    }

    pub fn ws_with(self, path: &str, handle: impl Handle, middlewares: impl IntoIterator<Item = BoxedHandle>) -> Self {
        let handles = chain(middlewares, handle.into_boxed_handle());
        self.register(&[Method::Get], path, RouteKind::WebSocket, handles)
    }

    /// Registers a server-sent events route (GET). Pushes made through
    /// [`Context::push`](crate::Context::push) stream to the client until
    /// the chain returns.
    pub fn sse(self, path: &str, handle: impl Handle) -> Self {
        self.sse_with(path, handle, [])
    }

    pub fn sse_with(self, path: &str, handle: impl Handle, middlewares: impl IntoIterator<Item = BoxedHandle>) -> Self {
        let handles = chain(middlewares, handle.into_boxed_handle());
        self.register(&[Method::Get], path, RouteKind::EventStream, handles)
    }

    /// Serves the files below `dir`. `path` must end in a catch-all, e.g.
    /// `/assets/*filepath`.
    ///
    /// # Panics
    ///
    /// Panics if `path` has no trailing catch-all segment.
    pub fn static_dir(self, path: &str, dir: impl Into<PathBuf>) -> Self {
        let handles = static_handles(&self.normalize(path), dir.into());
        self.register(&[Method::Get, Method::Head], path, RouteKind::Http, handles)
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Registers routes under a shared prefix and middlewares.
    ///
    /// ```rust
    /// use easierweb::{boxed, middleware, Context, Result, Router};
    ///
    /// async fn list(_ctx: &mut Context) -> Result<()> { Ok(()) }
    ///
    /// let router = Router::new().group("/members", [boxed(middleware::logger)], |g| {
    ///     g.get("", list).get("/:id", list)
    /// });
    /// ```
    pub fn group(
        self,
        path: &str,
        middlewares: impl IntoIterator<Item = BoxedHandle>,
        build: impl FnOnce(Group) -> Group,
    ) -> Self {
        build(Group::new(self, path, middlewares.into_iter().collect())).into_router()
    }

    /// A handle that stops the server once it is running.
    pub fn closer(&self) -> Closer {
        Closer(Arc::clone(&self.shutdown))
    }

    // ── Registration internals ────────────────────────────────────────────────

    pub(crate) fn easy_handles<M>(&self, handle: impl EasyHandle<M>, opts: EasyOptions) -> Vec<BoxedHandle> {
        let plugins = Plugins {
            request_handle: opts.request_handle.unwrap_or_else(|| Arc::clone(&self.plugins.request_handle)),
            response_handle: opts.response_handle.unwrap_or_else(|| Arc::clone(&self.plugins.response_handle)),
        };
        chain(opts.middlewares, handle.into_easy_handle(plugins))
    }

    /// The registered form of `path`: root path prepended, `:name` and
    /// `*name` segments rewritten to `{name}` and `{*name}`.
    pub(crate) fn normalize(&self, path: &str) -> String {
        let root = self.options.root_path.trim_end_matches('/');
        let joined = format!("{root}/{}", path.trim_start_matches('/'));
        joined
            .split('/')
            .map(|segment| {
                if let Some(name) = segment.strip_prefix(':') {
                    format!("{{{name}}}")
                } else if let Some(name) = segment.strip_prefix('*') {
                    format!("{{*{name}}}")
                } else {
                    segment.to_owned()
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub(crate) fn register(mut self, methods: &[Method], path: &str, kind: RouteKind, handles: Vec<BoxedHandle>) -> Self {
        let pattern = self.normalize(path);
        let index = self.routes.len();
        for method in methods {
            self.trees
                .entry(*method)
                .or_default()
                .insert(pattern.as_str(), index)
                .unwrap_or_else(|e| panic!("invalid route `{method} {pattern}`: {e}"));
        }
        self.routes.push(Route { pattern: Arc::from(pattern), kind, handles: Arc::from(handles) });
        self
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Lookup<'_> {
        if let Some(matched) = self.trees.get(&method).and_then(|tree| tree.at(path).ok()) {
            let params: Option<Params> = matched
                .params
                .iter()
                .map(|(k, v)| Some((k.to_owned(), percent_decode_str(v).decode_utf8().ok()?.into_owned())))
                .collect();
            // A parameter that does not decode to UTF-8 matches nothing.
            return match params {
                Some(params) => Lookup::Found(&self.routes[*matched.value], params),
                None => Lookup::NotFound,
            };
        }
        let allowed: Vec<Method> = ALLOW_ORDER
            .into_iter()
            .filter(|m| *m != method)
            .filter(|m| self.trees.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .collect();
        if allowed.is_empty() { Lookup::NotFound } else { Lookup::NotAllowed(allowed) }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Order of methods in an `Allow` header.
const ALLOW_ORDER: [Method; 9] = [
    Method::Get,
    Method::Head,
    Method::Post,
    Method::Put,
    Method::Patch,
    Method::Delete,
    Method::Options,
    Method::Connect,
    Method::Trace,
];

pub(crate) fn chain(middlewares: impl IntoIterator<Item = BoxedHandle>, handle: BoxedHandle) -> Vec<BoxedHandle> {
    let mut handles: Vec<BoxedHandle> = middlewares.into_iter().collect();
    handles.push(handle);
    handles
}

/// Builds the static file handle for a normalized pattern.
pub(crate) fn static_handles(pattern: &str, dir: PathBuf) -> Vec<BoxedHandle> {
    let param = pattern
        .rsplit('/')
        .next()
        .and_then(|last| last.strip_prefix("{*"))
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or_else(|| panic!("static route `{pattern}` must end with a catch-all like `*filepath`"));
    vec![Arc::new(StaticDir::new(dir, param))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Result;

    async fn noop(_ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    #[test]
    fn normalizes_both_param_styles() {
        let router = Router::with_options(RouterOptions { root_path: "/api/".into(), ..Default::default() });
        assert_eq!(router.normalize("/members/:id"), "/api/members/{id}");
        assert_eq!(router.normalize("files/*rest"), "/api/files/{*rest}");
        assert_eq!(router.normalize("/members/{id}"), "/api/members/{id}");
        assert_eq!(Router::new().normalize("/"), "/");
    }

    #[test]
    fn lookup_found_not_allowed_not_found() {
        let router = Router::new().get("/members/:id", noop).delete("/members/:id", noop);

        match router.lookup(Method::Get, "/members/7") {
            Lookup::Found(route, params) => {
                assert_eq!(&*route.pattern, "/members/{id}");
                assert_eq!(params.get("id"), Some("7"));
            }
            _ => panic!("expected a match"),
        }
        match router.lookup(Method::Post, "/members/7") {
            Lookup::NotAllowed(methods) => assert_eq!(methods, vec![Method::Get, Method::Delete]),
            _ => panic!("expected 405"),
        }
        assert!(matches!(router.lookup(Method::Get, "/nothing"), Lookup::NotFound));
    }

    #[test]
    fn path_params_are_percent_decoded() {
        let router = Router::new().get("/members/:name", noop);
        match router.lookup(Method::Get, "/members/a%20b%2Fc") {
            Lookup::Found(_, params) => assert_eq!(params.get("name"), Some("a b/c")),
            _ => panic!("expected a match"),
        }
        assert!(matches!(router.lookup(Method::Get, "/members/%FF"), Lookup::NotFound));
    }

    #[test]
    fn any_registers_every_common_method() {
        let router = Router::new().any("/ping", noop);
        for method in Method::ANY {
            assert!(matches!(router.lookup(method, "/ping"), Lookup::Found(..)));
        }
        assert!(matches!(router.lookup(Method::Trace, "/ping"), Lookup::NotAllowed(_)));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new().get("/members/:id", noop).get("/members/{id}", noop);
    }

    #[test]
    #[should_panic(expected = "must end with a catch-all")]
    fn static_route_needs_catch_all() {
        let _ = Router::new().static_dir("/assets", ".");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RouterOptions = serde_yaml::from_str("root_path: /api\n").unwrap();
        assert_eq!(options.root_path, "/api");
        assert_eq!(options.multipart_form_max_size, DEFAULT_MULTIPART_FORM_MAX_SIZE);
        assert!(!options.close_console_print);
        assert!(options.error_handle.is_none());
    }

    #[test]
    fn closer_flips_the_shutdown_flag() {
        let router = Router::new();
        let rx = router.shutdown.subscribe();
        router.closer().close();
        assert!(*rx.borrow());
    }
}
