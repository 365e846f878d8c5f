//! Route groups: a path prefix plus middlewares shared by its routes.

use std::path::PathBuf;

use crate::handler::{BoxedHandle, EasyHandle, Handle};
use crate::method::Method;
use crate::router::{EasyOptions, RouteKind, Router, chain, static_handles};

/// A set of routes under one prefix, created by [`Router::group`].
///
/// Group middlewares run after the router middlewares and before the
/// route's own middlewares. [`Group::middleware`] only affects routes
/// registered after it.
pub struct Group {
    router: Router,
    prefix: String,
    middlewares: Vec<BoxedHandle>,
}

impl Group {
    pub(crate) fn new(router: Router, prefix: &str, middlewares: Vec<BoxedHandle>) -> Self {
        Self { router, prefix: prefix.trim_end_matches('/').to_owned(), middlewares }
    }

    pub(crate) fn into_router(self) -> Router {
        self.router
    }

    pub fn middleware(mut self, handle: impl Handle) -> Self {
        self.middlewares.push(handle.into_boxed_handle());
        self
    }

    fn path(&self, path: &str) -> String {
        if path.is_empty() {
            return self.prefix.clone();
        }
        format!("{}/{}", self.prefix, path.trim_start_matches('/'))
    }

    fn add(mut self, methods: &[Method], path: &str, kind: RouteKind, handles: Vec<BoxedHandle>) -> Self {
        let full = self.path(path);
        let handles = self.middlewares.iter().cloned().chain(handles).collect();
        self.router = self.router.register(methods, &full, kind, handles);
        self
    }

    // ── Plain handles ─────────────────────────────────────────────────────────

    pub fn route(self, method: Method, path: &str, handle: impl Handle) -> Self {
        self.route_with(method, path, handle, [])
    }

    pub fn route_with(
        self,
        method: Method,
        path: &str,
        handle: impl Handle,
        middlewares: impl IntoIterator<Item = BoxedHandle>,
    ) -> Self {
        self.add(&[method], path, RouteKind::Http, chain(middlewares, handle.into_boxed_handle()))
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

    pub fn any(self, path: &str, handle: impl Handle) -> Self {
        self.add(&Method::ANY, path, RouteKind::Http, vec![handle.into_boxed_handle()])
    }

    // ── Easy handles ──────────────────────────────────────────────────────────

    pub fn easy_route<M>(self, method: Method, path: &str, handle: impl EasyHandle<M>) -> Self {
        self.easy_route_with(method, path, handle, EasyOptions::default())
    }

    pub fn easy_route_with<M>(self, method: Method, path: &str, handle: impl EasyHandle<M>, opts: EasyOptions) -> Self {
        let handles = self.router.easy_handles(handle, opts);
        self.add(&[method], path, RouteKind::Http, handles)
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
        let handles = self.router.easy_handles(handle, EasyOptions::default());
        self.add(&Method::ANY, path, RouteKind::Http, handles)
    }

    // ── WebSocket, SSE, static files ──────────────────────────────────────────

    pub fn ws(self, path: &str, handle: impl Handle) -> Self {
        self.ws_with(path, handle, [])
    }

    pub fn ws_with(self, path: &str, handle: impl Handle, middlewares: impl IntoIterator<Item = BoxedHandle>) -> Self {
        self.add(&[Method::Get], path, RouteKind::WebSocket, chain(middlewares, handle.into_boxed_handle()))
    }

    pub fn sse(self, path: &str, handle: impl Handle) -> Self {
        self.sse_with(path, handle, [])
    }

    pub fn sse_with(self, path: &str, handle: impl Handle, middlewares: impl IntoIterator<Item = BoxedHandle>) -> Self {
        self.add(&[Method::Get], path, RouteKind::EventStream, chain(middlewares, handle.into_boxed_handle()))
    }

    /// # Panics
    ///
    /// Panics if `path` has no trailing catch-all segment.
    pub fn static_dir(self, path: &str, dir: impl Into<PathBuf>) -> Self {
        let pattern = self.router.normalize(&self.path(path));
        self.add(&[Method::Get, Method::Head], path, RouteKind::Http, static_handles(&pattern, dir.into()))
    }

    /// A nested group: its prefix and middlewares extend this group's.
    pub fn group(
        mut self,
        path: &str,
        middlewares: impl IntoIterator<Item = BoxedHandle>,
        build: impl FnOnce(Group) -> Group,
    ) -> Self {
        let prefix = self.path(path);
        let inherited = self.middlewares.iter().cloned().chain(middlewares).collect();
        self.router = build(Group::new(self.router, &prefix, inherited)).into_router();
        self
    }
}
