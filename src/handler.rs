//! Handle traits and type erasure.
//!
//! # How handles are stored
//!
//! Routes hold handles of different concrete types in one list, so every
//! handle is erased to a [`BoxedHandle`] (`Arc<dyn ErasedHandle>`) when it
//! is registered:
//!
//! ```text
//! async fn hello(ctx: &mut Context) -> Result<()>   ← plain handle
//!        ↓ router.get("/", hello)
//! Arc::new(FnHandle(hello))                          ← BoxedHandle
//!
//! async fn create(ctx: &mut Context, cmd: Member) -> Result<Option<Member>>
//!        ↓ router.easy_post("/members", create)
//! Arc::new(EasyFnHandle { f: create, plugins, .. })  ← BoxedHandle
//!        ↓ at request time
//! request handle → bind Member → create(ctx, cmd) → IntoReply → response handle
//! ```
//!
//! Handles borrow the context mutably for the duration of the call, so the
//! function traits carry the borrow lifetime (`for<'a> CtxFn<'a, R>`) and
//! the erased future is `BoxFuture<'a, _>` rather than `'static`.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::plugins::{Plugins, ResponseHandle};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future borrowing from the context.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Dispatch interface shared by plain handles, easy handles and the static
/// file server.
#[doc(hidden)]
pub trait ErasedHandle: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>>;
}

/// A type-erased handle shared across concurrent requests.
pub type BoxedHandle = Arc<dyn ErasedHandle>;

/// Erases a handle, e.g. to pass it as a per-route middleware:
///
/// ```rust
/// use easierweb::{boxed, middleware, Context, Method, Result, Router};
///
/// async fn hello(ctx: &mut Context) -> Result<()> { Ok(()) }
///
/// let router = Router::new()
///     .route_with(Method::Get, "/hello", hello, [boxed(middleware::logger)]);
/// ```
pub fn boxed(handle: impl Handle) -> BoxedHandle {
    handle.into_boxed_handle()
}

// ── Function traits ───────────────────────────────────────────────────────────

/// `async fn(&mut Context) -> R`, for every borrow lifetime `'a`.
#[doc(hidden)]
pub trait CtxFn<'a, R>: Send + Sync + 'static {
    type Future: Future<Output = R> + Send + 'a;
    fn invoke(&self, ctx: &'a mut Context) -> Self::Future;
}

impl<'a, F, Fut, R> CtxFn<'a, R> for F
where
    F: Fn(&'a mut Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'a,
{
    type Future = Fut;

    fn invoke(&self, ctx: &'a mut Context) -> Fut {
        self(ctx)
    }
}

/// `async fn(&mut Context, T) -> R`, for every borrow lifetime `'a`.
#[doc(hidden)]
pub trait EasyFn<'a, T, R>: Send + Sync + 'static {
    type Future: Future<Output = R> + Send + 'a;
    fn invoke(&self, ctx: &'a mut Context, arg: T) -> Self::Future;
}

impl<'a, F, Fut, T, R> EasyFn<'a, T, R> for F
where
    F: Fn(&'a mut Context, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'a,
{
    type Future = Fut;

    fn invoke(&self, ctx: &'a mut Context, arg: T) -> Fut {
        self(ctx, arg)
    }
}

// ── Public handle traits ──────────────────────────────────────────────────────

/// Implemented for every plain handle and middleware.
///
/// Satisfied automatically by any function with the signature:
///
/// ```text
/// async fn name(ctx: &mut Context) -> easierweb::Result<()>
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handle: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handle(self) -> BoxedHandle;
}

/// Implemented for every easy handle. `M` is a marker that tells the two
/// accepted shapes apart; it is inferred and never written by callers.
///
/// ```text
/// async fn name(ctx: &mut Context) -> R
/// async fn name(ctx: &mut Context, arg: T) -> R
///     where T: DeserializeOwned + Serialize + Default, R: IntoReply
/// ```
pub trait EasyHandle<M>: private::SealedEasy<M> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_easy_handle(self, plugins: Plugins) -> BoxedHandle;
}

mod private {
    pub trait Sealed {}
    pub trait SealedEasy<M> {}
}

impl<F> private::Sealed for F where F: for<'a> CtxFn<'a, Result<()>> {}

impl<F> Handle for F
where
    F: for<'a> CtxFn<'a, Result<()>>,
{
    fn into_boxed_handle(self) -> BoxedHandle {
        Arc::new(FnHandle(self))
    }
}

impl<F, R> private::SealedEasy<(R,)> for F
where
    F: for<'a> CtxFn<'a, R>,
    R: IntoReply + Send + 'static,
{
}

impl<F, R> EasyHandle<(R,)> for F
where
    F: for<'a> CtxFn<'a, R>,
    R: IntoReply + Send + 'static,
{
    fn into_easy_handle(self, plugins: Plugins) -> BoxedHandle {
        Arc::new(EasyFnHandle { f: self, plugins, _marker: PhantomData::<fn() -> (R,)> })
    }
}

impl<F, T, R> private::SealedEasy<(T, R)> for F
where
    F: for<'a> EasyFn<'a, T, R>,
    T: DeserializeOwned + Serialize + Default + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, T, R> EasyHandle<(T, R)> for F
where
    F: for<'a> EasyFn<'a, T, R>,
    T: DeserializeOwned + Serialize + Default + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_easy_handle(self, plugins: Plugins) -> BoxedHandle {
        Arc::new(EasyFnHandle { f: self, plugins, _marker: PhantomData::<fn() -> (T, R)> })
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Bridges a plain handle function to [`ErasedHandle`].
struct FnHandle<F>(F);

impl<F> ErasedHandle for FnHandle<F>
where
    F: for<'a> CtxFn<'a, Result<()>>,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.0.invoke(ctx))
    }
}

/// Bridges an easy handle function to [`ErasedHandle`], running the
/// binding pipeline around it.
struct EasyFnHandle<F, M> {
    f: F,
    plugins: Plugins,
    _marker: PhantomData<fn() -> M>,
}

impl<F, R> ErasedHandle for EasyFnHandle<F, (R,)>
where
    F: for<'a> CtxFn<'a, R>,
    R: IntoReply + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let reply = self.f.invoke(&mut *ctx).await.into_reply();
            respond(ctx, &self.plugins.response_handle, reply)
        })
    }
}

impl<F, T, R> ErasedHandle for EasyFnHandle<F, (T, R)>
where
    F: for<'a> EasyFn<'a, T, R>,
    T: DeserializeOwned + Serialize + Default + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let arg = match (self.plugins.request_handle)(&*ctx).and_then(|payload| payload.bind::<T>()) {
                Ok(arg) => arg,
                Err(err) => return (self.plugins.response_handle)(ctx, None, Some(err)),
            };
            let reply = self.f.invoke(&mut *ctx, arg).await.into_reply();
            respond(ctx, &self.plugins.response_handle, reply)
        })
    }
}

/// Runs the response handle with the reply's XML root name in effect.
fn respond(ctx: &mut Context, response_handle: &ResponseHandle, reply: Reply) -> Result<()> {
    ctx.reply_root = reply.root;
    let outcome = response_handle(ctx, reply.result, reply.error);
    ctx.reply_root = None;
    outcome
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What an easy handle produced: an optional body and an optional error,
/// handed to the route's response handle.
#[derive(Debug, Default)]
pub struct Reply {
    pub result: Option<Value>,
    pub error: Option<Error>,
    /// Root element name for XML output, taken from the result's type.
    pub root: Option<&'static str>,
}

impl Reply {
    /// A successful reply carrying `value`. A value that cannot be
    /// serialized becomes an error reply.
    pub fn ok<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(result) => Self { result: Some(result), error: None, root: root_name::<T>() },
            Err(e) => Self::error(e),
        }
    }

    pub fn error(err: impl Into<Error>) -> Self {
        Self { result: None, error: Some(err.into()), root: None }
    }

    /// A reply carrying both a body and an error. The built-in response
    /// handles answer it with `400 Bad Request` and the body.
    ///
    /// ```rust
    /// use easierweb::{Context, Reply};
    /// use serde_json::json;
    ///
    /// async fn login(_ctx: &mut Context) -> Reply {
    ///     Reply::rejected(&json!({ "reason": "bad password" }), "login failed")
    /// }
    /// ```
    pub fn rejected<T: Serialize + ?Sized>(body: &T, err: impl Into<Error>) -> Self {
        match serde_json::to_value(body) {
            Ok(result) => Self { result: Some(result), error: Some(err.into()), root: root_name::<T>() },
            Err(e) => Self::error(e),
        }
    }
}

/// Conversion of an easy handle's return value into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply { Reply::default() }
}

impl<T: Serialize> IntoReply for Option<T> {
    fn into_reply(self) -> Reply {
        match self {
            Some(value) => Reply::ok(&value),
            None => Reply::default(),
        }
    }
}

/// Each item is written as its own element, named after `T`.
impl<T: Serialize> IntoReply for Vec<T> {
    fn into_reply(self) -> Reply {
        Reply { root: root_name::<T>(), ..Reply::ok(&self) }
    }
}

impl<R, E> IntoReply for std::result::Result<R, E>
where
    R: IntoReply,
    E: Into<Error>,
{
    fn into_reply(self) -> Reply {
        match self {
            Ok(r) => r.into_reply(),
            Err(e) => Reply::error(e),
        }
    }
}

/// The unqualified name of `T` (`Member` for `app::dto::Member`), if it
/// makes a usable XML element name. Untyped maps get none.
fn root_name<T: ?Sized>() -> Option<&'static str> {
    let path = std::any::type_name::<T>().trim_start_matches('&');
    let name = path.split('<').next()?.rsplit("::").next()?;
    let usable = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(name, "Value" | "Map" | "HashMap" | "BTreeMap");
    usable.then_some(name)
}
