//! # easierweb
//!
//! A convenience layer over hyper and matchit. It provides a router, a
//! per-request [`Context`], typed parameter binding, and pluggable
//! request, response and error handling.
//!
//! The wire work all comes from existing crates. `hyper` serves HTTP/1.1
//! and HTTP/2, `matchit` matches paths, and `rustls` terminates TLS.
//! `multer` parses multipart bodies and `tokio-tungstenite` frames
//! WebSocket messages. easierweb adapts their outputs into one calling
//! convention.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use easierweb::{middleware, Context, Result, Router, Status};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Deserialize, Serialize)]
//! struct Member {
//!     id: i64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     Router::new()
//!         .middleware(middleware::logger)
//!         .get("/hello/:name", hello)
//!         .easy_post("/members", create_member)
//!         .run(":8080")
//!         .await
//! }
//!
//! // A plain handle writes the response itself.
//! async fn hello(ctx: &mut Context) -> Result<()> {
//!     let name = ctx.path.get("name").unwrap_or_default().to_owned();
//!     ctx.write_string(Status::Ok, format!("hello {name}"));
//!     Ok(())
//! }
//!
//! // An easy handle gets its argument bound from the request and has its
//! // return value written by the response handle (JSON by default).
//! async fn create_member(_ctx: &mut Context, cmd: Member) -> Result<Option<Member>> {
//!     Ok(Some(cmd))
//! }
//! ```
//!
//! ## The chain
//!
//! Each request runs the router middlewares, then the group middlewares,
//! then the route middlewares, then the route handle, all on the same
//! `&mut Context`. A middleware that awaits [`Context::next`] wraps the rest
//! of the chain. One that returns without calling it lets the chain carry
//! on. [`Context::abort`] stops it. An `Err` or a panic anywhere in the
//! chain is answered by the router's error handle.

mod config;
mod context;
mod data;
mod error;
mod format;
mod group;
mod handler;
mod method;
mod params;
mod request;
mod response;
mod router;
mod server;
mod static_files;
mod status;
mod tls;

pub mod client;
pub mod middleware;
pub mod plugins;

#[cfg(test)]
mod test_support;

pub use config::{read_json_config, read_xml_config, read_yaml_config};
pub use context::{Context, FormFile};
pub use data::{Cache, Data};
pub use error::{BoxError, Error, Result};
pub use format::Format;
pub use group::Group;
pub use handler::{BoxFuture, BoxedHandle, EasyHandle, Handle, IntoReply, Reply, boxed};
pub use method::Method;
pub use params::Params;
pub use request::{Cookie, Request};
pub use response::{ContentType, Response};
pub use router::{Closer, DEFAULT_MULTIPART_FORM_MAX_SIZE, EasyOptions, Router, RouterOptions};
pub use server::Server;
pub use status::Status;
