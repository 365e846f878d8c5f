//! Built-in middlewares.
//!
//! Both are plain handles: register them with [`Router::middleware`](crate::Router::middleware),
//! on a group, or per route through [`boxed`](crate::boxed).
//!
//! ```rust
//! use easierweb::{middleware, Router};
//!
//! let router = Router::new()
//!     .middleware(middleware::logger)
//!     .middleware(middleware::cors);
//! ```

mod cors;
mod logger;

pub use cors::cors;
pub use logger::logger;
