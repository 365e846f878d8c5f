use crate::context::Context;
use crate::error::Result;
use crate::method::Method;
use crate::status::Status;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, PATCH, DELETE, HEAD";

/// Allows cross-origin requests from any origin.
///
/// The `Access-Control-*` headers are only set when the request carries an
/// `Origin`. Preflight `OPTIONS` requests are answered with
/// `200 Options Request!`; the chain always continues, so a route registered
/// for OPTIONS still runs (its writes are ignored).
pub async fn cors(ctx: &mut Context) -> Result<()> {
    if ctx.header.has("origin") {
        ctx.set_header("access-control-allow-origin", "*")?;
        ctx.set_header("access-control-allow-methods", ALLOW_METHODS)?;
        ctx.set_header("access-control-allow-headers", "*")?;
        ctx.set_header("access-control-expose-headers", "*")?;
        ctx.set_header("access-control-allow-credentials", "true")?;
    }
    if ctx.method() == Method::Options {
        ctx.write_string(Status::Ok, "Options Request!");
    }
    ctx.next().await
}
