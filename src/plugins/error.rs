use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use crate::context::Context;
use crate::error::Error;
use crate::format::Format;
use crate::status::Status;

use super::ErrorHandle;

/// Shown instead of the error message when `show_error` is off.
const HIDDEN_ERROR: &str = "unexpected error";

/// How much of an error the built-in error handles reveal.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorHandleOptions {
    /// Write the error message to the client.
    pub show_error: bool,
    /// Log a backtrace alongside the error.
    pub output_stack: bool,
}

/// JSON error handle that shows the error message and logs no backtrace.
pub fn default_error_handle() -> ErrorHandle {
    json_error_handle(ErrorHandleOptions { show_error: true, output_stack: false })
}

pub fn json_error_handle(opts: ErrorHandleOptions) -> ErrorHandle {
    format_error_handle(Format::Json, opts)
}

pub fn yaml_error_handle(opts: ErrorHandleOptions) -> ErrorHandle {
    format_error_handle(Format::Yaml, opts)
}

pub fn xml_error_handle(opts: ErrorHandleOptions) -> ErrorHandle {
    format_error_handle(Format::Xml, opts)
}

/// Writes the message as `text/plain`.
pub fn string_error_handle(opts: ErrorHandleOptions) -> ErrorHandle {
    Arc::new(move |ctx, err| {
        log_error(ctx, err, opts);
        ctx.write_string(Status::InternalServerError, message(err, opts));
    })
}

fn format_error_handle(format: Format, opts: ErrorHandleOptions) -> ErrorHandle {
    Arc::new(move |ctx, err| {
        log_error(ctx, err, opts);
        let body = BTreeMap::from([("error", message(err, opts))]);
        if let Err(e) = ctx.write_as(format, Status::InternalServerError, &body) {
            error!(error = %e, "encode error response");
            ctx.write_string(Status::InternalServerError, HIDDEN_ERROR);
        }
    })
}

fn message(err: &Error, opts: ErrorHandleOptions) -> String {
    if opts.show_error { err.to_string() } else { HIDDEN_ERROR.to_owned() }
}

fn log_error(ctx: &Context, err: &Error, opts: ErrorHandleOptions) {
    let method = ctx.method();
    if opts.output_stack {
        let stack = Backtrace::force_capture();
        error!(%method, route = %ctx.route, "{err}\n{stack}");
    } else {
        error!(%method, route = %ctx.route, "{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::test_support::context;

    #[test]
    fn writes_500_with_message() {
        let mut ctx = context(Method::Get, "/", &[], vec![]);
        (default_error_handle())(&mut ctx, &Error::from("db down"));
        assert_eq!(ctx.code, 500);
        assert_eq!(ctx.result.as_str(), Some(r#"{"error":"db down"}"#));
    }

    #[test]
    fn hides_message_unless_asked() {
        let mut ctx = context(Method::Get, "/", &[], vec![]);
        (json_error_handle(ErrorHandleOptions::default()))(&mut ctx, &Error::from("db down"));
        assert_eq!(ctx.result.as_str(), Some(r#"{"error":"unexpected error"}"#));

        let mut ctx = context(Method::Get, "/", &[], vec![]);
        (string_error_handle(ErrorHandleOptions { show_error: true, output_stack: true }))(&mut ctx, &Error::from("db down"));
        assert_eq!(ctx.result.as_str(), Some("db down"));
    }

    #[test]
    fn xml_and_yaml_bodies() {
        let opts = ErrorHandleOptions { show_error: true, output_stack: false };

        let mut ctx = context(Method::Get, "/", &[], vec![]);
        (xml_error_handle(opts))(&mut ctx, &Error::from("bad"));
        assert_eq!(ctx.result.as_str(), Some("<xml><error>bad</error></xml>"));

        let mut ctx = context(Method::Get, "/", &[], vec![]);
        (yaml_error_handle(opts))(&mut ctx, &Error::from("bad"));
        assert_eq!(ctx.result.as_str(), Some("error: bad\n"));
    }

    #[test]
    fn earlier_write_is_kept() {
        let mut ctx = context(Method::Get, "/", &[], vec![]);
        ctx.write_string(Status::Accepted, "partial");
        (default_error_handle())(&mut ctx, &Error::from("late"));
        assert_eq!(ctx.code, 202);
    }
}
