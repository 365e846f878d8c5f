//! Custom error, request and response handles, the built-in XML plugins,
//! and HTTPS.
//!
//! Run with (HTTPS needs `cert.pem` and `private.key` in the working directory):
//!   RUST_LOG=info cargo run --example customize

use std::sync::Arc;

use easierweb::plugins::{self, ErrorHandle, ErrorHandleOptions, Payload, RequestHandle, ResponseHandle};
use easierweb::{Context, Error, Format, Result, Router, RouterOptions, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Member {
    id: i64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Hand-written handles, plain HTTP on 8081.
    let custom = Router::with_options(RouterOptions {
        error_handle: Some(custom_error_handle()),
        request_handle: Some(custom_request_handle()),
        response_handle: Some(custom_response_handle()),
        multipart_form_max_size: 4096,
        close_console_print: false,
        ..Default::default()
    })
    .easy_post("/members", echo);

    // Built-in XML plugins, HTTPS on 8080.
    let xml = Router::with_options(RouterOptions {
        error_handle: Some(plugins::xml_error_handle(ErrorHandleOptions { show_error: true, output_stack: true })),
        request_handle: Some(plugins::xml_request_handle()),
        response_handle: Some(plugins::xml_response_handle()),
        ..Default::default()
    })
    .easy_post("/members", echo);

    tokio::try_join!(custom.run(":8081"), xml.run_tls("127.0.0.1:8080", "cert.pem", "private.key"))?;
    Ok(())
}

async fn echo(_ctx: &mut Context, member: Member) -> Result<Option<Member>> {
    Ok(Some(member))
}

fn custom_error_handle() -> ErrorHandle {
    Arc::new(|ctx: &mut Context, err: &Error| {
        error!(error = %err, "unexpected error");
        ctx.write_string(Status::BadRequest, "unexpected error!!!");
    })
}

/// Binds a JSON body when there is one, ignoring any form, with the query
/// string on top.
fn custom_request_handle() -> RequestHandle {
    Arc::new(|ctx: &Context| {
        let base = if ctx.body.is_empty() {
            Payload::Empty
        } else {
            Payload::Body(Format::Json, ctx.body.clone())
        };
        Ok(base.overlay(&ctx.query))
    })
}

fn custom_response_handle() -> ResponseHandle {
    Arc::new(|ctx: &mut Context, result: Option<Value>, err: Option<Error>| match (result, err) {
        (Some(result), Some(_)) => ctx.write_json(Status::BadRequest, &result),
        (None, Some(err)) => Err(err),
        (None, None) => {
            ctx.no_content(Status::NoContent);
            Ok(())
        }
        (Some(result), None) => ctx.write_json(Status::Ok, &result),
    })
}
