use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::status::Status;

use super::ResponseHandle;

/// Same as [`json_response_handle`].
pub fn default_response_handle() -> ResponseHandle {
    json_response_handle()
}

pub fn json_response_handle() -> ResponseHandle {
    format_response_handle(Format::Json)
}

pub fn yaml_response_handle() -> ResponseHandle {
    format_response_handle(Format::Yaml)
}

pub fn xml_response_handle() -> ResponseHandle {
    format_response_handle(Format::Xml)
}

/// Writes strings verbatim and byte arrays (`Vec<u8>` results) as raw
/// bytes; any other result is written as JSON.
pub fn bytes_response_handle() -> ResponseHandle {
    Arc::new(|ctx, result, err| {
        respond(ctx, result, err, |ctx, code, value| {
            if let Some(bytes) = as_bytes(&value) {
                ctx.write(code, bytes);
                return Ok(());
            }
            ctx.write_json(code, &value)
        })
    })
}

fn format_response_handle(format: Format) -> ResponseHandle {
    Arc::new(move |ctx, result, err| {
        respond(ctx, result, err, |ctx, code, value| ctx.write_as(format, code, &value))
    })
}

/// error + result → 400 with the result; error alone → propagate;
/// no result → 204; result → 200.
fn respond(
    ctx: &mut Context,
    result: Option<Value>,
    err: Option<Error>,
    write: impl FnOnce(&mut Context, Status, Value) -> Result<()>,
) -> Result<()> {
    match (result, err) {
        (Some(value), Some(_)) => write(ctx, Status::BadRequest, value),
        (None, Some(err)) => Err(err),
        (None, None) => {
            ctx.no_content(Status::NoContent);
            Ok(())
        }
        (Some(value), None) => write(ctx, Status::Ok, value),
    }
}

fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => Some(text.clone().into_bytes()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}
