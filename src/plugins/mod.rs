//! Pluggable request, response and error handling.
//!
//! Easy handles never touch the wire format themselves. A **request
//! handle** decides which part of the request an easy handle's argument is
//! bound from, a **response handle** turns its return value into a write,
//! and the router's **error handle** answers for any handle that failed or
//! panicked. Each is a plain `Arc<dyn Fn>`; the built-ins below cover JSON,
//! YAML, XML, raw bytes and plain text, and custom ones can be installed
//! through [`RouterOptions`](crate::RouterOptions) or per route through
//! [`EasyOptions`](crate::EasyOptions).

mod error;
mod request;
mod response;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::data::Data;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::params::Params;

pub use error::{
    ErrorHandleOptions, default_error_handle, json_error_handle, string_error_handle, xml_error_handle,
    yaml_error_handle,
};
pub use request::{
    default_request_handle, json_request_handle, no_action_request_handle, xml_request_handle, yaml_request_handle,
};
pub use response::{
    bytes_response_handle, default_response_handle, json_response_handle, xml_response_handle,
    yaml_response_handle,
};

/// Picks the input an easy handle's argument is bound from.
pub type RequestHandle = Arc<dyn Fn(&Context) -> Result<Payload> + Send + Sync>;

/// Writes an easy handle's outcome. Returning `Err` hands the error to the
/// router's [`ErrorHandle`].
pub type ResponseHandle = Arc<dyn Fn(&mut Context, Option<Value>, Option<Error>) -> Result<()> + Send + Sync>;

/// Answers a request whose chain returned an error or panicked.
pub type ErrorHandle = Arc<dyn Fn(&mut Context, &Error) + Send + Sync>;

/// The request/response pair an easy handle runs with.
#[derive(Clone)]
pub struct Plugins {
    pub request_handle: RequestHandle,
    pub response_handle: ResponseHandle,
}

impl Default for Plugins {
    fn default() -> Self {
        Self {
            request_handle: default_request_handle(),
            response_handle: default_response_handle(),
        }
    }
}

/// The input selected by a [`RequestHandle`].
#[derive(Clone, Debug)]
pub enum Payload {
    /// Nothing to bind: the argument is `T::default()`.
    Empty,
    /// String parameters, converted field by field.
    Params(Params),
    /// A body in a structured format.
    Body(Format, Data),
    /// A payload with string parameters laid over it, key by key.
    Overlay(Box<Payload>, Params),
}

impl Payload {
    /// Lays `params` over this payload. Keys in `params` win.
    pub fn overlay(self, params: &Params) -> Self {
        if params.is_empty() {
            return self;
        }
        match self {
            Self::Empty => Self::Params(params.clone()),
            Self::Params(mut base) => {
                base.extend_from(params);
                Self::Params(base)
            }
            other => Self::Overlay(Box::new(other), params.clone()),
        }
    }

    /// Binds the payload into `T`.
    ///
    /// Binding starts from `T::default()` and replaces only the fields the
    /// payload names, so a partial body or query leaves the rest at their
    /// defaults. String values (parameters, XML text) are read as numbers
    /// or booleans where the default holds one.
    pub fn bind<T: DeserializeOwned + Default + Serialize>(self) -> Result<T> {
        if let Self::Empty = self {
            return Ok(T::default());
        }
        let mut value = serde_json::to_value(T::default())?;
        self.merge_into(&mut value)?;
        Ok(serde_json::from_value(value)?)
    }

    fn merge_into(self, target: &mut Value) -> Result<()> {
        match self {
            Self::Empty => {}
            Self::Params(params) => {
                let fields = params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
                    .collect();
                merge(target, Value::Object(fields));
            }
            Self::Body(Format::Xml, data) => {
                let decoded: Value = Format::Xml.decode(data.as_bytes())?;
                merge(target, flatten_text(decoded));
            }
            Self::Body(format, data) => merge(target, format.decode(data.as_bytes())?),
            Self::Overlay(base, params) => {
                base.merge_into(target)?;
                Self::Params(params).merge_into(target)?;
            }
        }
        Ok(())
    }
}

/// Merges `source` into `target`: objects key by key, anything else
/// replaces the target.
fn merge(target: &mut Value, source: Value) {
    match source {
        Value::Object(source) => {
            if let Value::Object(fields) = target {
                for (key, value) in source {
                    match fields.get_mut(&key) {
                        Some(field) => merge(field, value),
                        None => {
                            fields.insert(key, value);
                        }
                    }
                }
            } else {
                *target = Value::Object(source);
            }
        }
        Value::String(text) => *target = coerce(target, text),
        other => *target = other,
    }
}

/// Reads `text` as the scalar type `target` holds, if it parses as one.
fn coerce(target: &Value, text: String) -> Value {
    match target {
        Value::Number(_) | Value::Bool(_) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(parsed) if parsed.is_number() || parsed.is_boolean() => parsed,
            _ => Value::String(text),
        },
        _ => Value::String(text),
    }
}

/// XML text content decodes as `{"$text": ..}` and an empty element as
/// `{}`; both become plain strings.
fn flatten_text(value: Value) -> Value {
    match value {
        Value::Object(fields) if fields.is_empty() => Value::String(String::new()),
        Value::Object(mut fields) if fields.len() == 1 && fields.contains_key("$text") => {
            fields.remove("$text").unwrap_or_default()
        }
        Value::Object(fields) => Value::Object(fields.into_iter().map(|(k, v)| (k, flatten_text(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(flatten_text).collect()),
        other => other,
    }
}
