use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::format::Format;

use super::{Payload, RequestHandle};

/// Same as [`json_request_handle`].
pub fn default_request_handle() -> RequestHandle {
    json_request_handle()
}

/// Binds from the form, else a JSON body, then lays the query string over
/// it (query values win).
pub fn json_request_handle() -> RequestHandle {
    Arc::new(|ctx| select(ctx, Format::Json))
}

/// Like [`json_request_handle`] with a YAML body.
pub fn yaml_request_handle() -> RequestHandle {
    Arc::new(|ctx| select(ctx, Format::Yaml))
}

/// Like [`json_request_handle`] with an XML body.
pub fn xml_request_handle() -> RequestHandle {
    Arc::new(|ctx| select(ctx, Format::Xml))
}

/// Never binds: the argument is always `T::default()`.
pub fn no_action_request_handle() -> RequestHandle {
    Arc::new(|_| Ok(Payload::Empty))
}

/// The form, else the body, else nothing, with the query laid over it.
fn select(ctx: &Context, format: Format) -> Result<Payload> {
    let base = if !ctx.form.is_empty() {
        Payload::Params(ctx.form.clone())
    } else if !ctx.body.is_empty() {
        Payload::Body(format, ctx.body.clone())
    } else {
        Payload::Empty
    };
    Ok(base.overlay(&ctx.query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::test_support::context;

    #[test]
    fn form_wins_and_absorbs_query() {
        let mut ctx = context(Method::Post, "/members?name=q", &[], vec![]);
        ctx.form.set("id", "1").set("name", "f");
        ctx.body.replace(b"ignored".to_vec());
        match (json_request_handle())(&ctx).unwrap() {
            Payload::Params(p) => {
                assert_eq!(p.get("id"), Some("1"));
                assert_eq!(p.get("name"), Some("q"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn query_overlays_the_body() {
        let mut ctx = context(Method::Post, "/members?id=9", &[], vec![]);
        ctx.body.replace(b"id: 1".to_vec());
        match (yaml_request_handle())(&ctx).unwrap() {
            Payload::Overlay(base, query) => {
                assert!(matches!(*base, Payload::Body(Format::Yaml, _)));
                assert_eq!(query.get("id"), Some("9"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn body_alone_is_not_wrapped() {
        let mut ctx = context(Method::Post, "/members", &[], vec![]);
        ctx.body.replace(b"<Member/>".to_vec());
        assert!(matches!((xml_request_handle())(&ctx).unwrap(), Payload::Body(Format::Xml, _)));
    }

    #[test]
    fn query_then_empty() {
        let ctx = context(Method::Get, "/members?id=9", &[], vec![]);
        assert!(matches!((xml_request_handle())(&ctx).unwrap(), Payload::Params(_)));
        let ctx = context(Method::Get, "/members", &[], vec![]);
        assert!(matches!((default_request_handle())(&ctx).unwrap(), Payload::Empty));
        let ctx = context(Method::Get, "/members?id=9", &[], vec![]);
        assert!(matches!((no_action_request_handle())(&ctx).unwrap(), Payload::Empty));
    }
}
