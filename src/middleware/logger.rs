use std::time::Instant;

use tracing::info;

use crate::context::Context;
use crate::data::Data;
use crate::error::Result;
use crate::params::Params;

/// Bodies and results above this size are logged as a notice instead.
const LOG_SIZE_LIMIT: usize = 1 << 20;

/// Logs one line per request once the rest of the chain has finished:
/// method, url, client address, path/query/form parameters as JSON, body,
/// status code, result and time cost in milliseconds.
pub async fn logger(ctx: &mut Context) -> Result<()> {
    let start = Instant::now();
    let outcome = ctx.next().await;
    let time_cost_ms = start.elapsed().as_millis() as u64;

    info!(
        method = %ctx.method(),
        url = %ctx.uri(),
        client = %ctx.remote_addr(),
        path = %params_json(&ctx.path),
        query = %params_json(&ctx.query),
        form = %params_json(&ctx.form),
        body = %truncated(&ctx.body, "body is too large"),
        code = ctx.code,
        result = %truncated(&ctx.result, "result is too large"),
        time_cost_ms,
        "request"
    );
    outcome
}

fn params_json(params: &Params) -> String {
    if params.is_empty() {
        return String::new();
    }
    serde_json::to_string(params).unwrap_or_default()
}

fn truncated<'a>(data: &'a Data, notice: &'static str) -> std::borrow::Cow<'a, str> {
    if data.len() > LOG_SIZE_LIMIT { notice.into() } else { data.to_string_lossy() }
}
