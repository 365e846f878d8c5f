//! Plain handles: query/body binding, uploads, downloads, WebSocket, SSE,
//! static files and a middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:8080/test/demoGet/123?type=1&price=10.24&name=dpwgc'
//!   curl -X POST http://localhost:8080/test/demoPost -d '{"id":123,"name":"dpwgc"}'
//!   curl -F file=@Cargo.toml http://localhost:8080/test/demoUpload
//!   curl -O http://localhost:8080/test/demoDownload/Cargo.toml
//!   curl -N http://localhost:8080/test/demoSSE/123
//!   curl http://localhost:8080/test/demoStatic/basic.rs

use std::time::Duration;

use easierweb::{Context, Result, Router, RouterOptions, Status};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct DemoQuery {
    #[serde(rename = "type")]
    kind: i32,
    price: f64,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DemoCommand {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct DemoResult {
    msg: &'static str,
    data: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    Router::with_options(RouterOptions {
        root_path: "/test".into(),
        multipart_form_max_size: 4 << 20,
        ..Default::default()
    })
    .middleware(demo_middleware)
    .get("/demoGet/:id", demo_get)
    .post("/demoPost", demo_post)
    .post("/demoUpload", demo_upload)
    .get("/demoDownload/:fileName", demo_download)
    .ws("/demoWS/:id", demo_ws)
    .sse("/demoSSE/:id", demo_sse)
    .static_dir("/demoStatic/*filepath", "demos")
    .run(":8080")
    .await
}

async fn demo_get(ctx: &mut Context) -> Result<()> {
    info!(id = ctx.path.int64("id")?, keys = ?ctx.query.keys(), "demo get");

    let query: DemoQuery = ctx.bind_query()?;
    info!(kind = query.kind, price = query.price, name = %query.name, "bound query");

    ctx.write_json(Status::Ok, &DemoResult { msg: "hello world", data: "GET Request" })
}

async fn demo_post(ctx: &mut Context) -> Result<()> {
    let command: DemoCommand = ctx.bind_json()?;
    info!(id = command.id, name = %command.name, "bound body");

    ctx.write_json(Status::Ok, &DemoResult { msg: "hello world", data: "POST Request" })
}

async fn demo_upload(ctx: &mut Context) -> Result<()> {
    info!(keys = ?ctx.file_keys(), "uploaded files");
    let file = ctx.file("file")?;
    info!(name = ?file.file_name, size = file.data.len(), "file");

    ctx.write_json(Status::Ok, &DemoResult { msg: "hello world", data: "Upload File" })
}

/// Sends a file from the working directory as a download.
async fn demo_download(ctx: &mut Context) -> Result<()> {
    let file_name = ctx.path.get("fileName").unwrap_or_default().to_owned();
    ctx.write_local_file(None, Some(&file_name), &file_name).await
}

/// The connection closes when the handle returns.
async fn demo_ws(ctx: &mut Context) -> Result<()> {
    info!(id = ctx.path.get_int64("id"), "websocket connected");

    let msg = ctx.receive_string().await?;
    info!(%msg, "websocket message");

    ctx.send_json(&DemoResult { msg: "hello world", data: "Websocket Connect" }).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    Ok(())
}

async fn demo_sse(ctx: &mut Context) -> Result<()> {
    info!(id = ctx.path.get_int64("id"), "event stream opened");

    for i in 0..5 {
        ctx.push(&format!("sse push {i}"), "\n\n").await?;
        ctx.push_json(&DemoResult { msg: "hello world", data: "Server-sent Events" }, "\n\n").await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

async fn demo_middleware(ctx: &mut Context) -> Result<()> {
    info!(url = %ctx.uri(), "before");
    let outcome = ctx.next().await;
    info!(result = %ctx.result, "after");
    outcome
}
