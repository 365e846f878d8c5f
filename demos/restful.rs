//! A RESTful member service built from easy handles inside a group.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example restful
//!
//! Try:
//!   curl -X POST http://localhost:8080/api/v2/member \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"hello","mobile":"12345678","weight":10.24}'
//!   curl http://localhost:8080/api/v2/member/1
//!   curl 'http://localhost:8080/api/v2/members?name=hello&mobile=12345678'
//!   curl -X PUT http://localhost:8080/api/v2/member/1 -d '{"name":"hello","weight":20.48}'
//!   curl -X DELETE http://localhost:8080/api/v2/member/1

use std::time::Instant;

use easierweb::{Context, Result, Router, RouterOptions, boxed, middleware};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Add or edit request body.
#[derive(Debug, Default, Deserialize, Serialize)]
struct MemberCommand {
    name: String,
    mobile: String,
    weight: f32,
}

/// List filter, bound from the query string.
#[derive(Debug, Default, Deserialize, Serialize)]
struct MemberQuery {
    name: String,
    mobile: String,
}

#[derive(Debug, Serialize)]
struct MemberDto {
    id: i64,
    name: String,
    mobile: String,
    weight: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    Router::with_options(RouterOptions { root_path: "/api".into(), ..Default::default() })
        .middleware(middleware::logger)
        .group("/v2", [boxed(time_cost)], |v2| {
            v2.easy_post("/member", add)
                .easy_delete("/member/:id", del)
                .easy_put("/member/:id", edit)
                .easy_get("/member/:id", get)
                .easy_get("/members", list)
        })
        .run(":8080")
        .await
}

async fn time_cost(ctx: &mut Context) -> Result<()> {
    let start = Instant::now();
    let outcome = ctx.next().await;
    info!(uri = %ctx.request_uri(), elapsed_ms = start.elapsed().as_millis() as u64, "time cost");
    outcome
}

// POST /api/v2/member → 200 with the created member
async fn add(_ctx: &mut Context, command: MemberCommand) -> Result<Option<MemberDto>> {
    info!(?command, "add");
    Ok(Some(MemberDto { id: 1, name: command.name, mobile: command.mobile, weight: command.weight }))
}

// DELETE /api/v2/member/:id → 204
async fn del(ctx: &mut Context) {
    info!(id = ctx.path.get_int64("id"), "del");
}

// PUT /api/v2/member/:id → 204, or the error handle when the id is not a number
async fn edit(ctx: &mut Context, command: MemberCommand) -> Result<()> {
    let id = ctx.path.int64("id")?;
    info!(id, ?command, "edit");
    Ok(())
}

// GET /api/v2/member/:id → 200, or 204 when the member does not exist
async fn get(ctx: &mut Context) -> Option<MemberDto> {
    let id = ctx.path.get_int64("id");
    (id == 1).then(|| MemberDto { id, name: "hello".into(), mobile: String::new(), weight: 10.24 })
}

// GET /api/v2/members?name=..&mobile=..
async fn list(_ctx: &mut Context, query: MemberQuery) -> Vec<MemberDto> {
    info!(?query, "list");
    vec![
        MemberDto { id: 1, name: "hello".into(), mobile: query.mobile.clone(), weight: 10.24 },
        MemberDto { id: 2, name: "world".into(), mobile: query.mobile, weight: 20.48 },
    ]
}
