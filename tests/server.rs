//! End-to-end tests against a real listener on 127.0.0.1.

use std::net::SocketAddr;

use easierweb::{Closer, Context, Error, Params, Result, Router, RouterOptions, Status, client, middleware};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Member {
    id: i64,
    name: String,
}

struct TestServer {
    addr: SocketAddr,
    closer: Closer,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let closer = router.closer();
        let task = tokio::spawn(router.serve(listener));
        Self { addr, closer, task }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        self.closer.close();
        self.task.await.unwrap().unwrap();
    }
}

fn quiet() -> RouterOptions {
    RouterOptions { close_console_print: true, ..Default::default() }
}

async fn hello(ctx: &mut Context) -> Result<()> {
    let name = ctx.path.get("name").unwrap_or_default().to_owned();
    ctx.write_string(Status::Ok, format!("hello {name}"));
    Ok(())
}

async fn whoami(ctx: &mut Context) -> Result<()> {
    let token = ctx.header.get("x-token").unwrap_or_default().to_owned();
    ctx.write_string(Status::Ok, token);
    Ok(())
}

async fn create(_ctx: &mut Context, cmd: Member) -> Result<Option<Member>> {
    Ok(Some(cmd))
}

async fn find(ctx: &mut Context) -> Option<Member> {
    let id = ctx.path.get_int64("id");
    (id == 1).then(|| Member { id, name: "dpwgc".into() })
}

async fn echo(ctx: &mut Context) -> Result<()> {
    loop {
        match ctx.receive_string().await {
            Ok(msg) => ctx.send_string(format!("echo: {msg}")).await?,
            Err(Error::WebSocketClosed) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

async fn ticks(ctx: &mut Context) -> Result<()> {
    for i in 0..3 {
        ctx.push(&format!("data: tick {i}"), "\n\n").await?;
    }
    ctx.push_json(&Member { id: 9, name: "done".into() }, "\n\n").await
}

#[tokio::test]
async fn plain_and_easy_handles() {
    let router = Router::with_options(quiet())
        .middleware(middleware::logger)
        .get("/hello/:name", hello)
        .get("/whoami", whoami)
        .group("/members", [], |g| g.easy_post("", create).easy_get("/:id", find));
    let server = TestServer::start(router).await;

    let (code, body) = client::get(&server.url("/hello/world"), None).await.unwrap();
    assert_eq!((code, body.as_str()), (200, Some("hello world")));

    let mut header = Params::new();
    header.set("X-Token", "t-1");
    let (_, body) = client::get(&server.url("/whoami"), Some(&header)).await.unwrap();
    assert_eq!(body.as_str(), Some("t-1"));

    let mut json = Params::new();
    json.set("content-type", "application/json");
    let (code, body) = client::post(&server.url("/members"), r#"{"id":1,"name":"a"}"#, Some(&json)).await.unwrap();
    assert_eq!((code, body.as_str()), (200, Some(r#"{"id":1,"name":"a"}"#)));

    let (code, body) = client::post(&server.url("/members?id=5"), r#"{"name":"b"}"#, Some(&json)).await.unwrap();
    assert_eq!((code, body.as_str()), (200, Some(r#"{"id":5,"name":"b"}"#)));

    let (_, body) = client::get(&server.url("/hello/new%20world"), None).await.unwrap();
    assert_eq!(body.as_str(), Some("hello new world"));

    let (code, body) = client::get(&server.url("/members/1"), None).await.unwrap();
    assert_eq!((code, body.as_str()), (200, Some(r#"{"id":1,"name":"dpwgc"}"#)));

    let (code, body) = client::get(&server.url("/members/2"), None).await.unwrap();
    assert_eq!((code, body.is_empty()), (204, true));

    let (code, _) = client::delete(&server.url("/members/1"), None).await.unwrap();
    assert_eq!(code, 405);

    let (code, _) = client::get(&server.url("/nothing"), None).await.unwrap();
    assert_eq!(code, 404);

    server.stop().await;
}

#[tokio::test]
async fn cors_preflight() {
    let router = Router::with_options(quiet()).middleware(middleware::cors).options("/members", hello);
    let server = TestServer::start(router).await;

    let mut header = Params::new();
    header.set("Origin", "http://a.test");
    let (code, body) = client::options(&server.url("/members"), Some(&header)).await.unwrap();
    assert_eq!((code, body.as_str()), (200, Some("Options Request!")));

    server.stop().await;
}

#[tokio::test]
async fn websocket_echo() {
    let server = TestServer::start(Router::with_options(quiet()).ws("/ws/:id", echo)).await;

    let url = format!("ws://{}/ws/1", server.addr);
    let (mut ws, res) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert_eq!(res.status(), 101);

    ws.send(Message::text("hi")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "echo: hi");

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn event_stream() {
    let server = TestServer::start(Router::with_options(quiet()).sse("/ticks", ticks)).await;

    let (code, body) = client::get(&server.url("/ticks"), None).await.unwrap();
    assert_eq!(code, 200);
    assert_eq!(
        body.as_str(),
        Some("data: tick 0\n\ndata: tick 1\n\ndata: tick 2\n\n{\"id\":9,\"name\":\"done\"}\n\n")
    );

    server.stop().await;
}

#[tokio::test]
async fn closer_stops_an_idle_server() {
    let server = TestServer::start(Router::with_options(quiet()).get("/hello/:name", hello)).await;
    let addr = server.addr;
    server.stop().await;
    assert!(client::get(&format!("http://{addr}/hello/x"), None).await.is_err());
}

#[tokio::test]
async fn run_tls_with_missing_certificate_fails() {
    let err = Router::with_options(quiet())
        .run_tls("127.0.0.1:0", "/nonexistent/cert.pem", "/nonexistent/key.pem")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tls(_)), "{err}");
}
