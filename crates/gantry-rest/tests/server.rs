use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use gantry_rest::{
    Client, CorsOptions, Method, RestResult, RestServer, ServerConfig, ServerContext,
};
use serde_json::{Value, json};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(port: u16) -> ServerConfig {
    ServerConfig {
        id: "test".to_string(),
        path_prefix: "/api".to_string(),
        listen_host: "127.0.0.1".to_string(),
        listen_port: port,
        read_timeout: 0,
        write_timeout: 0,
        enable_tls: false,
        private_key_path: None,
        cert_path: None,
        cors: Some(CorsOptions::default()),
    }
}

fn greet(ctx: &mut ServerContext) -> BoxFuture<'_, RestResult<()>> {
    Box::pin(async move {
        let name = ctx.path_param("name").unwrap_or("world").to_string();
        let greeting = ctx.query_param("greeting").unwrap_or("hello").to_string();
        ctx.write_json(&json!({"name": name, "greeting": greeting}))
    })
}

fn echo(ctx: &mut ServerContext) -> BoxFuture<'_, RestResult<()>> {
    Box::pin(async move {
        let body: Value = ctx.read()?;
        ctx.set_status(201)?;
        ctx.write_json(&body)
    })
}

fn not_found(ctx: &mut ServerContext) -> BoxFuture<'_, RestResult<()>> {
    Box::pin(async move {
        ctx.set_status(404)?;
        ctx.write_json(&json!({"error": "no such route"}))
    })
}

async fn started_server() -> (RestServer, Client) {
    let port = free_port();
    let mut server = RestServer::new(config(port)).unwrap();
    server.get("/greet/:name", Arc::new(greet)).unwrap();
    server.post("/echo", Arc::new(echo)).unwrap();
    server.unhandled(Arc::new(not_found));
    server.start().await.unwrap();

    let base = format!("http://{}", server.local_addr().unwrap());
    let client = Client::builder().base_url(base).build().unwrap();
    (server, client)
}

#[tokio::test]
async fn route_params_and_query_reach_the_handler() {
    let (mut server, client) = started_server().await;

    let request = client
        .get("/api/greet/alice")
        .unwrap()
        .query("greeting", "hej");
    let response = client.execute(request).await.unwrap();
    assert!(response.is_success());
    let body: Value = response.decode().await.unwrap();
    assert_eq!(body, json!({"name": "alice", "greeting": "hej"}));

    server.stop();
}

#[tokio::test]
async fn codec_round_trip_through_the_context() {
    let (mut server, client) = started_server().await;

    let payload = json!({"kind": "note", "tags": ["a", "b"]});
    let request = client.post("/api/echo").unwrap().body(&payload).unwrap();
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.decode().await.unwrap();
    assert_eq!(body, payload);

    server.stop();
}

#[tokio::test]
async fn unhandled_hook_serves_custom_404() {
    let (mut server, client) = started_server().await;

    let response = client
        .execute(client.get("/api/missing").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.decode().await.unwrap();
    assert_eq!(body["error"], "no such route");

    server.stop();
}

#[tokio::test]
async fn wrong_method_yields_405() {
    let (mut server, client) = started_server().await;

    let response = client
        .execute(client.post("/api/greet/alice").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    server.stop();
}

#[tokio::test]
async fn preflight_is_answered_by_the_cors_filter() {
    let (mut server, client) = started_server().await;

    let request = client
        .new_request("/api/greet/alice", Method::OPTIONS)
        .unwrap()
        .header("origin", "https://app.example.com");
    let response = client.execute(request).await.unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    assert!(response.header("access-control-allow-methods").is_some());

    server.stop();
}

#[tokio::test]
async fn global_filters_wrap_every_route() {
    let port = free_port();
    let mut server = RestServer::new(config(port)).unwrap();
    server.get("/greet/:name", Arc::new(greet)).unwrap();
    server.add_filter(Arc::new(|request, next| {
        Box::pin(async move {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-filtered", "yes".parse().unwrap());
            response
        })
    }));
    server.start().await.unwrap();

    let base = format!("http://{}", server.local_addr().unwrap());
    let client = Client::builder().base_url(base).build().unwrap();
    let response = client
        .execute(client.get("/api/greet/bob").unwrap())
        .await
        .unwrap();
    assert_eq!(response.header("x-filtered"), Some("yes"));

    server.stop();
}

#[tokio::test]
async fn stop_refuses_new_connections() {
    let (mut server, client) = started_server().await;

    server.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = client.execute(client.get("/api/greet/alice").unwrap()).await;
    assert!(result.is_err());
}
