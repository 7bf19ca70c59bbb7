use std::sync::Arc;
use std::time::Duration;

use gantry_rest::{
    BasicAuth, BearerAuth, CancellationToken, CircuitBreaker, CircuitBreakerConfig, Client,
    RestError, RetryPolicy,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn base_url_joins_with_single_slash() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/users")
        .with_status(200)
        .create_async()
        .await;

    let client = Client::builder()
        .base_url(format!("{}/api", server.url()))
        .build()
        .unwrap();
    let request = client.get("/users").unwrap();
    let response = client.execute(request).await.unwrap();

    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn path_params_are_substituted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/users/42")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":42,"name":"alice"}"#)
        .create_async()
        .await;

    let client = Client::builder().base_url(server.url()).build().unwrap();
    let request = client
        .get("/${version}/users/${id}")
        .unwrap()
        .path_param("version", "v1")
        .path_param("id", "42");
    let response = client.execute(request).await.unwrap();
    let user: User = response.decode().await.unwrap();

    assert_eq!(user.id, 42);
    assert_eq!(user.name, "alice");
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_path_param_aborts_before_sending() {
    let server = mockito::Server::new_async().await;
    let client = Client::builder().base_url(server.url()).build().unwrap();
    let request = client.get("/${version}/users").unwrap();
    let err = client.execute(request).await.unwrap_err();
    assert!(matches!(err, RestError::UnsetPathParam(name) if name == "version"));
}

#[tokio::test]
async fn error_on_status_retries_then_returns_flagged_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flaky")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let client = Client::builder()
        .base_url(server.url())
        .retry(RetryPolicy::constant(2, Duration::from_millis(5)))
        .error_on_status([500])
        .build()
        .unwrap();
    let response = client
        .execute(client.get("/flaky").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert!(response.is_error_status());
    mock.assert_async().await;
}

#[tokio::test]
async fn retry_stops_on_first_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/ok")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = Client::builder()
        .base_url(server.url())
        .retry(RetryPolicy::constant(5, Duration::from_millis(5)))
        .error_on_status([500])
        .build()
        .unwrap();
    let response = client.execute(client.get("/ok").unwrap()).await.unwrap();

    assert!(response.is_success());
    assert!(!response.is_error_status());
    mock.assert_async().await;
}

#[tokio::test]
async fn breaker_rejects_after_threshold() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/down")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        success_threshold: 1,
        max_half_open: 1,
        timeout: Duration::from_secs(30),
    }));
    let client = Client::builder()
        .base_url(server.url())
        .circuit_breaker(breaker)
        .error_on_status([500])
        .build()
        .unwrap();

    let first = client.execute(client.get("/down").unwrap()).await.unwrap();
    assert!(first.is_error_status());

    let err = client
        .execute(client.get("/down").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::CircuitOpen));
}

#[tokio::test]
async fn basic_auth_header_is_applied() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/private")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .with_status(200)
        .create_async()
        .await;

    let client = Client::builder()
        .base_url(server.url())
        .auth(Arc::new(BasicAuth::new("user", "pass")))
        .build()
        .unwrap();
    let response = client
        .execute(client.get("/private").unwrap())
        .await
        .unwrap();

    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn bearer_auth_header_is_applied() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/private")
        .match_header("authorization", "Bearer shiny-token")
        .with_status(200)
        .create_async()
        .await;

    let client = Client::builder()
        .base_url(server.url())
        .auth(Arc::new(BearerAuth::new("shiny-token")))
        .build()
        .unwrap();
    let response = client
        .execute(client.get("/private").unwrap())
        .await
        .unwrap();

    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn cancelled_request_short_circuits() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/slow")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let client = Client::builder()
        .base_url(server.url())
        .retry(RetryPolicy::constant(3, Duration::from_secs(5)))
        .build()
        .unwrap();
    let request = client.get("/slow").unwrap().cancellation(cancel);
    let err = client.execute(request).await.unwrap_err();

    assert!(matches!(err, RestError::Cancelled));
}

#[tokio::test]
async fn form_body_is_urlencoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/submit")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(mockito::Matcher::UrlEncoded(
            "name".to_string(),
            "alice".to_string(),
        ))
        .with_status(204)
        .create_async()
        .await;

    let client = Client::builder().base_url(server.url()).build().unwrap();
    let request = client.post("/submit").unwrap().form_field("name", "alice");
    let response = client.execute(request).await.unwrap();

    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn structured_body_is_encoded_as_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/users")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(serde_json::json!({"name": "bob"})))
        .with_status(201)
        .create_async()
        .await;

    let client = Client::builder().base_url(server.url()).build().unwrap();
    let request = client
        .post("/users")
        .unwrap()
        .body(&serde_json::json!({"name": "bob"}))
        .unwrap();
    let response = client.execute(request).await.unwrap();

    assert_eq!(response.status(), 201);
    mock.assert_async().await;
}
