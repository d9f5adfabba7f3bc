//! End-to-end HTTP mode against a mocked upstream MCP server.
//!
//! The relay binary runs in a blocking task while `wiremock` serves the
//! upstream on the test runtime.

mod common;

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{PING, PONG};

/// Run the relay against `url` with `stdin` and return its stdout.
async fn run_relay(url: String, stdin: String, extra: &'static [&'static str]) -> String {
    tokio::task::spawn_blocking(move || {
        let assert = common::relay()
            .args(["--url", url.as_str(), "--transport", "http"])
            .args(extra)
            .write_stdin(stdin)
            .timeout(Duration::from_secs(10))
            .assert()
            .success();
        String::from_utf8(assert.get_output().stdout.clone()).unwrap()
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn response_body_is_relayed_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PONG))
        .expect(1)
        .mount(&server)
        .await;

    let out = run_relay(format!("{}/mcp", server.uri()), format!("{PING}\n"), &[]).await;
    assert_eq!(out, format!("{PONG}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_500_is_reported_with_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let out = run_relay(format!("{}/mcp", server.uri()), format!("{PING}\n"), &[]).await;
    assert_eq!(
        out,
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32603,\"message\":\"Server returned HTTP 500\"}}\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn notification_produces_no_output_and_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PONG))
        .expect(0)
        .mount(&server)
        .await;

    let out = run_relay(
        format!("{}/mcp", server.uri()),
        "{\"jsonrpc\":\"2.0\",\"method\":\"notify\"}\n".to_owned(),
        &[],
    )
    .await;
    assert!(out.is_empty(), "unexpected output: {out:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_headers_reach_the_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer e2e-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PONG))
        .expect(1)
        .mount(&server)
        .await;

    let out = run_relay(
        format!("{}/mcp", server.uri()),
        format!("{PING}\n"),
        &["--headers", r#"{"Authorization":"Bearer e2e-token"}"#],
    )
    .await;
    assert_eq!(out, format!("{PONG}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_request_gets_exactly_one_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PONG))
        .mount(&server)
        .await;

    let stdin = format!(
        "{PING}\n{{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}}\n{PING}\nnoise\n{PING}\n"
    );
    let out = run_relay(format!("{}/mcp", server.uri()), stdin, &[]).await;
    assert_eq!(out.lines().count(), 3);
    assert!(out.lines().all(|line| line == PONG));
}
