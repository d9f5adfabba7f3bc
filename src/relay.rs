//! Relay controller.
//!
//! Derives the initial endpoints from the configured URL, picks the bridge
//! for the configured transport, and runs it until the client closes its
//! input.  Exactly one bridge runs for the lifetime of the process.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::AsyncBufRead;

use crate::config::{RelayConfig, TransportMode};
use crate::endpoint::EndpointStore;
use crate::message;
use crate::output::OutputWriter;
use crate::transport::http::HttpBridge;
use crate::transport::sse::SseBridge;
use crate::transport::build_client;

/// Submission path used until an SSE server announces its own.
const DEFAULT_SUBMIT_PATH: &str = "/messages";

/// A configured relay, ready to run.
#[derive(Debug)]
pub(crate) struct Relay {
    config: RelayConfig,
    endpoints: Arc<EndpointStore>,
    output: Arc<OutputWriter>,
    client: reqwest::Client,
}

impl Relay {
    /// Validate the configured URL and seed the endpoint store.
    ///
    /// On a URL parse failure the client is sent a JSON-RPC error first, in
    /// case it is already waiting for protocol messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client cannot
    /// be built.
    pub(crate) async fn new(
        config: RelayConfig,
        output: Arc<OutputWriter>,
    ) -> anyhow::Result<Self> {
        let endpoints = Arc::new(EndpointStore::new());

        let url = match url::Url::parse(&config.url) {
            Ok(url) => url,
            Err(err) => {
                let msg = format!("Error parsing URL '{}': {err}", config.url);
                output.emit(&message::internal_error(&msg)).await;
                anyhow::bail!(msg);
            }
        };

        match config.transport {
            TransportMode::Sse => {
                // Parsed once here so a later announced path is a plain join.
                endpoints.set_origin(&url.origin().ascii_serialization());
                endpoints.set_push_url(&config.url);
                endpoints.set_submit_path(DEFAULT_SUBMIT_PATH);
            }
            TransportMode::Http => {
                endpoints.set_submit_url(&config.url);
                tracing::info!(url = %config.url, "HTTP mode: POST endpoint set");
            }
        }

        let client = build_client().context("failed to initialise upstream client")?;

        Ok(Self {
            config,
            endpoints,
            output,
            client,
        })
    }

    /// Run the selected bridge until `input` closes.
    pub(crate) async fn run<R>(self, input: R)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        tracing::info!(
            transport = %self.config.transport,
            debug = self.config.debug,
            submit_url = %self.endpoints.submit_url(),
            "relay starting"
        );
        match self.config.transport {
            TransportMode::Http => {
                HttpBridge::new(self.client, self.endpoints, self.config.headers, self.output)
                    .run(input)
                    .await;
            }
            TransportMode::Sse => {
                tracing::info!(
                    origin = %self.endpoints.origin(),
                    push_url = %self.endpoints.push_url(),
                    "SSE mode"
                );
                SseBridge::new(
                    self.client,
                    self.endpoints,
                    self.config.headers,
                    self.output,
                    self.config.reconnect_delay,
                )
                .run(input)
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::HeaderMap;
    use tokio::io::{AsyncReadExt as _, BufReader};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(url: &str, transport: TransportMode) -> RelayConfig {
        RelayConfig::new(url.to_owned(), transport, HeaderMap::new(), false)
    }

    fn sink() -> Arc<OutputWriter> {
        Arc::new(OutputWriter::new(tokio::io::sink()))
    }

    #[tokio::test]
    async fn sse_mode_derives_origin_and_default_path() {
        let relay = Relay::new(config("http://127.0.0.1:8888/sse", TransportMode::Sse), sink())
            .await
            .unwrap();
        assert_eq!(relay.endpoints.origin(), "http://127.0.0.1:8888");
        assert_eq!(relay.endpoints.push_url(), "http://127.0.0.1:8888/sse");
        assert_eq!(relay.endpoints.submit_url(), "http://127.0.0.1:8888/messages");
    }

    #[tokio::test]
    async fn sse_origin_drops_path_and_query() {
        let relay = Relay::new(
            config("https://mcp.example.com/v1/sse?key=abc", TransportMode::Sse),
            sink(),
        )
        .await
        .unwrap();
        assert_eq!(relay.endpoints.origin(), "https://mcp.example.com");
        assert_eq!(relay.endpoints.submit_url(), "https://mcp.example.com/messages");
    }

    #[tokio::test]
    async fn http_mode_posts_to_configured_url() {
        let relay = Relay::new(config("http://localhost:3000/mcp", TransportMode::Http), sink())
            .await
            .unwrap();
        assert_eq!(relay.endpoints.submit_url(), "http://localhost:3000/mcp");
    }

    #[tokio::test]
    async fn unparsable_url_notifies_client_and_fails() {
        let (mut client, relay_side) = tokio::io::duplex(4096);
        let output = Arc::new(OutputWriter::new(relay_side));

        let err = Relay::new(config("not a url", TransportMode::Sse), Arc::clone(&output))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error parsing URL 'not a url'"));
        drop(output);

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        let response: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(response["id"], serde_json::Value::Null);
        assert_eq!(response["error"]["code"], -32603);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Internal error: Error parsing URL 'not a url'"));
    }

    #[tokio::test]
    async fn run_returns_once_input_closes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"jsonrpc":"2.0","id":1,"result":{}}"#,
            ))
            .mount(&server)
            .await;

        let (mut client, relay_side) = tokio::io::duplex(4096);
        let relay = Relay::new(
            config(&format!("{}/mcp", server.uri()), TransportMode::Http),
            Arc::new(OutputWriter::new(relay_side)),
        )
        .await
        .unwrap();

        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".as_slice();
        tokio::time::timeout(Duration::from_secs(5), relay.run(BufReader::new(input)))
            .await
            .expect("relay finishes at EOF");

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }
}
