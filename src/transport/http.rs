//! Synchronous HTTP bridge.
//!
//! One input line in, one POST out, one response line back.  Runs on the
//! caller's task with a single request in flight, so there is no shared
//! state to guard beyond the endpoint store.
//!
//! Notifications are dropped: a request/response transport has nowhere to
//! deliver a reply-less message, and forwarding one would leave the POST's
//! response body with no matching client request.

use std::sync::Arc;

use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use tokio::io::AsyncBufRead;

use crate::endpoint::EndpointStore;
use crate::message::{self, Inbound};
use crate::output::OutputWriter;
use crate::transport::{event_stream, next_line_lossy, with_custom_headers, SESSION_HEADER};

/// A failed request, rendered to the client as a JSON-RPC error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ForwardError {
    #[error("Failed to POST: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Failed to read response: {0}")]
    ReadBody(#[source] reqwest::Error),
    #[error("Server returned HTTP {0}")]
    Status(u16),
    #[error("Empty response from server")]
    EmptyReply,
}

/// Upstream reply to a forwarded request.
#[derive(Debug, PartialEq)]
pub(crate) enum Reply {
    /// `application/json` (or unspecified) body, relayed verbatim.
    Body(Vec<u8>),
    /// `text/event-stream` body, unwrapped into its `data:` payloads.
    Events(Vec<String>),
}

/// Request/response bridge for the `http` transport.
#[derive(Debug)]
pub(crate) struct HttpBridge {
    client: reqwest::Client,
    endpoints: Arc<EndpointStore>,
    headers: HeaderMap,
    output: Arc<OutputWriter>,
}

impl HttpBridge {
    pub(crate) fn new(
        client: reqwest::Client,
        endpoints: Arc<EndpointStore>,
        headers: HeaderMap,
        output: Arc<OutputWriter>,
    ) -> Self {
        Self {
            client,
            endpoints,
            headers,
            output,
        }
    }

    /// Relay `input` until it closes.
    ///
    /// End of input is the normal exit path; a read error is logged and also
    /// ends the relay.  Lines that are not valid UTF-8 are decoded lossily and
    /// rejected by the message gate like any other non-JSON line.
    pub(crate) async fn run<R>(&self, mut input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        tracing::info!("starting HTTP mode");
        let mut buf = Vec::new();
        loop {
            match next_line_lossy(&mut input, &mut buf).await {
                Ok(Some(line)) => self.process_line(&line).await,
                Ok(None) => {
                    tracing::info!("EOF on stdin, client closed connection");
                    return;
                }
                Err(err) => {
                    tracing::error!("stdin error: {err}");
                    return;
                }
            }
        }
    }

    /// Gate one input line and, for requests, forward it and emit the reply.
    pub(crate) async fn process_line(&self, line: &str) {
        let (id, raw) = match message::classify(line) {
            Ok(Inbound::Request { id, raw }) => (id, raw),
            Ok(Inbound::Notification { raw }) => {
                tracing::debug!("C->S (notification): {raw}");
                tracing::debug!(
                    "skipping notification in HTTP mode (not supported by HTTP transport)"
                );
                return;
            }
            Err(rejected) => {
                tracing::warn!("{rejected}");
                return;
            }
        };
        tracing::debug!("C->S: {raw}");

        match self.forward(raw).await {
            Ok(Reply::Body(body)) => self.output.emit(&body).await,
            Ok(Reply::Events(payloads)) => {
                for payload in payloads {
                    self.output.emit(payload.as_bytes()).await;
                }
            }
            Err(err) => {
                tracing::warn!("{err}");
                let response = message::error_response(Some(&id), &err.to_string());
                self.output.emit(&response).await;
            }
        }
    }

    /// POST `raw` to the current submission URL.
    ///
    /// A 2xx reply that carries no message is an error, so every forwarded
    /// request still produces one line for the client.
    async fn forward(&self, raw: &str) -> Result<Reply, ForwardError> {
        let url = self.endpoints.submit_url();
        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream");
        if let Some(session) = self.endpoints.session_token() {
            tracing::debug!(session_id = %session, "sending request with session id header");
            request = request.header(SESSION_HEADER, session);
        }
        let request = with_custom_headers(request, &self.headers).body(raw.to_owned());

        let response = request.send().await.map_err(ForwardError::Transport)?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            self.endpoints.remember_session_token(session);
        }

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "POST completed");

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        let body = response.bytes().await.map_err(ForwardError::ReadBody)?;

        if !status.is_success() {
            if !body.is_empty() {
                tracing::debug!("server error response: {}", String::from_utf8_lossy(&body));
            }
            return Err(ForwardError::Status(status.as_u16()));
        }

        if is_event_stream {
            let text = String::from_utf8_lossy(&body);
            let payloads: Vec<String> = event_stream::data_payloads(&text)
                .into_iter()
                .map(str::to_owned)
                .collect();
            if payloads.is_empty() {
                return Err(ForwardError::EmptyReply);
            }
            return Ok(Reply::Events(payloads));
        }
        if body.trim_ascii().is_empty() {
            return Err(ForwardError::EmptyReply);
        }
        Ok(Reply::Body(body.to_vec()))
    }
}
