//! Asynchronous SSE bridge.
//!
//! Three tasks cooperate:
//!
//! 1. the **push stream** (background) holds a GET open on the push URL,
//!    emits every `data:` payload to the client, and applies the server's
//!    `endpoint` announcement to the endpoint store;
//! 2. the **input reader** (background) turns client lines into channel
//!    messages and reports end-of-input on a separate one-shot;
//! 3. the **forwarding loop** (foreground) POSTs each line to the current
//!    submission URL once the push stream has connected.
//!
//! POST response bodies are discarded.  Replies arrive on the push stream,
//! and relaying both would hand the client every response twice.
//!
//! Closing the input is the only shutdown trigger.  It cancels the shared
//! [`CancellationToken`], which the push stream observes while connecting,
//! while reading, and during its reconnect delay.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt as _;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::endpoint::EndpointStore;
use crate::message;
use crate::output::OutputWriter;
use crate::transport::event_stream::{self, SseLine, ENDPOINT_EVENT};
use crate::transport::{next_line_lossy, with_custom_headers};

/// Dynamic endpoint discovery state for one push-stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EndpointPhase {
    /// No `endpoint` event seen on this connection.
    #[default]
    Idle,
    /// `event: endpoint` seen; the next `data:` line should be a path.
    AwaitingPath,
    /// The announcement was handled (or was malformed).  Further `endpoint`
    /// events are ignored until the next connection.
    Resolved,
}

/// How a single push-stream connection ended.
enum StreamEnd {
    Closed,
    Cancelled,
}

/// Bridge for the `sse` transport.
#[derive(Debug)]
pub(crate) struct SseBridge {
    client: reqwest::Client,
    endpoints: Arc<EndpointStore>,
    headers: HeaderMap,
    output: Arc<OutputWriter>,
    reconnect_delay: Duration,
}

impl SseBridge {
    pub(crate) fn new(
        client: reqwest::Client,
        endpoints: Arc<EndpointStore>,
        headers: HeaderMap,
        output: Arc<OutputWriter>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            headers,
            output,
            reconnect_delay,
        }
    }

    /// Relay `input` until it closes, then stop the push stream.
    pub(crate) async fn run<R>(self, input: R)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let token = CancellationToken::new();

        let (connected_tx, mut connected_rx) = oneshot::channel();
        let push = PushStream {
            client: self.client.clone(),
            endpoints: Arc::clone(&self.endpoints),
            headers: self.headers.clone(),
            output: Arc::clone(&self.output),
            reconnect_delay: self.reconnect_delay,
        };
        let push_task = tokio::spawn(push.run(token.clone(), connected_tx));

        let (mut line_rx, mut end_rx) = spawn_input_reader(input);

        let forwarder = Forwarder {
            client: self.client,
            endpoints: self.endpoints,
            headers: self.headers,
            output: self.output,
        };

        // Lines read before the push stream is up are queued here.  The
        // channel keeps draining, so the reader always reaches end of input.
        let mut pending = VecDeque::new();
        let ready = loop {
            tokio::select! {
                biased;
                result = &mut connected_rx => break result.is_ok(),
                end = &mut end_rx => {
                    log_input_end(end, " before SSE connected");
                    break false;
                }
                Some(line) = line_rx.recv() => {
                    tracing::info!("received stdin input before SSE connected, waiting for SSE...");
                    pending.push_back(line);
                }
            }
        };

        if ready {
            tracing::info!("starting receive loop on stdin");
            for line in pending.drain(..) {
                forwarder.process_line(&line).await;
            }
            loop {
                tokio::select! {
                    biased;
                    Some(line) = line_rx.recv() => forwarder.process_line(&line).await,
                    end = &mut end_rx => {
                        log_input_end(end, "");
                        break;
                    }
                }
            }
        }

        token.cancel();
        if let Err(err) = push_task.await {
            tracing::warn!("SSE client task failed: {err}");
        }
    }
}

fn log_input_end(end: Result<io::Result<()>, oneshot::error::RecvError>, when: &str) {
    match end {
        Ok(Ok(())) | Err(_) => {
            tracing::info!("EOF on stdin{when}, client has closed the connection");
        }
        Ok(Err(err)) => tracing::error!("stdin read error{when}: {err}"),
    }
}

/// Spawn the input reader.
///
/// Lines go out on a single-slot channel; the terminal result (clean EOF or
/// the read error) goes out on a one-shot after the last line was accepted.
fn spawn_input_reader<R>(
    mut input: R,
) -> (mpsc::Receiver<String>, oneshot::Receiver<io::Result<()>>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(1);
    let (end_tx, end_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let end = loop {
            match next_line_lossy(&mut input, &mut buf).await {
                Ok(Some(line)) => {
                    if line_tx.send(line).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        let _ = end_tx.send(end);
    });
    (line_rx, end_rx)
}

/// Apply one push-stream line to the discovery state.
///
/// Returns the payload to emit to the client, if any.  An announced path
/// rewrites the submission URL and is not emitted.  A malformed
/// announcement is logged and its payload forwarded like ordinary data.
pub(crate) fn on_stream_line<'a>(
    line: &'a str,
    phase: &mut EndpointPhase,
    endpoints: &EndpointStore,
) -> Option<&'a str> {
    match event_stream::classify(line) {
        SseLine::Event(ENDPOINT_EVENT) => {
            if *phase == EndpointPhase::Idle {
                tracing::debug!("SSE endpoint event received");
                *phase = EndpointPhase::AwaitingPath;
            }
            None
        }
        SseLine::Data(payload) if *phase == EndpointPhase::AwaitingPath => {
            *phase = EndpointPhase::Resolved;
            if payload.starts_with('/') {
                endpoints.set_submit_path(payload);
                None
            } else {
                tracing::warn!("expected dynamic endpoint, but received: {payload}");
                Some(payload)
            }
        }
        SseLine::Data(payload) => Some(payload),
        SseLine::Event(_) | SseLine::Other => None,
    }
}

/// Background owner of the GET connection.
struct PushStream {
    client: reqwest::Client,
    endpoints: Arc<EndpointStore>,
    headers: HeaderMap,
    output: Arc<OutputWriter>,
    reconnect_delay: Duration,
}

impl PushStream {
    /// Connect, read, and reconnect after a fixed delay, forever, until
    /// `token` is cancelled.  `connected` fires on the first successful
    /// connection only.
    async fn run(self, token: CancellationToken, connected: oneshot::Sender<()>) {
        let mut connected = Some(connected);
        let url = self.endpoints.push_url();

        loop {
            if token.is_cancelled() {
                break;
            }
            tracing::info!(%url, "connecting to SSE stream");

            let request = with_custom_headers(
                self.client.get(&url).header(ACCEPT, "text/event-stream"),
                &self.headers,
            );
            let result = tokio::select! {
                () = token.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Err(err) => tracing::warn!("failed to connect to SSE: {err}"),
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        "SSE server returned HTTP {}",
                        response.status().as_u16()
                    );
                }
                Ok(response) => {
                    tracing::info!(
                        %url,
                        status = response.status().as_u16(),
                        "connected to SSE stream"
                    );
                    if let Some(tx) = connected.take() {
                        let _ = tx.send(());
                    }
                    if let StreamEnd::Cancelled = self.read(response, &token).await {
                        break;
                    }
                }
            }

            tracing::info!(
                delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                "SSE stream closed, waiting before reconnection attempt"
            );
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        tracing::info!("SSE client shutting down: stdin connection closed");
    }

    /// Read one connection's body line by line until it ends.
    async fn read(&self, response: reqwest::Response, token: &CancellationToken) -> StreamEnd {
        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut reader = StreamReader::new(body);
        let mut buf = Vec::new();
        let mut phase = EndpointPhase::Idle;

        loop {
            let next = tokio::select! {
                () = token.cancelled() => return StreamEnd::Cancelled,
                next = next_line_lossy(&mut reader, &mut buf) => next,
            };
            match next {
                Ok(Some(line)) => {
                    if let Some(payload) = on_stream_line(&line, &mut phase, &self.endpoints) {
                        self.output.emit(payload.as_bytes()).await;
                    }
                }
                Ok(None) => {
                    tracing::info!("SSE stream ended by server");
                    return StreamEnd::Closed;
                }
                Err(err) => {
                    tracing::warn!("SSE stream error: {err}");
                    return StreamEnd::Closed;
                }
            }
        }
    }
}

/// Foreground POST path.
struct Forwarder {
    client: reqwest::Client,
    endpoints: Arc<EndpointStore>,
    headers: HeaderMap,
    output: Arc<OutputWriter>,
}

impl Forwarder {
    async fn process_line(&self, line: &str) {
        let raw = match message::classify(line) {
            Ok(msg) => msg.raw(),
            Err(rejected) => {
                tracing::warn!("{rejected}");
                return;
            }
        };
        tracing::debug!("C->S: {raw}");

        let url = self.endpoints.submit_url();
        let request = with_custom_headers(
            self.client.post(&url).header(CONTENT_TYPE, "application/json"),
            &self.headers,
        )
        .body(raw.to_owned());

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::debug!(%url, status, "POST completed");
                if !response.status().is_success() {
                    tracing::warn!("Server returned HTTP {status} for POST request");
                }
                // Read to the end so the connection goes back to the pool.
                if let Err(err) = response.bytes().await {
                    tracing::debug!("failed to drain POST response: {err}");
                }
            }
            Err(err) => {
                let msg = format!("Failed to forward JSON-RPC message: {err}");
                tracing::warn!("{msg}");
                self.output.emit(&message::internal_error(&msg)).await;
            }
        }
    }
}
