//! Upstream transports.
//!
//! Two bridges present a remote MCP server to the stdio client as a single
//! newline-delimited message stream:
//!
//! | Mode   | Client → server        | Server → client             |
//! |--------|------------------------|-----------------------------|
//! | `http` | POST per request       | POST response body          |
//! | `sse`  | POST to announced path | `data:` events on GET stream |
//!
//! Both share one [`reqwest::Client`] built by [`build_client`], so upstream
//! connections are kept alive across messages.

use std::io;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::HeaderMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

pub(crate) mod event_stream;
pub(crate) mod http;
pub(crate) mod sse;

/// Header carrying the streamable-HTTP session identifier.
pub(crate) const SESSION_HEADER: &str = "Mcp-Session-Id";

const MAX_IDLE_PER_HOST: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Build the shared upstream HTTP client.
///
/// TLS uses rustls with the ring provider and the platform's native root
/// store, so corporate CAs are trusted without extra configuration.
///
/// # Errors
///
/// Returns an error if the client cannot be built.
pub(crate) fn build_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_preconfigured_tls(build_tls_config()?)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Build a `rustls::ClientConfig` over the platform's native root store.
///
/// An empty store is only a warning, since plain `http://` upstreams still
/// work.
fn build_tls_config() -> anyhow::Result<rustls::ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for error in &certs.errors {
        tracing::debug!("skipped native cert (load error): {error}");
    }
    let mut certs_loaded: usize = 0;
    for cert in certs.certs {
        root_store
            .add(cert)
            .context("failed to add certificate to root store")?;
        certs_loaded += 1;
    }
    tracing::debug!(certs_loaded, "native TLS certificate store loaded");
    if root_store.is_empty() {
        tracing::warn!("no native root certificates could be loaded; HTTPS upstreams will fail");
    }
    Ok(rustls::ClientConfig::builder_with_provider(std::sync::Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("ring provider rejected default protocol versions")?
    .with_root_certificates(root_store)
    .with_no_client_auth())
}

/// Attach the configured custom headers to `request`, replacing any header
/// of the same name set earlier.
pub(crate) fn with_custom_headers(
    request: reqwest::RequestBuilder,
    headers: &HeaderMap,
) -> reqwest::RequestBuilder {
    request.headers(headers.clone())
}

/// Read the next `\n`-terminated line from `input`, decoding it lossily.
///
/// The terminator and a preceding `\r` are stripped.  Bytes that are not
/// valid UTF-8 become U+FFFD, so a bad line reaches the normal message gate
/// instead of ending the stream.  Returns `Ok(None)` at end of input; a final
/// line without a terminator is still returned.  `buf` is scratch space
/// reused across calls.
pub(crate) async fn next_line_lossy<R>(
    input: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if input.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let mut line: &[u8] = buf;
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    Ok(Some(String::from_utf8_lossy(line).into_owned()))
}
