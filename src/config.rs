//! Relay configuration.
//!
//! Built once in `main` from the CLI flags and handed to the relay as plain
//! values.  The only fallible step is turning the `--headers` JSON object
//! into a [`HeaderMap`]; URL parsing belongs to the relay controller so that
//! it can notify the client before exiting.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Fixed delay between SSE reconnection attempts.
pub(crate) const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upstream transport, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum TransportMode {
    /// Synchronous request/response over HTTP POST.
    Http,
    /// Long-lived SSE push stream plus out-of-band POSTs.
    Sse,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Sse => "sse",
        })
    }
}

/// Everything the relay needs to run.
#[derive(Debug, Clone)]
pub(crate) struct RelayConfig {
    /// SSE stream URL (`sse`) or POST endpoint (`http`), unparsed.
    pub url: String,
    pub transport: TransportMode,
    /// Extra headers attached to every upstream request.
    pub headers: HeaderMap,
    /// Verbose traffic logging.  Never changes behaviour.
    pub debug: bool,
    pub reconnect_delay: Duration,
}

impl RelayConfig {
    pub(crate) fn new(
        url: String,
        transport: TransportMode,
        headers: HeaderMap,
        debug: bool,
    ) -> Self {
        Self {
            url,
            transport,
            headers,
            debug,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Parse the `--headers` flag: a JSON object mapping header names to string
/// values.
///
/// Values are marked sensitive so credentials such as `Authorization` never
/// show up in `Debug` output.
///
/// # Errors
///
/// Returns an error if the input is not a JSON object of strings, or if any
/// name or value is not a legal HTTP header.
pub(crate) fn parse_headers(json: &str) -> anyhow::Result<HeaderMap> {
    let raw: BTreeMap<String, String> =
        serde_json::from_str(json).context("failed to parse headers JSON")?;

    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name '{name}'"))?;
        let mut header_value = HeaderValue::from_str(&value)
            .with_context(|| format!("invalid value for header '{name}'"))?;
        header_value.set_sensitive(true);
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
