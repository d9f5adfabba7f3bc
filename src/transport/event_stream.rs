//! Line classification for `text/event-stream` bodies.
//!
//! Only the two field kinds the relay acts on are recognised; `id:`,
//! `retry:`, comments and blank lines all collapse into [`SseLine::Other`].

/// One line of an event stream, whitespace-trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SseLine<'a> {
    /// `event: <name>`
    Event(&'a str),
    /// `data: <payload>`, payload trimmed and non-empty.
    Data(&'a str),
    Other,
}

/// Event name a server uses to announce the submission path.
pub(crate) const ENDPOINT_EVENT: &str = "endpoint";

pub(crate) fn classify(line: &str) -> SseLine<'_> {
    let line = line.trim();
    if let Some(name) = line.strip_prefix("event:") {
        return SseLine::Event(name.trim());
    }
    match line.strip_prefix("data:").map(str::trim) {
        Some(payload) if !payload.is_empty() => SseLine::Data(payload),
        _ => SseLine::Other,
    }
}

/// Collect the `data:` payloads of a complete event-stream body, in order.
pub(crate) fn data_payloads(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| match classify(line) {
            SseLine::Data(payload) => Some(payload),
            _ => None,
        })
        .collect()
}
