//! Client-facing output stream.
//!
//! stdout is the MCP message channel, not a log: every byte written to it
//! must belong to exactly one newline-terminated JSON-RPC message.  All
//! writers (the HTTP bridge, the SSE stream reader and error synthesis) share
//! one [`OutputWriter`], whose lock spans the whole write and flush.

use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt as _};
use tokio::sync::Mutex;

type Sink = Pin<Box<dyn AsyncWrite + Send>>;

/// Serialised, newline-framed writer for messages bound to the client.
pub(crate) struct OutputWriter {
    sink: Mutex<Sink>,
}

impl std::fmt::Debug for OutputWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputWriter").finish_non_exhaustive()
    }
}

impl OutputWriter {
    pub(crate) fn new(sink: impl AsyncWrite + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::pin(sink)),
        }
    }

    /// Write `msg` to the client as one line.
    ///
    /// Trailing whitespace is trimmed and exactly one `\n` appended.  The
    /// write is flushed before the lock is released.  Messages that are empty
    /// after trimming are skipped.  Write errors are logged, not returned:
    /// once the client has gone away the input side will close too.
    pub(crate) async fn emit(&self, msg: &[u8]) {
        let msg = msg.trim_ascii_end();
        if msg.is_empty() {
            tracing::debug!("skipping empty message to client");
            return;
        }

        let mut frame = Vec::with_capacity(msg.len() + 1);
        frame.extend_from_slice(msg);
        frame.push(b'\n');

        let mut sink = self.sink.lock().await;
        tracing::debug!("S->C: {}", String::from_utf8_lossy(msg));
        if let Err(err) = sink.write_all(&frame).await {
            tracing::warn!("failed to write message to client: {err}");
            return;
        }
        if let Err(err) = sink.flush().await {
            tracing::warn!("failed to flush client output: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, BufReader};

    use super::*;

    #[tokio::test]
    async fn trailing_whitespace_is_replaced_by_one_newline() {
        let (client, relay) = tokio::io::duplex(1024);
        let writer = OutputWriter::new(relay);
        writer.emit(b"{\"id\":1}\r\n\t \n").await;
        drop(writer);

        let mut out = String::new();
        BufReader::new(client)
            .read_to_string(&mut out)
            .await
            .expect("read output");
        assert_eq!(out, "{\"id\":1}\n");
    }

    #[tokio::test]
    async fn empty_messages_are_not_written() {
        let (client, relay) = tokio::io::duplex(1024);
        let writer = OutputWriter::new(relay);
        writer.emit(b"  \n").await;
        writer.emit(b"{}").await;
        drop(writer);

        let mut out = String::new();
        BufReader::new(client)
            .read_to_string(&mut out)
            .await
            .expect("read output");
        assert_eq!(out, "{}\n");
    }

    #[tokio::test]
    async fn concurrent_emits_never_interleave() {
        const TASKS: usize = 8;
        const PER_TASK: usize = 50;

        let (client, relay) = tokio::io::duplex(256);
        let writer = Arc::new(OutputWriter::new(relay));

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(client).lines();
            let mut seen = Vec::new();
            while let Some(line) = lines.next_line().await.expect("read line") {
                seen.push(line);
            }
            seen
        });

        let mut handles = Vec::new();
        for task in 0..TASKS {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                // Long payloads force each write across several duplex chunks.
                let filler = char::from(b'a' + u8::try_from(task).unwrap_or(0)).to_string();
                for n in 0..PER_TASK {
                    let msg = format!(
                        r#"{{"task":{task},"n":{n},"pad":"{}"}}"#,
                        filler.repeat(300)
                    );
                    writer.emit(msg.as_bytes()).await;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("emit task");
        }
        drop(writer);

        let lines = reader.await.expect("reader task");
        assert_eq!(lines.len(), TASKS * PER_TASK);
        for line in lines {
            let value: serde_json::Value =
                serde_json::from_str(&line).expect("every line is a whole message");
            let task = usize::try_from(value["task"].as_u64().expect("task")).expect("usize");
            let pad = value["pad"].as_str().expect("pad");
            let expected = char::from(b'a' + u8::try_from(task).expect("u8"));
            assert!(pad.chars().all(|c| c == expected), "mixed bytes in {line}");
        }
    }
}
