//! Shared helpers for integration tests.

/// A request the relay forwards in HTTP mode.
#[allow(dead_code)]
pub const PING: &str = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

/// Upstream reply to [`PING`].
#[allow(dead_code)]
pub const PONG: &str = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;

/// A fresh command for the relay binary.
pub fn relay() -> assert_cmd::Command {
    assert_cmd::cargo_bin_cmd!("mcp-relay")
}
